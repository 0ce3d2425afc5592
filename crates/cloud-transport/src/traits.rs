use crate::{DeviceCommand, DiscoveredDevice, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// One device's session on the cloud.
///
/// Lifecycle changes and push data are not returned from these calls; they are
/// delivered on the event stream handed out with the session at login.
#[async_trait]
pub trait DeviceSession: Send + Sync {
    fn device_id(&self) -> &str;

    /// Open (or re-open) the session. Success is announced with `SessionEvent::Connected`.
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self, force: bool) -> Result<()>;

    /// `Appliance.System.Ability` GET.
    async fn system_abilities(&self) -> Result<Value>;

    /// `Appliance.System.All` GET.
    async fn system_all_data(&self) -> Result<Value>;

    async fn online_status(&self) -> Result<Value>;

    async fn control_electricity(&self) -> Result<Value>;

    async fn control_toggle(&self, onoff: u8) -> Result<Value>;

    async fn control_togglex(&self, channel: u32, onoff: u8) -> Result<Value>;

    async fn control_garage_door(&self, channel: u32, open: u8) -> Result<Value>;

    /// Light SET; `light` is the inner object of the `light` payload.
    async fn control_light(&self, light: Value) -> Result<Value>;

    /// Route a command to the matching control call.
    async fn execute(&self, command: &DeviceCommand) -> Result<Value> {
        match command {
            DeviceCommand::Toggle { onoff } => self.control_toggle(*onoff).await,
            DeviceCommand::ToggleX { channel, onoff } => {
                self.control_togglex(*channel, *onoff).await
            }
            DeviceCommand::GarageDoor { channel, open } => {
                self.control_garage_door(*channel, *open).await
            }
            DeviceCommand::Light { .. } => {
                let light = command
                    .payload()
                    .get("light")
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                self.control_light(light).await
            }
        }
    }
}

/// Account-level cloud client.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Authenticate and list the account's devices. Sessions are returned unconnected.
    async fn login(&self) -> Result<Vec<DiscoveredDevice>>;

    /// Disconnect every device session handed out by `login`.
    async fn disconnect_all(&self, force: bool);
}
