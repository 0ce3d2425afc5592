use crate::DeviceSession;
use core::fmt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Namespaces used by the vendor protocol for requests and push events.
pub mod namespace {
    pub const TOGGLE: &str = "Appliance.Control.Toggle";
    pub const TOGGLEX: &str = "Appliance.Control.ToggleX";
    pub const ELECTRICITY: &str = "Appliance.Control.Electricity";
    pub const CONSUMPTIONX: &str = "Appliance.Control.ConsumptionX";
    pub const LIGHT: &str = "Appliance.Control.Light";
    pub const UPGRADE: &str = "Appliance.Control.Upgrade";
    pub const GARAGE_DOOR_STATE: &str = "Appliance.GarageDoor.State";
    pub const SYSTEM_ABILITY: &str = "Appliance.System.Ability";
    pub const SYSTEM_ALL: &str = "Appliance.System.All";
    pub const SYSTEM_ONLINE: &str = "Appliance.System.Online";
    pub const SYSTEM_REPORT: &str = "Appliance.System.Report";
}

/// Device definition as listed by the cloud at login.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDef {
    pub uuid: String,
    #[serde(default)]
    pub dev_name: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub fmware_version: Option<String>,
    #[serde(default)]
    pub channels: Vec<ChannelDef>,
}

impl DeviceDef {
    /// Configured name of a channel, if one is set and non-empty.
    pub fn channel_name(&self, channel: u32) -> Option<&str> {
        ChannelDef::name_of(&self.channels, channel)
    }

    /// Display name of the device, falling back to its id.
    pub fn display_name(&self) -> String {
        if self.dev_name.is_empty() {
            format!("Device {}", self.uuid)
        } else {
            self.dev_name.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDef {
    #[serde(default)]
    pub dev_name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ChannelDef {
    /// Name configured for `channel` in a channel list, ignoring empty names.
    pub fn name_of(channels: &[ChannelDef], channel: u32) -> Option<&str> {
        channels
            .get(channel as usize)
            .and_then(|c| c.dev_name.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// Lifecycle and data notifications emitted by a device session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Closed(Option<String>),
    Error(String),
    Reconnected,
    Data { namespace: String, payload: Value },
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Connected => write!(f, "connected"),
            SessionEvent::Closed(Some(reason)) => write!(f, "closed ({reason})"),
            SessionEvent::Closed(None) => write!(f, "closed"),
            SessionEvent::Error(err) => write!(f, "error ({err})"),
            SessionEvent::Reconnected => write!(f, "reconnected"),
            SessionEvent::Data { namespace, .. } => write!(f, "data {namespace}"),
        }
    }
}

/// A control command addressed to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Toggle {
        onoff: u8,
    },
    ToggleX {
        channel: u32,
        onoff: u8,
    },
    GarageDoor {
        channel: u32,
        open: u8,
    },
    Light {
        channel: u32,
        capacity: u8,
        rgb: Option<u32>,
        temperature: Option<u8>,
        luminance: Option<u8>,
    },
}

impl DeviceCommand {
    pub fn namespace(&self) -> &'static str {
        match self {
            DeviceCommand::Toggle { .. } => namespace::TOGGLE,
            DeviceCommand::ToggleX { .. } => namespace::TOGGLEX,
            DeviceCommand::GarageDoor { .. } => namespace::GARAGE_DOOR_STATE,
            DeviceCommand::Light { .. } => namespace::LIGHT,
        }
    }

    /// Wire payload of the SET request carrying this command.
    pub fn payload(&self) -> Value {
        match self {
            DeviceCommand::Toggle { onoff } => json!({ "toggle": { "onoff": onoff } }),
            DeviceCommand::ToggleX { channel, onoff } => {
                json!({ "togglex": { "channel": channel, "onoff": onoff } })
            }
            DeviceCommand::GarageDoor { channel, open } => {
                json!({ "state": { "channel": channel, "open": open } })
            }
            DeviceCommand::Light {
                channel,
                capacity,
                rgb,
                temperature,
                luminance,
            } => {
                let mut light = Map::new();
                light.insert("channel".into(), json!(channel));
                light.insert("capacity".into(), json!(capacity));
                if let Some(rgb) = rgb {
                    light.insert("rgb".into(), json!(rgb));
                }
                if let Some(t) = temperature {
                    light.insert("temperature".into(), json!(t));
                }
                if let Some(l) = luminance {
                    light.insert("luminance".into(), json!(l));
                }
                json!({ "light": light })
            }
        }
    }
}

/// A device reported by the cloud at login, with its session and event stream.
pub struct DiscoveredDevice {
    pub def: DeviceDef,
    pub session: Arc<dyn DeviceSession>,
    pub events: mpsc::Receiver<SessionEvent>,
}

impl fmt::Debug for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveredDevice")
            .field("def", &self.def)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_def_decodes_cloud_listing() {
        let def: DeviceDef = serde_json::from_value(json!({
            "uuid": "1806",
            "devName": "Power strip",
            "deviceType": "mss425e",
            "channels": [{}, {"devName": "USB", "type": "USB"}, {"devName": ""}]
        }))
        .unwrap();
        assert_eq!(def.channel_name(0), None);
        assert_eq!(def.channel_name(1), Some("USB"));
        assert_eq!(def.channel_name(2), None);
        assert_eq!(def.channel_name(7), None);
        assert_eq!(def.display_name(), "Power strip");
    }

    #[test]
    fn unnamed_device_falls_back_to_id() {
        let def = DeviceDef {
            uuid: "abc".into(),
            ..Default::default()
        };
        assert_eq!(def.display_name(), "Device abc");
    }

    #[test]
    fn command_payloads_match_wire_shape() {
        let cmd = DeviceCommand::ToggleX {
            channel: 2,
            onoff: 1,
        };
        assert_eq!(cmd.namespace(), namespace::TOGGLEX);
        assert_eq!(
            cmd.payload(),
            json!({ "togglex": { "channel": 2, "onoff": 1 } })
        );

        let light = DeviceCommand::Light {
            channel: 0,
            capacity: 4,
            rgb: None,
            temperature: None,
            luminance: Some(60),
        };
        assert_eq!(
            light.payload(),
            json!({ "light": { "channel": 0, "capacity": 4, "luminance": 60 } })
        );
    }
}
