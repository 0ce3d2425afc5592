use crate::{BridgeContext, BridgeError, DeviceActor, DeviceMsg, DeviceSnapshot, Result, WriteOutcome};
use cloud_transport::DiscoveredDevice;
use device_registry::PointValue;
use parking_lot::RwLock;
use state_store::ExternalWrite;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// Sending side of one device actor.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    device_id: String,
    tx: mpsc::Sender<DeviceMsg>,
}

impl DeviceHandle {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Apply a write and wait for the device's answer.
    pub async fn write(&self, point_id: &str, value: PointValue) -> Result<WriteOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(DeviceMsg::Write {
            point_id: point_id.to_string(),
            value,
            reply: Some(reply),
        })
        .await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    /// Queue a write without waiting; the actor logs failures. A full mailbox
    /// drops the write instead of blocking the caller.
    pub fn submit_write(&self, point_id: &str, value: PointValue) -> Result<()> {
        let msg = DeviceMsg::Write {
            point_id: point_id.to_string(),
            value,
            reply: None,
        };
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => BridgeError::MailboxFull(self.device_id.clone()),
            TrySendError::Closed(_) => self.unavailable(),
        })
    }

    pub async fn snapshot(&self) -> Result<DeviceSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(DeviceMsg::Snapshot(reply)).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Cancel the device's timers; resolves once the actor has done so.
    pub async fn stop(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.send(DeviceMsg::Stop(ack)).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Ask the actor to exit. Does not wait.
    pub fn terminate(&self) -> bool {
        self.tx.try_send(DeviceMsg::Terminate).is_ok()
    }

    async fn send(&self, msg: DeviceMsg) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> BridgeError {
        BridgeError::DeviceUnavailable(self.device_id.clone())
    }
}

/// Device id to actor handle. Entries are created on first sight and live until shutdown.
#[derive(Default)]
pub struct Registry {
    devices: RwLock<BTreeMap<String, DeviceHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a discovered device. Returns its actor to be spawned, or
    /// `None` when the id is already known.
    pub fn ensure(&self, ctx: &Arc<BridgeContext>, device: DiscoveredDevice) -> Option<DeviceActor> {
        let mut devices = self.devices.write();
        if devices.contains_key(&device.def.uuid) {
            return None;
        }
        let device_id = device.def.uuid.clone();
        let (actor, tx) = DeviceActor::new(ctx.clone(), device.def, device.session, device.events);
        devices.insert(
            device_id.clone(),
            DeviceHandle {
                device_id,
                tx,
            },
        );
        Some(actor)
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceHandle> {
        self.devices.read().get(device_id).cloned()
    }

    pub fn handles(&self) -> Vec<DeviceHandle> {
        self.devices.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Route an external write to the owning device without waiting, neither
    /// for the command nor for room in a busy device's mailbox.
    pub fn dispatch_write(&self, write: ExternalWrite) -> Result<()> {
        let ExternalWrite { address, value } = write;
        let handle = self.get(&address.device_id).ok_or(BridgeError::UnknownPoint {
            device_id: address.device_id.clone(),
            point_id: address.point_id.clone(),
        })?;
        handle.submit_write(&address.point_id, value)
    }
}
