use crate::ScheduledTask;
use cloud_transport::{DeviceDef, DeviceSession};
use device_registry::{AbilitySet, StatePoint};
use state_store::PointAddress;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Erroring,
    /// Closed, waiting for the reconnect timer.
    Disconnected,
    Closing,
    Stopped,
}

/// Runtime record of one device. Owned by the device's actor.
pub struct DeviceRecord {
    pub def: DeviceDef,
    pub session: Arc<dyn DeviceSession>,
    pub abilities: Option<AbilitySet>,
    pub points: BTreeMap<String, StatePoint>,
    pub poll_timer: ScheduledTask,
    pub reconnect_timer: ScheduledTask,
    pub state: ConnectionState,
    /// The first connect attempt finished (connected, closed or failed).
    pub first_attempt_done: bool,
    /// Counted in the global connected-device total.
    pub counted: bool,
}

impl DeviceRecord {
    pub fn new(def: DeviceDef, session: Arc<dyn DeviceSession>) -> Self {
        Self {
            def,
            session,
            abilities: None,
            points: BTreeMap::new(),
            poll_timer: ScheduledTask::new("electricity-poll"),
            reconnect_timer: ScheduledTask::new("reconnect"),
            state: ConnectionState::Connecting,
            first_attempt_done: false,
            counted: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.def.uuid
    }

    pub fn address(&self, point_id: &str) -> PointAddress {
        PointAddress::new(self.def.uuid.as_str(), point_id)
    }

    pub fn supports_metering(&self) -> bool {
        self.abilities
            .as_ref()
            .is_some_and(AbilitySet::supports_metering)
    }
}
