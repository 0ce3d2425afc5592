use core::fmt;
use device_registry::PointValue;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Process-wide id of a point: `<device>.<point>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointAddress {
    pub device_id: String,
    pub point_id: String,
}

impl PointAddress {
    pub fn new(device_id: impl Into<String>, point_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            point_id: point_id.into(),
        }
    }
}

impl fmt::Display for PointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.device_id, self.point_id)
    }
}

/// A value written to a point from outside the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalWrite {
    pub address: PointAddress,
    pub value: PointValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredState {
    pub value: PointValue,
    /// Set by the bridge (true) or requested by a user (false).
    pub ack: bool,
    pub ts: OffsetDateTime,
}
