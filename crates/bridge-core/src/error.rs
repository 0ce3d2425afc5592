use cloud_transport::TransportError;
use device_registry::{DecodeError, EncodeError};
use state_store::StoreError;
use thiserror::Error;

pub type Result<T, E = BridgeError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("unknown point {device_id}.{point_id}")]
    UnknownPoint { device_id: String, point_id: String },
    #[error("point {device_id}.{point_id} is read-only")]
    ReadOnlyPoint { device_id: String, point_id: String },
    #[error("device {0} is unavailable")]
    DeviceUnavailable(String),
    #[error("device {0} is busy, write dropped")]
    MailboxFull(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("device task failed: {0}")]
    TaskFailed(String),
}
