use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("device not connected: {0}")]
    NotConnected(String),
    #[error("operation not supported by device: {0}")]
    Unsupported(&'static str),
    #[error("device rejected request: {0}")]
    Rejected(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("timeout")]
    Timeout,
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}
