use device_registry::ValueType;
use thiserror::Error;

pub type Result<T, E = StoreError> = core::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown point: {0}")]
    UnknownPoint(String),
    #[error("point is read-only: {0}")]
    ReadOnly(String),
    #[error("{address}: expected a {expected} value, got {got}")]
    TypeMismatch {
        address: String,
        expected: ValueType,
        got: ValueType,
    },
    #[error("store closed")]
    Closed,
}
