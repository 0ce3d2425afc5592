//! state-store: the home-automation object/state store seen by the bridge
//!
//! Devices are published as objects holding typed state points. Values set by
//! the bridge are acknowledged (`ack = true`); values written by users or
//! automations arrive unacknowledged and are forwarded to the bridge through a
//! write subscription.

mod error;
pub use error::{Result, StoreError};

mod types;
pub use types::{ExternalWrite, PointAddress, StoredState};

mod traits;
pub use traits::StateStore;

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;
