//! cloud-transport: session abstractions over the vendor cloud
//!
//! This crate describes what the bridge needs from a cloud session: per-device
//! request/response calls, control commands and a stream of push events. The
//! default build enables an in-process `mock` backend so that the bridge and its
//! tests run without cloud credentials.

mod types;
pub use types::{namespace, ChannelDef, DeviceCommand, DeviceDef, DiscoveredDevice, SessionEvent};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{CloudClient, DeviceSession};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockCloud, MockDevice, MockSession};
