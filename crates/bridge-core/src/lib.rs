//! bridge-core: keeps cloud devices and the state store in sync
//!
//! Every device discovered at login gets its own actor task that owns the
//! device's runtime record: the published state points, the metering poll
//! timer and the reconnect timer. Push events, timer expiries and external
//! writes for one device are handled in order by that actor; devices never
//! wait on each other. [`Bridge`] owns the registry of actors and drives
//! startup and bounded teardown.

mod error;
pub use error::{BridgeError, Result};

mod config;
pub use config::{load_config, BridgeConfig, Credentials, MAX_PASSWORD_LEN};

mod metrics;
pub use metrics::{BridgeMetrics, MetricsHub};

mod context;
pub use context::{BridgeContext, CONNECTION_POINT};

mod scheduler;
pub use scheduler::ScheduledTask;

mod record;
pub use record::{ConnectionState, DeviceRecord};

pub mod sync;
pub use sync::{Disposition, EventOutcome, PublishReport, WriteOutcome};

pub mod poller;
pub use poller::PollOutcome;

pub mod lifecycle;

mod actor;
pub use actor::{DeviceActor, DeviceMsg, DeviceSnapshot};

mod registry;
pub use registry::{DeviceHandle, Registry};

mod bridge;
pub use bridge::Bridge;
