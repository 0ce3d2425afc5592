use crate::{ExternalWrite, PointAddress, Result};
use async_trait::async_trait;
use device_registry::{PointMeta, PointValue};
use tokio::sync::mpsc;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create the device object if missing, or rename it.
    async fn ensure_device(&self, device_id: &str, name: &str) -> Result<()>;

    /// Create the point or replace its metadata. `initial`, when given, is set acknowledged.
    async fn create_or_update_point(
        &self,
        address: &PointAddress,
        meta: PointMeta,
        initial: Option<PointValue>,
    ) -> Result<()>;

    async fn set_value(&self, address: &PointAddress, value: PointValue, ack: bool) -> Result<()>;

    /// Stream of unacknowledged writes on writable points. A new subscription replaces the previous one.
    fn subscribe_writes(&self) -> mpsc::Receiver<ExternalWrite>;
}
