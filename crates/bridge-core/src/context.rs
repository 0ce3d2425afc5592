use crate::{BridgeConfig, MetricsHub, Result};
use device_registry::{PointDescriptor, PointValue, Role};
use state_store::{PointAddress, StateStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Address of the global "at least one device connected" indicator.
pub const CONNECTION_POINT: (&str, &str) = ("info", "connection");

/// State shared by all device actors.
pub struct BridgeContext {
    pub config: BridgeConfig,
    pub store: Arc<dyn StateStore>,
    pub metrics: MetricsHub,
    stopped: AtomicBool,
    connected: AtomicUsize,
    pending_first_attempts: AtomicUsize,
    /// Last value written to the connection indicator.
    connection_flag: Mutex<Option<bool>>,
    init_done: watch::Sender<bool>,
}

impl BridgeContext {
    pub fn new(config: BridgeConfig, store: Arc<dyn StateStore>, metrics: MetricsHub) -> Self {
        let (init_done, _) = watch::channel(false);
        Self {
            config,
            store,
            metrics,
            stopped: AtomicBool::new(false),
            connected: AtomicUsize::new(0),
            pending_first_attempts: AtomicUsize::new(0),
            connection_flag: Mutex::new(None),
            init_done,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Set the stopped flag. Returns false if it was already set.
    pub fn mark_stopped(&self) -> bool {
        !self.stopped.swap(true, Ordering::SeqCst)
    }

    pub fn connected_devices(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn device_connected(&self) {
        let n = self.connected.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.bridge.devices_connected.set(n as i64);
        self.set_connection(true).await;
    }

    pub async fn device_disconnected(&self) {
        let n = self
            .connected
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .map_or(0, |prev| prev.saturating_sub(1));
        self.metrics.bridge.devices_connected.set(n as i64);
        self.set_connection(n > 0).await;
    }

    /// Number of devices whose first connect attempt must finish before initialization completes.
    pub fn expect_first_attempts(&self, count: usize) {
        self.pending_first_attempts.store(count, Ordering::SeqCst);
        if count == 0 {
            self.signal_initialized();
        }
    }

    pub fn first_attempt_done(&self) {
        let prev = self
            .pending_first_attempts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if prev == Ok(1) {
            self.signal_initialized();
        }
    }

    fn signal_initialized(&self) {
        if !*self.init_done.borrow() {
            info!("devices initialized");
            self.init_done.send_replace(true);
        }
    }

    pub fn initialized(&self) -> watch::Receiver<bool> {
        self.init_done.subscribe()
    }

    /// Create the connection indicator, reset to false.
    pub async fn publish_connection_point(&self) -> Result<()> {
        let desc = PointDescriptor::read_only(
            CONNECTION_POINT.1,
            "Device or service connected",
            PointValue::Bool(false),
        )
        .with_role(Role::Connected);
        let mut flag = self.connection_flag.lock().await;
        self.store
            .create_or_update_point(&connection_address(), desc.meta(), Some(desc.initial))
            .await?;
        *flag = Some(false);
        Ok(())
    }

    /// Write the connection indicator if it differs from the last written value.
    pub async fn set_connection(&self, connected: bool) {
        let mut flag = self.connection_flag.lock().await;
        if *flag == Some(connected) {
            return;
        }
        match self
            .store
            .set_value(&connection_address(), PointValue::Bool(connected), true)
            .await
        {
            Ok(()) => {
                debug!(connected, "connection indicator updated");
                *flag = Some(connected);
            }
            Err(e) => warn!(error = %e, "failed to update connection indicator"),
        }
    }
}

fn connection_address() -> PointAddress {
    PointAddress::new(CONNECTION_POINT.0, CONNECTION_POINT.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use state_store::MemoryStore;

    fn context(store: Arc<MemoryStore>) -> BridgeContext {
        BridgeContext::new(BridgeConfig::default(), store, MetricsHub::new().unwrap())
    }

    #[tokio::test]
    async fn connection_indicator_is_written_on_change_only() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());
        let addr = connection_address();
        ctx.publish_connection_point().await.unwrap();

        ctx.device_connected().await;
        ctx.device_connected().await;
        assert_eq!(store.value(&addr), Some(PointValue::Bool(true)));
        assert_eq!(store.set_count(&addr), 1);

        ctx.device_disconnected().await;
        assert_eq!(store.set_count(&addr), 1);
        ctx.device_disconnected().await;
        assert_eq!(store.value(&addr), Some(PointValue::Bool(false)));
        assert_eq!(store.set_count(&addr), 2);
        assert_eq!(ctx.connected_devices(), 0);
    }

    #[tokio::test]
    async fn initialization_completes_after_every_first_attempt() {
        let ctx = context(Arc::new(MemoryStore::new()));
        let init = ctx.initialized();
        ctx.expect_first_attempts(2);
        ctx.first_attempt_done();
        assert!(!*init.borrow());
        ctx.first_attempt_done();
        assert!(*init.borrow());
        ctx.first_attempt_done();
        assert!(*init.borrow());
    }

    #[test]
    fn stop_flag_is_set_once() {
        let ctx = context(Arc::new(MemoryStore::new()));
        assert!(ctx.mark_stopped());
        assert!(!ctx.mark_stopped());
        assert!(ctx.is_stopped());
    }
}
