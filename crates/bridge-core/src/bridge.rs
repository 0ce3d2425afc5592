use crate::{BridgeConfig, BridgeContext, BridgeError, DeviceSnapshot, MetricsHub, Registry, Result};
use cloud_transport::{CloudClient, TransportError};
use state_store::StateStore;
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Owns the device actors and drives startup and teardown.
pub struct Bridge {
    ctx: Arc<BridgeContext>,
    cloud: Arc<dyn CloudClient>,
    registry: Arc<Registry>,
    tasks: JoinSet<()>,
    router: Option<JoinHandle<()>>,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        cloud: Arc<dyn CloudClient>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        let metrics = MetricsHub::new()?;
        Ok(Self {
            ctx: Arc::new(BridgeContext::new(config, store, metrics)),
            cloud,
            registry: Arc::new(Registry::new()),
            tasks: JoinSet::new(),
            router: None,
        })
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.ctx
    }

    pub fn metrics(&self) -> &MetricsHub {
        &self.ctx.metrics
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Log in, spawn one actor per listed device and start routing external
    /// writes once every device finished its first connect attempt.
    ///
    /// Authentication failure aborts startup; it is not retried.
    pub async fn start(&mut self) -> Result<usize> {
        self.ctx.publish_connection_point().await?;
        let devices = match self.cloud.login().await {
            Ok(devices) => devices,
            Err(TransportError::Authentication(msg)) => {
                error!(error = %msg, "cloud authentication failed");
                return Err(BridgeError::Authentication(msg));
            }
            Err(e) => return Err(e.into()),
        };
        info!(devices = devices.len(), "cloud login complete");

        self.ctx.expect_first_attempts(devices.len());
        for device in devices {
            let device_id = device.def.uuid.clone();
            match self.registry.ensure(&self.ctx, device) {
                Some(actor) => {
                    debug!(device = %device_id, "device registered");
                    self.tasks.spawn(actor.run());
                }
                None => {
                    warn!(device = %device_id, "device listed twice, ignoring duplicate");
                    self.ctx.first_attempt_done();
                }
            }
        }
        let known = self.registry.len();
        self.ctx.metrics.bridge.devices_known.set(known as i64);

        self.router = Some(tokio::spawn(route_writes(
            self.ctx.clone(),
            self.registry.clone(),
        )));
        Ok(known)
    }

    /// Resolves once every device seen at startup finished its first connect attempt.
    pub async fn wait_initialized(&self) {
        let mut init = self.ctx.initialized();
        let _ = init.wait_for(|done| *done).await;
    }

    /// Resolves with an error when a device task panics. Pending forever otherwise.
    pub async fn wait_fatal(&mut self) -> BridgeError {
        loop {
            match self.tasks.join_next().await {
                Some(Err(e)) if e.is_panic() => {
                    error!(error = %e, "device task panicked");
                    return BridgeError::TaskFailed(e.to_string());
                }
                Some(_) => continue,
                None => return std::future::pending().await,
            }
        }
    }

    pub async fn snapshot(&self, device_id: &str) -> Result<DeviceSnapshot> {
        let handle = self
            .registry
            .get(device_id)
            .ok_or_else(|| BridgeError::DeviceUnavailable(device_id.to_string()))?;
        handle.snapshot().await
    }

    /// Stop everything, each phase bounded by the shutdown grace period.
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if !self.ctx.mark_stopped() {
            return;
        }
        info!("bridge stopping");
        let grace = self.ctx.config.shutdown_grace();
        if let Some(router) = self.router.take() {
            router.abort();
        }

        let handles = self.registry.handles();
        let stop_all = async {
            for handle in &handles {
                if let Err(e) = handle.stop().await {
                    debug!(device = handle.device_id(), error = %e, "stop not acknowledged");
                }
            }
        };
        if timeout(grace, stop_all).await.is_err() {
            warn!("device timers not all cancelled within grace period");
        }

        if timeout(grace, self.cloud.disconnect_all(true)).await.is_err() {
            warn!("transport disconnect did not finish within grace period");
        }
        self.ctx.set_connection(false).await;

        for handle in &handles {
            handle.terminate();
        }
        let tasks = &mut self.tasks;
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if timeout(grace, drain).await.is_err() {
            warn!("device tasks still running after grace period, aborting");
            self.tasks.abort_all();
        }
        info!("bridge stopped");
    }
}

async fn route_writes(ctx: Arc<BridgeContext>, registry: Arc<Registry>) {
    let mut init = ctx.initialized();
    if init.wait_for(|done| *done).await.is_err() {
        return;
    }
    let mut writes = ctx.store.subscribe_writes();
    debug!("accepting external writes");
    while let Some(write) = writes.recv().await {
        let address = write.address.to_string();
        if let Err(e) = registry.dispatch_write(write) {
            warn!(point = %address, error = %e, "external write not dispatched");
        }
    }
}
