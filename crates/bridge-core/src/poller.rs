//! Metering poll scheduling.

use crate::{sync, BridgeContext, BridgeError, DeviceMsg, DeviceRecord};
use cloud_transport::namespace;
use device_registry::DeviceEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum PollOutcome {
    /// The fire was superseded by a later schedule or a cancel.
    Stale,
    Updated { points: usize },
    Failed(BridgeError),
}

/// Arm the poll timer, replacing a pending poll. Returns false, arming
/// nothing, for devices without metering or once the bridge is stopping.
pub fn schedule_poll(
    ctx: &BridgeContext,
    rec: &mut DeviceRecord,
    delay: Duration,
    tx: &mpsc::Sender<DeviceMsg>,
) -> bool {
    if ctx.is_stopped() || !rec.supports_metering() {
        return false;
    }
    let generation = rec.poll_timer.schedule(delay, tx, DeviceMsg::PollDue);
    debug!(device = rec.id(), ?delay, generation, "electricity poll scheduled");
    true
}

pub fn schedule_steady(ctx: &BridgeContext, rec: &mut DeviceRecord, tx: &mpsc::Sender<DeviceMsg>) -> bool {
    schedule_poll(ctx, rec, ctx.config.polling_interval(), tx)
}

/// Poll soon after a command that changes power draw.
pub fn schedule_repoll(ctx: &BridgeContext, rec: &mut DeviceRecord, tx: &mpsc::Sender<DeviceMsg>) -> bool {
    schedule_poll(ctx, rec, ctx.config.repoll_delay(), tx)
}

/// Run a fired poll, then re-arm the steady interval whatever the result.
pub async fn on_poll_due(
    ctx: &BridgeContext,
    rec: &mut DeviceRecord,
    generation: u64,
    tx: &mpsc::Sender<DeviceMsg>,
) -> PollOutcome {
    if !rec.poll_timer.take_if_current(generation) {
        return PollOutcome::Stale;
    }
    ctx.metrics.bridge.polls_executed.inc();
    debug!(device = rec.id(), "electricity query executed");

    let outcome = match poll_once(ctx, rec).await {
        Ok(points) => PollOutcome::Updated { points },
        Err(e) => {
            ctx.metrics.bridge.poll_failures.inc();
            warn!(device = rec.id(), error = %e, "electricity poll failed");
            PollOutcome::Failed(e)
        }
    };
    schedule_steady(ctx, rec, tx);
    outcome
}

async fn poll_once(ctx: &BridgeContext, rec: &mut DeviceRecord) -> Result<usize, BridgeError> {
    let payload = rec.session.control_electricity().await?;
    let event = DeviceEvent::decode(namespace::ELECTRICITY, &payload)?;
    let applied = sync::apply_decoded(ctx, rec, event).await?;
    Ok(applied.updated.len())
}
