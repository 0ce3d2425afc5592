//! Connection lifecycle of one device.
//!
//! `Connecting -> Connected -> {Disconnected, Erroring} -> Connecting`, with
//! `Stopped` reached only at shutdown. Once the bridge is stopped no reconnect
//! timer is armed again, whatever the session keeps reporting.

use crate::{poller, sync, BridgeContext, ConnectionState, DeviceMsg, DeviceRecord, PublishReport, Result};
use cloud_transport::namespace;
use device_registry::{DeviceEvent, PointValue};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Open the session for the first time.
pub async fn start(ctx: &BridgeContext, rec: &mut DeviceRecord, tx: &mpsc::Sender<DeviceMsg>) {
    rec.state = ConnectionState::Connecting;
    debug!(device = rec.id(), "connecting");
    if let Err(e) = rec.session.connect().await {
        on_error(ctx, rec, &e.to_string(), tx);
    }
}

/// Session is up: publish the device, query its online status and start metering polls.
///
/// The online status is queried even when the initial publish fails.
pub async fn on_connected(
    ctx: &BridgeContext,
    rec: &mut DeviceRecord,
    tx: &mpsc::Sender<DeviceMsg>,
) -> Result<PublishReport> {
    rec.reconnect_timer.cancel();
    if ctx.is_stopped() {
        debug!(device = rec.id(), "connected while stopping, ignored");
        return Ok(PublishReport::default());
    }
    info!(device = rec.id(), "device connected");

    let report = sync::initial_publish(ctx, rec).await;
    query_online_status(ctx, rec).await;
    if matches!(&report, Ok(report) if report.metering) {
        poller::schedule_steady(ctx, rec, tx);
    }

    rec.state = ConnectionState::Connected;
    if !rec.counted {
        rec.counted = true;
        ctx.device_connected().await;
    }
    finish_first_attempt(ctx, rec);
    report
}

async fn query_online_status(ctx: &BridgeContext, rec: &mut DeviceRecord) {
    let status = match rec.session.online_status().await {
        Ok(payload) => payload,
        Err(e) => {
            debug!(device = rec.id(), error = %e, "online status query failed");
            return;
        }
    };
    debug!(device = rec.id(), payload = %status, "online status");
    let applied = match DeviceEvent::decode(namespace::SYSTEM_ONLINE, &status) {
        Ok(event) => sync::apply_decoded(ctx, rec, event).await.map(|_| ()),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = applied {
        debug!(device = rec.id(), error = %e, "online status not applied");
    }
}

/// Session closed. Metering stops until the next connect; a reconnect is scheduled unless stopping.
pub async fn on_closed(
    ctx: &BridgeContext,
    rec: &mut DeviceRecord,
    reason: Option<&str>,
    tx: &mpsc::Sender<DeviceMsg>,
) {
    info!(device = rec.id(), reason = reason.unwrap_or("none"), "device closed");
    let addr = rec.address("online");
    if let Some(point) = rec.points.get_mut("online") {
        point.update(PointValue::Bool(false));
        if let Err(e) = ctx.store.set_value(&addr, PointValue::Bool(false), true).await {
            warn!(point = %addr, error = %e, "failed to mark device offline");
        }
    }
    if rec.counted {
        rec.counted = false;
        ctx.device_disconnected().await;
    }
    rec.poll_timer.cancel();
    finish_first_attempt(ctx, rec);

    if ctx.is_stopped() {
        rec.state = ConnectionState::Stopped;
        return;
    }
    rec.state = ConnectionState::Disconnected;
    schedule_reconnect(ctx, rec, tx);
}

/// Session error. Replaces any pending reconnect with exactly one fresh attempt.
pub fn on_error(ctx: &BridgeContext, rec: &mut DeviceRecord, error: &str, tx: &mpsc::Sender<DeviceMsg>) {
    info!(device = rec.id(), error, "device error");
    finish_first_attempt(ctx, rec);
    if ctx.is_stopped() {
        return;
    }
    rec.state = ConnectionState::Erroring;
    schedule_reconnect(ctx, rec, tx);
}

pub fn on_reconnected(rec: &mut DeviceRecord) {
    info!(device = rec.id(), "device reconnected");
    rec.reconnect_timer.cancel();
}

/// Reconnect timer fired.
pub async fn on_reconnect_due(
    ctx: &BridgeContext,
    rec: &mut DeviceRecord,
    generation: u64,
    tx: &mpsc::Sender<DeviceMsg>,
) {
    if !rec.reconnect_timer.take_if_current(generation) || ctx.is_stopped() {
        return;
    }
    rec.state = ConnectionState::Connecting;
    debug!(device = rec.id(), "reconnecting");
    if let Err(e) = rec.session.connect().await {
        on_error(ctx, rec, &e.to_string(), tx);
    }
}

/// Arm the reconnect timer, replacing a pending one. Never arms once stopped.
pub fn schedule_reconnect(ctx: &BridgeContext, rec: &mut DeviceRecord, tx: &mpsc::Sender<DeviceMsg>) -> bool {
    if ctx.is_stopped() {
        return false;
    }
    let delay = ctx.config.reconnect_backoff();
    let generation = rec.reconnect_timer.schedule(delay, tx, DeviceMsg::ReconnectDue);
    ctx.metrics.bridge.reconnects_scheduled.inc();
    debug!(device = rec.id(), ?delay, generation, "reconnect scheduled");
    true
}

/// Shutdown of this device: cancel both timers.
pub fn stop(rec: &mut DeviceRecord) {
    rec.poll_timer.cancel();
    rec.reconnect_timer.cancel();
    rec.state = ConnectionState::Closing;
    debug!(device = rec.id(), "device stopping");
}

fn finish_first_attempt(ctx: &BridgeContext, rec: &mut DeviceRecord) {
    if !rec.first_attempt_done {
        rec.first_attempt_done = true;
        ctx.first_attempt_done();
    }
}
