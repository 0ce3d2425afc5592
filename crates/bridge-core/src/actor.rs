use crate::{lifecycle, poller, sync, BridgeContext, ConnectionState, DeviceRecord, Result, WriteOutcome};
use cloud_transport::{DeviceDef, DeviceSession, SessionEvent};
use device_registry::PointValue;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub(crate) const MAILBOX: usize = 64;

/// Messages handled by a device actor, in arrival order.
pub enum DeviceMsg {
    PollDue(u64),
    ReconnectDue(u64),
    Write {
        point_id: String,
        value: PointValue,
        reply: Option<oneshot::Sender<Result<WriteOutcome>>>,
    },
    Snapshot(oneshot::Sender<DeviceSnapshot>),
    /// Cancel timers ahead of the transport disconnect.
    Stop(oneshot::Sender<()>),
    Terminate,
}

/// Point values and timer state of one device at a moment in time.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub device_id: String,
    pub name: String,
    pub state: ConnectionState,
    pub abilities: Vec<String>,
    pub points: BTreeMap<String, PointValue>,
    pub poll_pending: bool,
    pub reconnect_pending: bool,
}

impl DeviceSnapshot {
    fn of(rec: &DeviceRecord) -> Self {
        Self {
            device_id: rec.id().to_string(),
            name: rec.def.display_name(),
            state: rec.state,
            abilities: rec
                .abilities
                .as_ref()
                .map(|a| a.names().map(str::to_string).collect())
                .unwrap_or_default(),
            points: rec
                .points
                .iter()
                .map(|(id, p)| (id.clone(), p.value.clone()))
                .collect(),
            poll_pending: rec.poll_timer.is_pending(),
            reconnect_pending: rec.reconnect_timer.is_pending(),
        }
    }
}

/// Owns one device record and serializes everything that touches it.
pub struct DeviceActor {
    ctx: Arc<BridgeContext>,
    record: DeviceRecord,
    events: mpsc::Receiver<SessionEvent>,
    mailbox: mpsc::Receiver<DeviceMsg>,
    tx: mpsc::Sender<DeviceMsg>,
}

impl DeviceActor {
    pub fn new(
        ctx: Arc<BridgeContext>,
        def: DeviceDef,
        session: Arc<dyn DeviceSession>,
        events: mpsc::Receiver<SessionEvent>,
    ) -> (Self, mpsc::Sender<DeviceMsg>) {
        let (tx, mailbox) = mpsc::channel(MAILBOX);
        let actor = Self {
            ctx,
            record: DeviceRecord::new(def, session),
            events,
            mailbox,
            tx: tx.clone(),
        };
        (actor, tx)
    }

    pub async fn run(mut self) {
        lifecycle::start(&self.ctx, &mut self.record, &self.tx).await;
        let mut events_open = true;
        loop {
            tokio::select! {
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.on_session_event(event).await,
                    None => {
                        debug!(device = self.record.id(), "session event stream ended");
                        events_open = false;
                    }
                },
                msg = self.mailbox.recv() => match msg {
                    Some(DeviceMsg::Terminate) | None => break,
                    Some(msg) => self.on_message(msg).await,
                },
            }
        }
        lifecycle::stop(&mut self.record);
        self.record.state = ConnectionState::Stopped;
        debug!(device = self.record.id(), "device actor finished");
    }

    async fn on_session_event(&mut self, event: SessionEvent) {
        let (ctx, rec, tx) = (&self.ctx, &mut self.record, &self.tx);
        match event {
            SessionEvent::Connected => match lifecycle::on_connected(ctx, rec, tx).await {
                Ok(report) => debug!(
                    device = rec.id(),
                    mapped = report.mapped,
                    issues = report.issues.len(),
                    "initial publish complete"
                ),
                Err(e) => warn!(device = rec.id(), error = %e, "initial publish failed"),
            },
            SessionEvent::Closed(reason) => lifecycle::on_closed(ctx, rec, reason.as_deref(), tx).await,
            SessionEvent::Error(error) => lifecycle::on_error(ctx, rec, &error, tx),
            SessionEvent::Reconnected => lifecycle::on_reconnected(rec),
            SessionEvent::Data { namespace, payload } => {
                on_data(ctx, rec, tx, &namespace, &payload).await;
            }
        }
    }

    async fn on_message(&mut self, msg: DeviceMsg) {
        let (ctx, rec, tx) = (&self.ctx, &mut self.record, &self.tx);
        match msg {
            DeviceMsg::PollDue(generation) => {
                poller::on_poll_due(ctx, rec, generation, tx).await;
            }
            DeviceMsg::ReconnectDue(generation) => {
                lifecycle::on_reconnect_due(ctx, rec, generation, tx).await;
            }
            DeviceMsg::Write {
                point_id,
                value,
                reply,
            } => {
                let result = sync::apply_write(ctx, rec, &point_id, value).await;
                if let Ok(outcome) = &result {
                    if outcome.repoll {
                        poller::schedule_repoll(ctx, rec, tx);
                    }
                }
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!(device = rec.id(), point = %point_id, error = %e, "write not applied");
                        }
                    }
                }
            }
            DeviceMsg::Snapshot(reply) => {
                let _ = reply.send(DeviceSnapshot::of(rec));
            }
            DeviceMsg::Stop(ack) => {
                lifecycle::stop(rec);
                let _ = ack.send(());
            }
            DeviceMsg::Terminate => {}
        }
    }
}

/// An actor that ends before its first connect attempt finished (including by
/// panicking) still counts that attempt, so initialization is never held up.
impl Drop for DeviceActor {
    fn drop(&mut self) {
        if !self.record.first_attempt_done {
            self.record.first_attempt_done = true;
            warn!(device = self.record.id(), "device task ended before its first connect attempt finished");
            self.ctx.first_attempt_done();
        }
    }
}

async fn on_data(
    ctx: &BridgeContext,
    rec: &mut DeviceRecord,
    tx: &mpsc::Sender<DeviceMsg>,
    namespace: &str,
    payload: &Value,
) {
    match sync::apply_event(ctx, rec, namespace, payload).await {
        Ok(outcome) if outcome.repoll => {
            poller::schedule_repoll(ctx, rec, tx);
        }
        Ok(_) => {}
        Err(e) => warn!(device = rec.id(), namespace, error = %e, "event not applied"),
    }
}
