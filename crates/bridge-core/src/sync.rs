//! State synchronization: initial publish, inbound events and outbound writes.
//!
//! All functions take the device record exclusively; callers serialize them
//! per device.

use crate::{BridgeContext, BridgeError, ConnectionState, DeviceRecord, Result};
use cloud_transport::DeviceCommand;
use device_registry::{
    build_command, field_spec, light_value, map_capability_payload, normalize, AbilitySet,
    ControlAction, DeviceEvent, MapOutcome, MappingIssue, PointDescriptor, PointValue, Role,
    StatePoint,
};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishReport {
    /// Canonical points created from the digest and the metering reading.
    pub mapped: usize,
    pub issues: Vec<MappingIssue>,
    pub metering: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    Ignored,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventOutcome {
    pub kind: &'static str,
    /// Points whose value was written, in order.
    pub updated: Vec<String>,
    /// A short-delay metering poll should follow.
    pub repoll: bool,
    pub disposition: Disposition,
}

impl EventOutcome {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            updated: Vec::new(),
            repoll: false,
            disposition: Disposition::Applied,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub command: DeviceCommand,
    /// Points updated from the command response.
    pub updated: Vec<String>,
    pub repoll: bool,
}

/// Fetch abilities and full state, then publish the device object and its points.
///
/// Fetch failures are returned; the device then keeps only the points that
/// were already published. Unsupported payload parts end up in the report.
pub async fn initial_publish(ctx: &BridgeContext, rec: &mut DeviceRecord) -> Result<PublishReport> {
    let device_id = rec.id().to_string();
    ctx.store
        .ensure_device(&device_id, &rec.def.display_name())
        .await?;
    publish(
        ctx,
        rec,
        PointDescriptor::read_only("online", "Device online status", PointValue::Bool(false))
            .with_role(Role::Reachable),
    )
    .await?;

    let abilities = AbilitySet::from_payload(&rec.session.system_abilities().await?)?;
    debug!(device = %device_id, abilities = ?abilities.names().collect::<Vec<_>>(), "device abilities");
    rec.abilities = Some(abilities.clone());

    let all = rec.session.system_all_data().await?;
    trace!(device = %device_id, payload = %all, "full device state");

    if let Some(ip) = all
        .pointer("/all/system/firmware/innerIp")
        .and_then(Value::as_str)
    {
        publish(
            ctx,
            rec,
            PointDescriptor::read_only("ip", "Device IP", PointValue::from(ip)).with_role(Role::Ip),
        )
        .await?;
    }

    let mut report = PublishReport::default();
    if !abilities.is_mappable() {
        info!(device = %device_id, "device reports no supported ability, nothing to map");
        return Ok(report);
    }

    let channels = rec.def.channels.clone();
    if abilities.has_digest_capability() {
        let digest = ["/all/digest", "/all/control"]
            .into_iter()
            .filter_map(|p| all.pointer(p))
            .find(|v| !v.is_null());
        match digest {
            Some(digest) => {
                let outcome = map_capability_payload(&device_id, &channels, digest);
                publish_outcome(ctx, rec, outcome, &mut report).await?;
            }
            None => report.issues.push(MappingIssue::UnsupportedShape {
                section: "all",
                detail: "no digest or control section".into(),
            }),
        }
    }

    if abilities.supports_metering() {
        report.metering = true;
        match rec.session.control_electricity().await {
            Ok(reading) => {
                trace!(device = %device_id, payload = %reading, "electricity");
                let outcome = map_capability_payload(&device_id, &channels, &reading);
                publish_outcome(ctx, rec, outcome, &mut report).await?;
            }
            Err(e) => warn!(device = %device_id, error = %e, "electricity fetch failed"),
        }
    }

    for issue in &report.issues {
        info!(device = %device_id, %issue, "payload part not mapped");
    }
    Ok(report)
}

async fn publish_outcome(
    ctx: &BridgeContext,
    rec: &mut DeviceRecord,
    outcome: MapOutcome,
    report: &mut PublishReport,
) -> Result<()> {
    report.mapped += outcome.points.len();
    report.issues.extend(outcome.issues);
    for desc in outcome.points {
        publish(ctx, rec, desc).await?;
    }
    Ok(())
}

async fn publish(ctx: &BridgeContext, rec: &mut DeviceRecord, desc: PointDescriptor) -> Result<()> {
    let addr = rec.address(&desc.id);
    ctx.store
        .create_or_update_point(&addr, desc.meta(), Some(desc.initial.clone()))
        .await?;
    rec.points.insert(desc.id.clone(), StatePoint::from(desc));
    Ok(())
}

/// Decode a push event and apply it.
pub async fn apply_event(
    ctx: &BridgeContext,
    rec: &mut DeviceRecord,
    namespace: &str,
    payload: &Value,
) -> Result<EventOutcome> {
    ctx.metrics.bridge.events_received.inc();
    debug!(device = rec.id(), namespace, "event received");
    trace!(device = rec.id(), namespace, payload = %payload, "event payload");
    let event = DeviceEvent::decode(namespace, payload)?;
    apply_decoded(ctx, rec, event).await
}

pub async fn apply_decoded(
    ctx: &BridgeContext,
    rec: &mut DeviceRecord,
    event: DeviceEvent,
) -> Result<EventOutcome> {
    let mut out = EventOutcome::new(event.kind());
    match event {
        DeviceEvent::Toggle(state) => {
            set_point(ctx, rec, "0-switch", state.is_on().into(), &mut out.updated).await?;
            out.repoll = rec.supports_metering();
        }
        DeviceEvent::ToggleX(states) => {
            for state in states {
                let id = state.channel.to_string();
                set_point(ctx, rec, &id, state.is_on().into(), &mut out.updated).await?;
            }
            out.repoll = rec.supports_metering();
        }
        DeviceEvent::Electricity(reading) => {
            let channel = reading.channel.unwrap_or(0);
            for (field, raw) in &reading.fields {
                let value = normalize(*raw, field_spec(field).scale);
                let id = format!("{channel}-{field}");
                set_point(ctx, rec, &id, value.into(), &mut out.updated).await?;
            }
        }
        DeviceEvent::GarageDoor(states) => {
            for state in states {
                if !state.is_executing() {
                    let id = format!("{}-garageDoor", state.channel);
                    set_point(ctx, rec, &id, state.is_open().into(), &mut out.updated).await?;
                }
                let id = format!("{}-garageDoorWorking", state.channel);
                set_point(ctx, rec, &id, state.is_working().into(), &mut out.updated).await?;
            }
        }
        DeviceEvent::Light(reading) => {
            let channel = reading.channel.unwrap_or(0);
            for (field, raw) in &reading.fields {
                let id = format!("{channel}-{field}");
                set_point(ctx, rec, &id, light_value(field, *raw), &mut out.updated).await?;
            }
        }
        DeviceEvent::Online(status) => {
            set_point(ctx, rec, "online", status.is_online().into(), &mut out.updated).await?;
        }
        DeviceEvent::Ignored { namespace } => {
            debug!(device = rec.id(), %namespace, "event discarded");
            out.disposition = Disposition::Ignored;
        }
        DeviceEvent::Unknown { namespace, payload } => {
            ctx.metrics.bridge.events_unknown.inc();
            info!(device = rec.id(), %namespace, payload = %payload, "received unknown event");
            out.disposition = Disposition::Unknown;
        }
    }
    Ok(out)
}

/// Update a known point locally and in the store (acknowledged).
pub(crate) async fn set_point(
    ctx: &BridgeContext,
    rec: &mut DeviceRecord,
    point_id: &str,
    value: PointValue,
    updated: &mut Vec<String>,
) -> Result<()> {
    let addr = rec.address(point_id);
    let Some(point) = rec.points.get_mut(point_id) else {
        debug!(point = %addr, %value, "no such point, value dropped");
        return Ok(());
    };
    point.update(value.clone());
    ctx.store.set_value(&addr, value, true).await?;
    updated.push(point_id.to_string());
    Ok(())
}

/// Send the command bound to a writable point.
///
/// A failed command is returned as an error and the local value is left as it
/// was; the next event or poll brings the authoritative state.
pub async fn apply_write(
    ctx: &BridgeContext,
    rec: &mut DeviceRecord,
    point_id: &str,
    value: PointValue,
) -> Result<WriteOutcome> {
    let device_id = rec.id().to_string();
    let point = rec
        .points
        .get(point_id)
        .ok_or_else(|| BridgeError::UnknownPoint {
            device_id: device_id.clone(),
            point_id: point_id.to_string(),
        })?;
    let action = point.control.ok_or_else(|| BridgeError::ReadOnlyPoint {
        device_id: device_id.clone(),
        point_id: point_id.to_string(),
    })?;
    if rec.state != ConnectionState::Connected {
        debug!(device = %device_id, point = point_id, "device not connected, write dropped");
        return Err(BridgeError::DeviceUnavailable(device_id));
    }

    let command = build_command(&action, &value)?;
    debug!(device = %device_id, point = point_id, %value, namespace = command.namespace(), "sending command");
    let response = match rec.session.execute(&command).await {
        Ok(response) => {
            ctx.metrics.bridge.commands_sent.inc();
            response
        }
        Err(e) => {
            ctx.metrics.bridge.command_failures.inc();
            warn!(device = %device_id, point = point_id, error = %e, "command failed");
            return Err(e.into());
        }
    };
    trace!(device = %device_id, payload = %response, "command response");

    let mut out = WriteOutcome {
        command,
        updated: Vec::new(),
        repoll: false,
    };
    if let ControlAction::GarageDoor { channel } = action {
        if let Some(execute) = response.pointer("/state/execute").and_then(flag) {
            let id = format!("{channel}-garageDoorWorking");
            set_point(ctx, rec, &id, execute.into(), &mut out.updated).await?;
        }
    }
    out.repoll = action.affects_power() && rec.supports_metering();
    Ok(out)
}

fn flag(value: &Value) -> Option<bool> {
    value
        .as_bool()
        .or_else(|| value.as_f64().map(|n| n != 0.0))
}
