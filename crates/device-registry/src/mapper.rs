use crate::decode::decode_as;
use crate::{
    field_spec, hex_color, normalize, ControlAction, FieldReading, GarageDoorState, LightField,
    PointDescriptor, PointValue, ToggleState, ToggleXState,
};
use cloud_transport::ChannelDef;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// A part of a capability payload that produced no points.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MappingIssue {
    #[error("unsupported `{section}` shape: {detail}")]
    UnsupportedShape {
        section: &'static str,
        detail: String,
    },
    #[error("unsupported `{section}` channel {channel:?}")]
    UnsupportedChannel {
        section: &'static str,
        channel: Option<u32>,
    },
    #[error("non-numeric `{section}` field `{field}`")]
    NonNumericField { section: &'static str, field: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapOutcome {
    pub points: Vec<PointDescriptor>,
    pub issues: Vec<MappingIssue>,
}

impl MapOutcome {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn issue(&mut self, issue: MappingIssue) {
        self.issues.push(issue);
    }

    fn unsupported(&mut self, section: &'static str, value: &Value) {
        self.issue(MappingIssue::UnsupportedShape {
            section,
            detail: value.to_string(),
        });
    }
}

const SECTIONS: [&str; 5] = ["toggle", "togglex", "electricity", "garageDoor", "light"];

/// Map a capability payload (a device digest or a metering response) to point descriptors.
///
/// Sections that cannot be classified are returned as issues next to whatever
/// points the rest of the payload produced; mapping never fails as a whole.
pub fn map_capability_payload(device_id: &str, channels: &[ChannelDef], payload: &Value) -> MapOutcome {
    let mut out = MapOutcome::default();

    if !SECTIONS.iter().any(|s| payload.get(s).is_some()) {
        out.unsupported("payload", payload);
        return out;
    }

    if let Some(toggle) = payload.get("toggle") {
        map_toggle(toggle, &mut out);
    } else if let (Some(togglex), None) = (payload.get("togglex"), payload.get("garageDoor")) {
        map_togglex(togglex, channels, &mut out);
    }
    if let Some(electricity) = payload.get("electricity") {
        map_electricity(electricity, &mut out);
    }
    if let Some(garage) = payload.get("garageDoor") {
        map_garage_door(garage, &mut out);
    }
    if let Some(light) = payload.get("light") {
        map_light(light, &mut out);
    }

    debug!(
        device = device_id,
        points = out.points.len(),
        issues = out.issues.len(),
        "mapped capability payload"
    );
    out
}

fn map_toggle(value: &Value, out: &mut MapOutcome) {
    match decode_as::<ToggleState>("toggle", value) {
        Ok(state) => out.points.push(PointDescriptor::controlled(
            "0-switch",
            "Switch",
            PointValue::Bool(state.is_on()),
            ControlAction::Toggle,
        )),
        Err(_) => out.unsupported("toggle", value),
    }
}

fn map_togglex(value: &Value, channels: &[ChannelDef], out: &mut MapOutcome) {
    for entry in entries(value) {
        let Ok(state) = decode_as::<ToggleXState>("togglex", entry) else {
            out.unsupported("togglex", entry);
            continue;
        };
        let name = match ChannelDef::name_of(channels, state.channel) {
            Some(name) => name.to_string(),
            None if state.channel == 0 => "All".to_string(),
            None => String::new(),
        };
        out.points.push(PointDescriptor::controlled(
            state.channel.to_string(),
            name,
            PointValue::Bool(state.is_on()),
            ControlAction::ToggleX {
                channel: state.channel,
            },
        ));
    }
}

fn map_electricity(value: &Value, out: &mut MapOutcome) {
    let reading = match FieldReading::from_section("electricity", value) {
        Ok(r) => r,
        Err(_) => return out.unsupported("electricity", value),
    };
    let channel = match reading.channel {
        Some(0) => 0,
        other => {
            return out.issue(MappingIssue::UnsupportedChannel {
                section: "electricity",
                channel: other,
            })
        }
    };
    for (field, raw) in &reading.fields {
        let spec = field_spec(field);
        let mut point = PointDescriptor::read_only(
            format!("{channel}-{field}"),
            field.as_str(),
            PointValue::Number(normalize(*raw, spec.scale)),
        )
        .with_unit(spec.unit)
        .with_scale(spec.scale);
        if let Some(role) = spec.role {
            point = point.with_role(role);
        }
        out.points.push(point);
    }
    non_numeric("electricity", reading, out);
}

fn map_garage_door(value: &Value, out: &mut MapOutcome) {
    if !value.is_array() {
        return out.unsupported("garageDoor", value);
    }
    for entry in entries(value) {
        let Ok(state) = decode_as::<GarageDoorState>("garageDoor", entry) else {
            out.unsupported("garageDoor", entry);
            continue;
        };
        let door = format!("{}-garageDoor", state.channel);
        let working = format!("{}-garageDoorWorking", state.channel);
        out.points.push(PointDescriptor::controlled(
            door.clone(),
            door,
            PointValue::Bool(state.is_open()),
            ControlAction::GarageDoor {
                channel: state.channel,
            },
        ));
        out.points.push(PointDescriptor::read_only(
            working.clone(),
            working,
            PointValue::Bool(false),
        ));
    }
}

fn map_light(value: &Value, out: &mut MapOutcome) {
    let reading = match FieldReading::from_section("light", value) {
        Ok(r) => r,
        Err(_) => return out.unsupported("light", value),
    };
    let channel = reading.channel.unwrap_or(0);
    for (field, raw) in &reading.fields {
        let id = format!("{channel}-{field}");
        let spec = field_spec(field);
        let initial = light_value(field, *raw);
        let mut point = match LightField::from_name(field) {
            Some(lf) => PointDescriptor::controlled(
                id.clone(),
                id,
                initial,
                ControlAction::Light { channel, field: lf },
            ),
            None => PointDescriptor::read_only(id.clone(), id, initial),
        }
        .with_unit(spec.unit);
        if let Some(role) = spec.role {
            point = point.with_role(role);
        }
        out.points.push(point);
    }
    non_numeric("light", reading, out);
}

/// Value of a light field as published: `rgb` as a color string, everything else as is.
pub fn light_value(field: &str, raw: f64) -> PointValue {
    if field == LightField::Rgb.name() {
        PointValue::Text(hex_color(raw as i64))
    } else {
        PointValue::Number(raw)
    }
}

fn non_numeric(section: &'static str, reading: FieldReading, out: &mut MapOutcome) {
    for field in reading.non_numeric {
        out.issue(MappingIssue::NonNumericField { section, field });
    }
}

fn entries(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}
