use core::fmt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Number,
    String,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::String => "string",
        };
        f.write_str(s)
    }
}

/// Semantic tag of a state point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "state")]
    State,
    #[serde(rename = "switch")]
    Switch,
    #[serde(rename = "sensor")]
    Sensor,
    #[serde(rename = "button")]
    Button,
    #[serde(rename = "value")]
    Value,
    #[serde(rename = "level")]
    Level,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "value.power")]
    Power,
    #[serde(rename = "value.current")]
    Current,
    #[serde(rename = "value.voltage")]
    Voltage,
    #[serde(rename = "level.color.rgb")]
    ColorRgb,
    #[serde(rename = "level.color.temperature")]
    ColorTemperature,
    #[serde(rename = "level.color.luminance")]
    ColorLuminance,
    #[serde(rename = "indicator.reachable")]
    Reachable,
    #[serde(rename = "indicator.connected")]
    Connected,
    #[serde(rename = "info.ip")]
    Ip,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::State => "state",
            Role::Switch => "switch",
            Role::Sensor => "sensor",
            Role::Button => "button",
            Role::Value => "value",
            Role::Level => "level",
            Role::Text => "text",
            Role::Power => "value.power",
            Role::Current => "value.current",
            Role::Voltage => "value.voltage",
            Role::ColorRgb => "level.color.rgb",
            Role::ColorTemperature => "level.color.temperature",
            Role::ColorLuminance => "level.color.luminance",
            Role::Reachable => "indicator.reachable",
            Role::Connected => "indicator.connected",
            Role::Ip => "info.ip",
        }
    }

    /// Generic role from the value type and access flags.
    pub fn classify(value_type: ValueType, readable: bool, writable: bool) -> Role {
        match (value_type, readable, writable) {
            (ValueType::Boolean, true, false) => Role::Sensor,
            (ValueType::Boolean, false, true) => Role::Button,
            (ValueType::Boolean, true, true) => Role::Switch,
            (ValueType::Number, true, false) => Role::Value,
            (ValueType::Number, _, true) => Role::Level,
            (ValueType::String, _, _) => Role::Text,
            _ => Role::State,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed value of a state point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl PointValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            PointValue::Bool(_) => ValueType::Boolean,
            PointValue::Number(_) => ValueType::Number,
            PointValue::Text(_) => ValueType::String,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PointValue::Bool(b) => Some(*b),
            PointValue::Number(n) => Some(*n != 0.0),
            PointValue::Text(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PointValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PointValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for PointValue {
    fn from(v: bool) -> Self {
        PointValue::Bool(v)
    }
}

impl From<f64> for PointValue {
    fn from(v: f64) -> Self {
        PointValue::Number(v)
    }
}

impl From<String> for PointValue {
    fn from(v: String) -> Self {
        PointValue::Text(v)
    }
}

impl From<&str> for PointValue {
    fn from(v: &str) -> Self {
        PointValue::Text(v.to_string())
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::Bool(b) => write!(f, "{b}"),
            PointValue::Number(n) => write!(f, "{n}"),
            PointValue::Text(s) => f.write_str(s),
        }
    }
}

/// Per-field normalization and presentation for metering and light readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Power of ten applied to the raw reading.
    pub scale: i32,
    pub unit: &'static str,
    pub role: Option<Role>,
}

pub fn field_spec(field: &str) -> FieldSpec {
    let (scale, unit, role) = match field {
        "power" => (-3, "W", Some(Role::Power)),
        "current" => (-3, "A", Some(Role::Current)),
        "voltage" => (-1, "V", Some(Role::Voltage)),
        "capacity" => (0, "", None),
        "rgb" => (0, "", Some(Role::ColorRgb)),
        "temperature" => (0, "%", Some(Role::ColorTemperature)),
        "luminance" => (0, "%", Some(Role::ColorLuminance)),
        _ => (0, "", None),
    };
    FieldSpec { scale, unit, role }
}

/// `raw * 10^scale`, rounded to two decimals.
pub fn normalize(raw: f64, scale: i32) -> f64 {
    (raw * 10f64.powi(scale) * 100.0).round() / 100.0
}

/// Light fields that accept writes, with their capacity bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightField {
    Rgb,
    Temperature,
    Luminance,
}

impl LightField {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rgb" => Some(LightField::Rgb),
            "temperature" => Some(LightField::Temperature),
            "luminance" => Some(LightField::Luminance),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LightField::Rgb => "rgb",
            LightField::Temperature => "temperature",
            LightField::Luminance => "luminance",
        }
    }

    pub fn capacity(self) -> u8 {
        match self {
            LightField::Rgb => 1,
            LightField::Temperature => 2,
            LightField::Luminance => 4,
        }
    }
}

/// Device command bound to a writable point when the point is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAction {
    Toggle,
    ToggleX { channel: u32 },
    GarageDoor { channel: u32 },
    Light { channel: u32, field: LightField },
}

impl ControlAction {
    /// Whether a successful command is expected to change power draw.
    pub fn affects_power(&self) -> bool {
        matches!(self, ControlAction::Toggle | ControlAction::ToggleX { .. })
    }
}

/// Store-facing metadata of a point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub role: Role,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    pub read: bool,
    pub write: bool,
}

/// A point as produced by the capability mapper, before it is published.
#[derive(Debug, Clone, PartialEq)]
pub struct PointDescriptor {
    pub id: String,
    pub name: String,
    pub value_type: ValueType,
    pub readable: bool,
    pub role: Role,
    pub unit: String,
    pub scale: i32,
    pub initial: PointValue,
    pub control: Option<ControlAction>,
}

impl PointDescriptor {
    pub fn read_only(id: impl Into<String>, name: impl Into<String>, initial: PointValue) -> Self {
        let value_type = initial.value_type();
        Self {
            id: id.into(),
            name: name.into(),
            value_type,
            readable: true,
            role: Role::classify(value_type, true, false),
            unit: String::new(),
            scale: 0,
            initial,
            control: None,
        }
    }

    pub fn controlled(
        id: impl Into<String>,
        name: impl Into<String>,
        initial: PointValue,
        control: ControlAction,
    ) -> Self {
        let value_type = initial.value_type();
        Self {
            role: Role::classify(value_type, true, true),
            control: Some(control),
            ..Self::read_only(id, name, initial)
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = scale;
        self
    }

    /// Writable exactly when a control action is bound.
    pub fn writable(&self) -> bool {
        self.control.is_some()
    }

    pub fn meta(&self) -> PointMeta {
        PointMeta {
            name: self.name.clone(),
            value_type: self.value_type,
            role: self.role,
            unit: self.unit.clone(),
            read: self.readable,
            write: self.writable(),
        }
    }
}

/// Runtime state of a published point.
#[derive(Debug, Clone, PartialEq)]
pub struct StatePoint {
    pub meta: PointMeta,
    pub scale: i32,
    pub control: Option<ControlAction>,
    pub value: PointValue,
    pub updated_at: OffsetDateTime,
}

impl StatePoint {
    pub fn writable(&self) -> bool {
        self.control.is_some()
    }

    /// Replace the value; returns whether it changed.
    pub fn update(&mut self, value: PointValue) -> bool {
        self.updated_at = OffsetDateTime::now_utc();
        if self.value == value {
            return false;
        }
        self.value = value;
        true
    }
}

impl From<PointDescriptor> for StatePoint {
    fn from(desc: PointDescriptor) -> Self {
        let meta = desc.meta();
        Self {
            meta,
            scale: desc.scale,
            control: desc.control,
            value: desc.initial,
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metering_values_are_scaled_and_rounded() {
        assert_eq!(normalize(2331.0, field_spec("voltage").scale), 233.1);
        assert_eq!(normalize(27840.0, field_spec("power").scale), 27.84);
        assert_eq!(normalize(1234.0, field_spec("current").scale), 1.23);
        assert_eq!(normalize(42.0, field_spec("capacity").scale), 42.0);
    }

    #[test]
    fn roles_follow_type_and_access() {
        assert_eq!(Role::classify(ValueType::Boolean, true, true), Role::Switch);
        assert_eq!(Role::classify(ValueType::Boolean, true, false), Role::Sensor);
        assert_eq!(Role::classify(ValueType::Boolean, false, true), Role::Button);
        assert_eq!(Role::classify(ValueType::Number, true, false), Role::Value);
        assert_eq!(Role::classify(ValueType::Number, true, true), Role::Level);
        assert_eq!(Role::classify(ValueType::String, true, false), Role::Text);
    }

    #[test]
    fn writability_follows_control_binding() {
        let ro = PointDescriptor::read_only("0-power", "power", PointValue::Number(1.0));
        assert!(!ro.writable());
        assert!(!ro.meta().write);

        let rw = PointDescriptor::controlled(
            "0-switch",
            "Switch",
            PointValue::Bool(false),
            ControlAction::Toggle,
        );
        assert!(rw.writable());
        assert_eq!(rw.role, Role::Switch);
        assert!(rw.meta().write);
    }

    #[test]
    fn meta_serializes_with_store_field_names() {
        let desc = PointDescriptor::read_only("0-voltage", "voltage", PointValue::Number(233.1))
            .with_role(Role::Voltage)
            .with_unit("V");
        let json = serde_json::to_value(desc.meta()).unwrap();
        assert_eq!(json["type"], "number");
        assert_eq!(json["role"], "value.voltage");
        assert_eq!(json["unit"], "V");
        assert_eq!(json["write"], false);
    }

    #[test]
    fn state_point_reports_changes() {
        let mut point = StatePoint::from(PointDescriptor::read_only(
            "online",
            "Device online status",
            PointValue::Bool(false),
        ));
        assert!(!point.update(PointValue::Bool(false)));
        assert!(point.update(PointValue::Bool(true)));
        assert_eq!(point.value, PointValue::Bool(true));
    }
}
