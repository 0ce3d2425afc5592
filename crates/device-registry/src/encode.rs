use crate::{ControlAction, LightField, PointValue, ValueType};
use cloud_transport::DeviceCommand;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EncodeError {
    #[error("expected a {expected} value, got {got}")]
    TypeMismatch { expected: ValueType, got: ValueType },
    #[error("invalid color `{0}`, expected #rrggbb")]
    InvalidColor(String),
    #[error("{field} value {value} out of range")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Build the device command for a write of `value` on a point bound to `action`.
pub fn build_command(action: &ControlAction, value: &PointValue) -> Result<DeviceCommand, EncodeError> {
    let cmd = match *action {
        ControlAction::Toggle => DeviceCommand::Toggle {
            onoff: on_off(value)?,
        },
        ControlAction::ToggleX { channel } => DeviceCommand::ToggleX {
            channel,
            onoff: on_off(value)?,
        },
        ControlAction::GarageDoor { channel } => DeviceCommand::GarageDoor {
            channel,
            open: on_off(value)?,
        },
        ControlAction::Light { channel, field } => {
            let mut cmd = LightCommand::new(channel, field);
            match field {
                LightField::Rgb => {
                    let text = value.as_str().ok_or(EncodeError::TypeMismatch {
                        expected: ValueType::String,
                        got: value.value_type(),
                    })?;
                    cmd.rgb = Some(parse_hex_color(text)?);
                }
                LightField::Temperature => cmd.temperature = Some(percent(field, value)?),
                LightField::Luminance => cmd.luminance = Some(percent(field, value)?),
            }
            cmd.into()
        }
    };
    Ok(cmd)
}

struct LightCommand {
    channel: u32,
    capacity: u8,
    rgb: Option<u32>,
    temperature: Option<u8>,
    luminance: Option<u8>,
}

impl LightCommand {
    fn new(channel: u32, field: LightField) -> Self {
        Self {
            channel,
            capacity: field.capacity(),
            rgb: None,
            temperature: None,
            luminance: None,
        }
    }
}

impl From<LightCommand> for DeviceCommand {
    fn from(c: LightCommand) -> Self {
        DeviceCommand::Light {
            channel: c.channel,
            capacity: c.capacity,
            rgb: c.rgb,
            temperature: c.temperature,
            luminance: c.luminance,
        }
    }
}

fn on_off(value: &PointValue) -> Result<u8, EncodeError> {
    value
        .as_bool()
        .map(u8::from)
        .ok_or(EncodeError::TypeMismatch {
            expected: ValueType::Boolean,
            got: value.value_type(),
        })
}

fn percent(field: LightField, value: &PointValue) -> Result<u8, EncodeError> {
    let n = value.as_f64().ok_or(EncodeError::TypeMismatch {
        expected: ValueType::Number,
        got: value.value_type(),
    })?;
    if !(0.0..=100.0).contains(&n) {
        return Err(EncodeError::OutOfRange {
            field: field.name(),
            value: n,
        });
    }
    Ok(n.round() as u8)
}

/// Packed 24-bit color to `#rrggbb`; bits above 24 are dropped.
pub fn hex_color(packed: i64) -> String {
    format!("#{:06x}", (packed as u32) & 0x00FF_FFFF)
}

pub fn parse_hex_color(text: &str) -> Result<u32, EncodeError> {
    let digits = text.trim().trim_start_matches('#');
    if digits.len() != 6 {
        return Err(EncodeError::InvalidColor(text.to_string()));
    }
    u32::from_str_radix(digits, 16).map_err(|_| EncodeError::InvalidColor(text.to_string()))
}
