use cloud_transport::namespace;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeError {
    #[error("missing `{0}` section")]
    MissingSection(&'static str),
    #[error("malformed `{section}` payload: {detail}")]
    Malformed {
        section: &'static str,
        detail: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ToggleState {
    #[serde(deserialize_with = "flag")]
    pub onoff: u8,
}

impl ToggleState {
    pub fn is_on(&self) -> bool {
        self.onoff != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ToggleXState {
    pub channel: u32,
    #[serde(deserialize_with = "flag")]
    pub onoff: u8,
}

impl ToggleXState {
    pub fn is_on(&self) -> bool {
        self.onoff != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GarageDoorState {
    pub channel: u32,
    #[serde(deserialize_with = "flag")]
    pub open: u8,
    #[serde(default, deserialize_with = "flag")]
    pub execute: u8,
}

impl GarageDoorState {
    pub fn is_open(&self) -> bool {
        self.open != 0
    }

    /// The door is still moving; `open` describes the target, not the position.
    pub fn is_executing(&self) -> bool {
        self.execute == 1
    }

    pub fn is_working(&self) -> bool {
        self.execute != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OnlineStatus {
    pub status: i64,
}

impl OnlineStatus {
    pub fn is_online(&self) -> bool {
        self.status == 1
    }
}

/// A flat `{ "channel": n, "<field>": <number>, ... }` reading (metering, light).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldReading {
    pub channel: Option<u32>,
    pub fields: BTreeMap<String, f64>,
    /// Fields present in the payload whose value was not numeric.
    pub non_numeric: Vec<String>,
}

impl FieldReading {
    pub fn from_section(section: &'static str, value: &Value) -> Result<Self, DecodeError> {
        let map = value.as_object().ok_or_else(|| DecodeError::Malformed {
            section,
            detail: format!("expected an object, got {value}"),
        })?;
        let mut reading = FieldReading::default();
        for (key, val) in map {
            if key == "channel" {
                reading.channel = val.as_u64().and_then(|c| u32::try_from(c).ok());
                continue;
            }
            match val.as_f64() {
                Some(n) => {
                    reading.fields.insert(key.clone(), n);
                }
                None => reading.non_numeric.push(key.clone()),
            }
        }
        Ok(reading)
    }
}

/// A push event decoded from its namespace and payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Toggle(ToggleState),
    ToggleX(Vec<ToggleXState>),
    Electricity(FieldReading),
    GarageDoor(Vec<GarageDoorState>),
    Light(FieldReading),
    Online(OnlineStatus),
    /// Known namespace without a point mapping.
    Ignored { namespace: String },
    Unknown { namespace: String, payload: Value },
}

impl DeviceEvent {
    pub fn decode(ns: &str, payload: &Value) -> Result<Self, DecodeError> {
        let event = match ns {
            namespace::TOGGLE => DeviceEvent::Toggle(decode_as("toggle", section(payload, "toggle")?)?),
            namespace::TOGGLEX => {
                DeviceEvent::ToggleX(one_or_many("togglex", section(payload, "togglex")?)?)
            }
            namespace::ELECTRICITY => DeviceEvent::Electricity(FieldReading::from_section(
                "electricity",
                section(payload, "electricity")?,
            )?),
            namespace::GARAGE_DOOR_STATE => {
                DeviceEvent::GarageDoor(one_or_many("state", section(payload, "state")?)?)
            }
            namespace::LIGHT => {
                DeviceEvent::Light(FieldReading::from_section("light", section(payload, "light")?)?)
            }
            namespace::SYSTEM_ONLINE => {
                DeviceEvent::Online(decode_as("online", section(payload, "online")?)?)
            }
            namespace::UPGRADE | namespace::SYSTEM_REPORT | namespace::CONSUMPTIONX => {
                DeviceEvent::Ignored {
                    namespace: ns.to_string(),
                }
            }
            _ => DeviceEvent::Unknown {
                namespace: ns.to_string(),
                payload: payload.clone(),
            },
        };
        Ok(event)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DeviceEvent::Toggle(_) => "toggle",
            DeviceEvent::ToggleX(_) => "togglex",
            DeviceEvent::Electricity(_) => "electricity",
            DeviceEvent::GarageDoor(_) => "garage_door",
            DeviceEvent::Light(_) => "light",
            DeviceEvent::Online(_) => "online",
            DeviceEvent::Ignored { .. } => "ignored",
            DeviceEvent::Unknown { .. } => "unknown",
        }
    }
}

pub(crate) fn section<'a>(payload: &'a Value, key: &'static str) -> Result<&'a Value, DecodeError> {
    payload.get(key).ok_or(DecodeError::MissingSection(key))
}

pub(crate) fn decode_as<T: DeserializeOwned>(
    section: &'static str,
    value: &Value,
) -> Result<T, DecodeError> {
    T::deserialize(value).map_err(|e| DecodeError::Malformed {
        section,
        detail: e.to_string(),
    })
}

/// Devices report some sections as a single object or as an array of them.
pub(crate) fn one_or_many<T: DeserializeOwned>(
    section: &'static str,
    value: &Value,
) -> Result<Vec<T>, DecodeError> {
    match value {
        Value::Array(items) => items.iter().map(|v| decode_as(section, v)).collect(),
        other => Ok(vec![decode_as(section, other)?]),
    }
}

fn flag<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(u8::from(b)),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok(u.min(u64::from(u8::MAX)) as u8)
            } else {
                Ok(u8::from(n.as_f64().is_some_and(|f| f != 0.0)))
            }
        }
        other => Err(de::Error::custom(format!("expected a 0/1 flag, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn togglex_accepts_single_object_and_array() {
        let single = DeviceEvent::decode(
            namespace::TOGGLEX,
            &json!({ "togglex": { "channel": 1, "onoff": 1, "lmTime": 1540825748 } }),
        )
        .unwrap();
        assert_eq!(
            single,
            DeviceEvent::ToggleX(vec![ToggleXState {
                channel: 1,
                onoff: 1
            }])
        );

        let many = DeviceEvent::decode(
            namespace::TOGGLEX,
            &json!({ "togglex": [
                { "channel": 0, "onoff": 0 },
                { "channel": 1, "onoff": 0 },
                { "channel": 2, "onoff": 1 }
            ] }),
        )
        .unwrap();
        match many {
            DeviceEvent::ToggleX(states) => {
                assert_eq!(states.len(), 3);
                assert!(states[2].is_on());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn garage_state_defaults_execute_to_idle() {
        let event = DeviceEvent::decode(
            namespace::GARAGE_DOOR_STATE,
            &json!({
                "state": [{ "channel": 0, "open": 1, "lmTime": 1559850976 }],
                "reason": { "bootup": { "timestamp": 1559851565 } }
            }),
        )
        .unwrap();
        let DeviceEvent::GarageDoor(states) = event else {
            panic!("expected garage door event");
        };
        assert!(states[0].is_open());
        assert!(!states[0].is_executing());
        assert!(!states[0].is_working());
    }

    #[test]
    fn electricity_reading_splits_channel_from_fields() {
        let event = DeviceEvent::decode(
            namespace::ELECTRICITY,
            &json!({ "electricity": { "channel": 0, "current": 0, "voltage": 2331, "power": 0 } }),
        )
        .unwrap();
        let DeviceEvent::Electricity(reading) = event else {
            panic!("expected electricity event");
        };
        assert_eq!(reading.channel, Some(0));
        assert_eq!(reading.fields.len(), 3);
        assert_eq!(reading.fields["voltage"], 2331.0);
    }

    #[test]
    fn online_and_bookkeeping_namespaces() {
        let online = DeviceEvent::decode(
            namespace::SYSTEM_ONLINE,
            &json!({ "online": { "status": 1 } }),
        )
        .unwrap();
        assert_eq!(online, DeviceEvent::Online(OnlineStatus { status: 1 }));

        let report =
            DeviceEvent::decode(namespace::SYSTEM_REPORT, &json!({ "report": [] })).unwrap();
        assert_eq!(report.kind(), "ignored");
    }

    #[test]
    fn unrecognized_namespace_is_kept_as_unknown() {
        let payload = json!({ "spray": { "mode": 1 } });
        let event = DeviceEvent::decode("Appliance.Control.Spray", &payload).unwrap();
        assert_eq!(
            event,
            DeviceEvent::Unknown {
                namespace: "Appliance.Control.Spray".into(),
                payload
            }
        );
    }

    #[test]
    fn malformed_sections_are_errors() {
        let err = DeviceEvent::decode(namespace::TOGGLE, &json!({ "toggle": { "lmTime": 1 } }))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { section: "toggle", .. }));

        let err = DeviceEvent::decode(namespace::LIGHT, &json!({})).unwrap_err();
        assert_eq!(err, DecodeError::MissingSection("light"));
    }

    #[test]
    fn flags_accept_booleans() {
        let state: ToggleState = decode_as("toggle", &json!({ "onoff": true })).unwrap();
        assert!(state.is_on());
    }
}
