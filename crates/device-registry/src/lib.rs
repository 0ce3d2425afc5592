//! device-registry: canonical state points for cloud-connected devices
//!
//! Decodes the loosely-typed capability payloads and push events reported by a
//! device into tagged types, maps them to typed, addressable state points, and
//! encodes writes on those points back into device commands. Nothing in this
//! crate performs I/O.

mod types;
pub use types::*;

mod abilities;
pub use abilities::{Ability, AbilitySet};

mod decode;
pub use decode::{
    DecodeError, DeviceEvent, FieldReading, GarageDoorState, OnlineStatus, ToggleState,
    ToggleXState,
};

mod mapper;
pub use mapper::{light_value, map_capability_payload, MapOutcome, MappingIssue};

mod encode;
pub use encode::{build_command, hex_color, parse_hex_color, EncodeError};
