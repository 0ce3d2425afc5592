use crate::DecodeError;
use cloud_transport::namespace;
use serde_json::Value;
use std::collections::BTreeSet;

/// Abilities the capability mapper knows how to turn into points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ability {
    Toggle,
    ToggleX,
    Electricity,
    GarageDoor,
    Light,
}

impl Ability {
    pub const ALL: [Ability; 5] = [
        Ability::Toggle,
        Ability::ToggleX,
        Ability::Electricity,
        Ability::GarageDoor,
        Ability::Light,
    ];

    pub fn namespace(self) -> &'static str {
        match self {
            Ability::Toggle => namespace::TOGGLE,
            Ability::ToggleX => namespace::TOGGLEX,
            Ability::Electricity => namespace::ELECTRICITY,
            Ability::GarageDoor => namespace::GARAGE_DOOR_STATE,
            Ability::Light => namespace::LIGHT,
        }
    }

    pub fn from_namespace(ns: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.namespace() == ns)
    }
}

/// Ability names reported by a device. Unknown names are kept for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbilitySet {
    names: BTreeSet<String>,
}

impl AbilitySet {
    /// Decode an `Appliance.System.Ability` response: `{"ability": {"<namespace>": {...}, ...}}`.
    pub fn from_payload(payload: &Value) -> Result<Self, DecodeError> {
        let ability = payload
            .get("ability")
            .ok_or(DecodeError::MissingSection("ability"))?;
        let map = ability.as_object().ok_or_else(|| DecodeError::Malformed {
            section: "ability",
            detail: format!("expected an object, got {ability}"),
        })?;
        Ok(Self {
            names: map.keys().cloned().collect(),
        })
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn supports(&self, ability: Ability) -> bool {
        self.names.contains(ability.namespace())
    }

    pub fn supports_metering(&self) -> bool {
        self.supports(Ability::Electricity)
    }

    /// Whether the digest of the full-state payload carries anything to map.
    pub fn has_digest_capability(&self) -> bool {
        [
            Ability::Toggle,
            Ability::ToggleX,
            Ability::GarageDoor,
            Ability::Light,
        ]
        .into_iter()
        .any(|a| self.supports(a))
    }

    pub fn is_mappable(&self) -> bool {
        self.has_digest_capability() || self.supports_metering()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_ability_response() {
        let set = AbilitySet::from_payload(&json!({
            "ability": {
                "Appliance.Config.Key": {},
                "Appliance.Control.ToggleX": {},
                "Appliance.Control.Electricity": {}
            }
        }))
        .unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.supports(Ability::ToggleX));
        assert!(set.supports_metering());
        assert!(!set.supports(Ability::Light));
        assert!(set.is_mappable());
    }

    #[test]
    fn unknown_abilities_are_not_mappable() {
        let set = AbilitySet::from_names(["Appliance.Control.Spray", "Appliance.System.Online"]);
        assert!(!set.has_digest_capability());
        assert!(!set.is_mappable());
    }

    #[test]
    fn missing_section_is_an_error() {
        let err = AbilitySet::from_payload(&json!({ "payload": {} })).unwrap_err();
        assert!(matches!(err, DecodeError::MissingSection("ability")));
    }

    #[test]
    fn namespaces_round_trip() {
        for ability in Ability::ALL {
            assert_eq!(Ability::from_namespace(ability.namespace()), Some(ability));
        }
        assert_eq!(Ability::from_namespace("Appliance.System.Report"), None);
    }
}
