use serde::Deserialize;
use serde::Serialize;

/// Device type tags that map to a light.
const LIGHT_TYPES: &[&str] = &["Light", "Bulb", "LED Bulb"];

/// Which accessory service shape a device is exposed as.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CapabilityKind {
    Fan,
    Light,
    Outlet,
    Switch,
}

/// Classify a device by its type tags.
///
/// First match wins: `Fan`, then any light tag, then `Socket`, otherwise
/// `Switch`.
pub fn classify<S: AsRef<str>>(device_types: &[S]) -> CapabilityKind {
    let has = |tag: &str| device_types.iter().any(|t| t.as_ref() == tag);

    if has("Fan") {
        CapabilityKind::Fan
    } else if LIGHT_TYPES.iter().any(|tag| has(tag)) {
        CapabilityKind::Light
    } else if has("Socket") {
        CapabilityKind::Outlet
    } else {
        CapabilityKind::Switch
    }
}

/// Value of the HAP `Active` characteristic used by fans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Active {
    Inactive,
    Active,
}

/// Value of an accessory's primary characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    /// `On` characteristic (lights, outlets, switches)
    On(bool),

    /// `Active` characteristic (fans)
    Active(Active),
}

impl CharacteristicValue {
    /// Collapse to the on/off state sent to the remote device.
    pub fn is_on(self) -> bool {
        match self {
            CharacteristicValue::On(on) => on,
            CharacteristicValue::Active(active) => active == Active::Active,
        }
    }
}

impl CapabilityKind {
    /// Name of the primary characteristic for this kind.
    pub fn characteristic(self) -> &'static str {
        match self {
            CapabilityKind::Fan => "Active",
            CapabilityKind::Light | CapabilityKind::Outlet | CapabilityKind::Switch => "On",
        }
    }

    /// Build this kind's characteristic value from a remote on/off state.
    pub fn value_from(self, on: bool) -> CharacteristicValue {
        match self {
            CapabilityKind::Fan => CharacteristicValue::Active(if on {
                Active::Active
            } else {
                Active::Inactive
            }),
            CapabilityKind::Light | CapabilityKind::Outlet | CapabilityKind::Switch => {
                CharacteristicValue::On(on)
            }
        }
    }
}
