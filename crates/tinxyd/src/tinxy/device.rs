//! Wire types for the Tinxy backend.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A device as returned by `GET devices/`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Persistent remote id; a descriptor without one is skipped
    #[serde(rename = "_id", default)]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(rename = "deviceTypes", default, deserialize_with = "null_as_default")]
    pub device_types: Vec<String>,

    /// Names of the individually switchable units, empty for single-switch devices
    #[serde(rename = "devices", default, deserialize_with = "null_as_default")]
    pub sub_switches: Vec<String>,
}

/// One addressable switch of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit<'a> {
    pub index: usize,
    pub name: &'a str,
}

impl DeviceDescriptor {
    /// Number of addressable units (at least one).
    pub fn unit_count(&self) -> usize {
        self.sub_switches.len().max(1)
    }

    /// The device's units; the device itself when it has no sub-switches.
    pub fn units(&self) -> Vec<Unit<'_>> {
        if self.sub_switches.is_empty() {
            return vec![Unit {
                index: 0,
                name: &self.name,
            }];
        }

        self.sub_switches
            .iter()
            .enumerate()
            .map(|(index, name)| Unit { index, name })
            .collect()
    }
}

/// Wire address of a unit: the backend counts switches from one.
pub fn device_number(unit_index: usize) -> usize {
    unit_index + 1
}

/// Body of `GET devices/{id}/state`.
#[derive(Debug, Clone, Deserialize)]
pub struct StateResponse {
    pub state: RemoteState,
}

/// The backend reports state as `"on"`/`"off"` (any case) or `1`/`0`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RemoteState {
    Flag(bool),
    Number(i64),
    Text(String),
}

impl RemoteState {
    pub fn is_on(&self) -> bool {
        match self {
            RemoteState::Flag(on) => *on,
            RemoteState::Number(n) => *n != 0,
            RemoteState::Text(s) => s.eq_ignore_ascii_case("on"),
        }
    }
}

/// Body of `POST devices/{id}/toggle`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    pub request: ToggleState,
    pub device_number: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToggleState {
    pub state: u8,
}

impl ToggleRequest {
    pub fn new(unit_index: usize, on: bool) -> Self {
        Self {
            request: ToggleState {
                state: u8::from(on),
            },
            device_number: device_number(unit_index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_list() {
        let json = r#"[
            {"_id": "64a1", "name": "Hall", "deviceTypes": ["Light"], "devices": ["Lamp", "Fan"]},
            {"_id": "64a2", "name": "Geyser", "deviceTypes": ["Socket"]},
            {"name": "Broken", "deviceTypes": null, "devices": null}
        ]"#;

        let devices: Vec<DeviceDescriptor> = serde_json::from_str(json).unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].id.as_deref(), Some("64a1"));
        assert_eq!(devices[0].sub_switches, vec!["Lamp", "Fan"]);
        assert!(devices[1].sub_switches.is_empty());
        assert_eq!(devices[2].id, None);
        assert!(devices[2].device_types.is_empty());
    }

    #[test]
    fn test_units_for_multi_switch_device() {
        let device = DeviceDescriptor {
            id: Some("64a1".to_string()),
            name: "Hall".to_string(),
            device_types: vec![],
            sub_switches: vec!["A".to_string(), "B".to_string(), "C".to_string()],
        };

        let units = device.units();
        assert_eq!(device.unit_count(), 3);
        assert_eq!(
            units.iter().map(|u| device_number(u.index)).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(units[2].name, "C");
    }

    #[test]
    fn test_units_for_single_switch_device() {
        let device = DeviceDescriptor {
            id: Some("64a2".to_string()),
            name: "Geyser".to_string(),
            ..Default::default()
        };

        let units = device.units();
        assert_eq!(device.unit_count(), 1);
        assert_eq!(units, vec![Unit { index: 0, name: "Geyser" }]);
        assert_eq!(device_number(units[0].index), 1);
    }

    #[test]
    fn test_remote_state_parsing() {
        let parse = |json: &str| serde_json::from_str::<StateResponse>(json).unwrap().state;

        assert!(parse(r#"{"state": "ON"}"#).is_on());
        assert!(parse(r#"{"state": "on"}"#).is_on());
        assert!(!parse(r#"{"state": "off"}"#).is_on());
        assert!(parse(r#"{"state": 1}"#).is_on());
        assert!(!parse(r#"{"state": 0}"#).is_on());
        assert!(!parse(r#"{"state": "unknown"}"#).is_on());
    }

    #[test]
    fn test_toggle_request_body() {
        let body = serde_json::to_value(ToggleRequest::new(2, true)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"request": {"state": 1}, "deviceNumber": 3})
        );
    }
}
