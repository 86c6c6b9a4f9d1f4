use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Namespace for the name-based accessory UUIDs.
const ACCESSORY_NAMESPACE: Uuid = Uuid::from_u128(0x3b5e_91c2_7d04_5a6f_8e21_c0d9_4f7a_b613);

/// Stable identity of an accessory.
///
/// Derived from the remote device id (and unit index for multi-switch
/// devices) so that the same accessory keeps its identity across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(Uuid);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Identity {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Identity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidIdentityInput {
    #[error("device id is empty")]
    EmptyDeviceId,
}

/// Derive the identity of unit `index` of a device with `unit_count` units.
///
/// Single-unit devices derive from the device id alone; multi-unit devices
/// also fold in the unit index. Any non-empty id is accepted.
pub fn resolve(
    device_id: &str,
    unit_count: usize,
    index: usize,
) -> Result<Identity, InvalidIdentityInput> {
    if device_id.is_empty() {
        return Err(InvalidIdentityInput::EmptyDeviceId);
    }

    Ok(Identity(Uuid::new_v5(
        &ACCESSORY_NAMESPACE,
        identity_name(device_id, unit_count, index).as_bytes(),
    )))
}

/// Name hashed into the identity.
///
/// The id is length-prefixed so that the id and the index cannot bleed into
/// each other, whatever characters the id contains.
fn identity_name(device_id: &str, unit_count: usize, index: usize) -> String {
    if unit_count <= 1 {
        format!("{}:{}", device_id.len(), device_id)
    } else {
        format!("{}:{}#{}", device_id.len(), device_id, index)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_resolve_is_deterministic() {
        let a = resolve("64f1c0ffee", 3, 1).unwrap();
        let b = resolve("64f1c0ffee", 3, 1).unwrap();
        assert_eq!(a, b);

        let single = resolve("64f1c0ffee", 1, 0).unwrap();
        assert_eq!(single, resolve("64f1c0ffee", 0, 0).unwrap());
    }

    #[test]
    fn test_single_unit_ignores_index() {
        assert_eq!(
            resolve("abc123", 1, 0).unwrap(),
            resolve("abc123", 1, 7).unwrap()
        );
    }

    #[test]
    fn test_single_and_indexed_differ() {
        let single = resolve("abc123", 1, 0).unwrap();
        let first = resolve("abc123", 2, 0).unwrap();
        assert_ne!(single, first);
    }

    #[test]
    fn test_resolve_rejects_empty_id() {
        assert_eq!(
            resolve("", 1, 0),
            Err(InvalidIdentityInput::EmptyDeviceId)
        );
    }

    #[test]
    fn test_resolve_accepts_any_non_empty_id() {
        assert!(resolve("5f3c-ab12", 1, 0).is_ok());
        assert!(resolve("a/b?c", 2, 1).is_ok());

        let hyphenated = resolve("a-1", 1, 0).unwrap();
        let indexed = resolve("a", 2, 1).unwrap();
        assert_ne!(hyphenated, indexed);

        let lookalike = resolve("1:a#1", 1, 0).unwrap();
        assert_ne!(lookalike, indexed);
    }

    #[test]
    fn test_resolve_has_no_collisions_in_sample() {
        let ids = ["a", "ab", "a0", "a1", "a-1", "a-", "1", "10", "1-0", "65a0f3b2c1d4e5f6a7b8c9d0"];
        let mut seen = HashSet::new();
        let mut count = 0;

        for id in ids {
            seen.insert(resolve(id, 1, 0).unwrap());
            count += 1;
            for index in 0..12 {
                seen.insert(resolve(id, 12, index).unwrap());
                count += 1;
            }
        }

        assert_eq!(seen.len(), count);
    }

    #[test]
    fn test_identity_round_trips_through_string() {
        let identity = resolve("abc123", 2, 1).unwrap();
        let parsed: Identity = identity.to_string().parse().unwrap();
        assert_eq!(parsed, identity);
    }
}
