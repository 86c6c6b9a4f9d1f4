use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use super::accessory::PlatformAccessory;
use super::identity::Identity;

/// Accessory handle shared with the host
pub type SharedAccessory = Arc<PlatformAccessory>;

/// Process-wide map of identity -> accessory.
///
/// Entries are never removed. Holding the lock is always brief and never
/// spans an `.await`.
#[derive(Debug, Default)]
pub struct AccessoryCache {
    accessories: Mutex<BTreeMap<Identity, SharedAccessory>>,
}

impl AccessoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Identity, SharedAccessory>> {
        self.accessories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, identity: &Identity) -> Option<SharedAccessory> {
        self.lock().get(identity).cloned()
    }

    /// Store an accessory under `identity`.
    ///
    /// If one is already cached, it keeps its handle and takes over the new
    /// record (last write wins). Returns the cached handle.
    pub fn put(&self, identity: Identity, accessory: PlatformAccessory) -> SharedAccessory {
        let mut map = self.lock();
        match map.get(&identity) {
            Some(existing) => {
                existing.bind(accessory.record(), None);
                existing.clone()
            }
            None => {
                let accessory = Arc::new(accessory);
                map.insert(identity, accessory.clone());
                accessory
            }
        }
    }

    /// Return the cached accessory, inserting the one built by `make` if absent.
    ///
    /// The flag is `true` when this call inserted.
    pub fn get_or_insert_with<F>(&self, identity: Identity, make: F) -> (SharedAccessory, bool)
    where
        F: FnOnce() -> PlatformAccessory,
    {
        let mut map = self.lock();
        if let Some(existing) = map.get(&identity) {
            return (existing.clone(), false);
        }

        let accessory = Arc::new(make());
        map.insert(identity, accessory.clone());
        (accessory, true)
    }

    /// All cached accessories, ordered by identity.
    pub fn values(&self) -> Vec<SharedAccessory> {
        self.lock().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::accessory::AccessoryRecord;
    use crate::platform::capability::CapabilityKind;
    use crate::platform::identity;

    fn record(device_id: &str, display_name: &str) -> AccessoryRecord {
        AccessoryRecord {
            identity: identity::resolve(device_id, 1, 0).unwrap(),
            display_name: display_name.to_string(),
            service_name: display_name.to_string(),
            kind: CapabilityKind::Switch,
            unit_index: 0,
            device_id: device_id.to_string(),
        }
    }

    #[test]
    fn test_put_is_idempotent() {
        let cache = AccessoryCache::new();
        let first = record("dev1", "Hall");
        let identity = first.identity;

        let a = cache.put(identity, PlatformAccessory::restored(first));
        let b = cache.put(identity, PlatformAccessory::restored(record("dev1", "Hallway")));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.count(), 1);
        assert_eq!(a.record().display_name, "Hallway");
    }

    #[test]
    fn test_get_or_insert_with() {
        let cache = AccessoryCache::new();
        let rec = record("dev1", "Hall");
        let identity = rec.identity;

        let (a, inserted) =
            cache.get_or_insert_with(identity, || PlatformAccessory::restored(rec.clone()));
        assert!(inserted);

        let (b, inserted) = cache.get_or_insert_with(identity, || {
            panic!("should not construct for a cached identity")
        });
        assert!(!inserted);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_values_and_lookup() {
        let cache = AccessoryCache::new();
        assert_eq!(cache.count(), 0);

        let one = record("dev1", "One");
        let two = record("dev2", "Two");
        let one_id = one.identity;
        cache.put(one.identity, PlatformAccessory::restored(one));
        cache.put(two.identity, PlatformAccessory::restored(two));

        assert_eq!(cache.values().len(), 2);
        assert_eq!(cache.get(&one_id).unwrap().record().display_name, "One");
        assert!(cache
            .get(&identity::resolve("dev3", 1, 0).unwrap())
            .is_none());
    }
}
