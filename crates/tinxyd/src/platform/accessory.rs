use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::capability::CapabilityKind;
use super::capability::CharacteristicValue;
use super::error::PlatformError;
use super::identity::Identity;
use crate::tinxy::device_number;
use crate::tinxy::DeviceClient;
use crate::tinxy::WriteError;

/// Persistent description of an accessory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryRecord {
    pub identity: Identity,

    /// Name shown by the host, e.g. "Hall - Lamp"
    pub display_name: String,

    /// Name of the accessory's service: the sub-switch name, or the device name
    pub service_name: String,

    pub kind: CapabilityKind,

    /// Zero-based unit index within the owning device
    pub unit_index: usize,

    /// Remote id of the owning device
    pub device_id: String,
}

impl AccessoryRecord {
    /// The unit's address on the wire.
    pub fn device_number(&self) -> usize {
        device_number(self.unit_index)
    }
}

/// Characteristic get/set handlers bound to one unit of a remote device.
#[derive(Clone)]
pub struct UnitHandler {
    client: Arc<dyn DeviceClient>,
    device_id: String,
    unit_index: usize,
    kind: CapabilityKind,
}

impl fmt::Debug for UnitHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandler")
            .field("device_id", &self.device_id)
            .field("unit_index", &self.unit_index)
            .field("kind", &self.kind)
            .field("client", &"<client>")
            .finish()
    }
}

impl UnitHandler {
    pub fn new(client: Arc<dyn DeviceClient>, record: &AccessoryRecord) -> Self {
        Self {
            client,
            device_id: record.device_id.clone(),
            unit_index: record.unit_index,
            kind: record.kind,
        }
    }

    /// Read the unit's state from the backend.
    ///
    /// A failed read reports the unit as off/inactive.
    pub async fn get(&self) -> CharacteristicValue {
        match self
            .client
            .read_unit_state(&self.device_id, self.unit_index)
            .await
        {
            Ok(on) => self.kind.value_from(on),
            Err(e) => {
                warn!("{}", e);
                self.kind.value_from(false)
            }
        }
    }

    /// Send the requested state to the backend. Never retried.
    pub async fn set(&self, value: CharacteristicValue) -> Result<(), WriteError> {
        self.client
            .write_unit_state(&self.device_id, self.unit_index, value.is_on())
            .await
    }
}

struct AccessoryInner {
    record: AccessoryRecord,
    value: Option<CharacteristicValue>,
    handler: Option<UnitHandler>,
}

/// An accessory shared between the platform and the host.
///
/// Restored accessories start without handlers; they are bound once discovery
/// sees their device again.
pub struct PlatformAccessory {
    identity: Identity,
    inner: Mutex<AccessoryInner>,
    /// Set while a poll refresh is in flight
    refreshing: AtomicBool,
}

/// Claim on an accessory's poll refresh slot, released on drop.
///
/// Dropping also covers a refresh task that panics or is aborted.
pub struct RefreshGuard {
    accessory: Arc<PlatformAccessory>,
}

impl RefreshGuard {
    pub async fn refresh(&self) -> Option<CharacteristicValue> {
        self.accessory.refresh().await
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.accessory.refreshing.store(false, Ordering::Release);
    }
}

impl fmt::Debug for PlatformAccessory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("PlatformAccessory")
            .field("record", &inner.record)
            .field("value", &inner.value)
            .field("bound", &inner.handler.is_some())
            .field("refreshing", &self.refreshing.load(Ordering::Relaxed))
            .finish()
    }
}

/// Record plus last known characteristic value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessorySnapshot {
    #[serde(flatten)]
    pub record: AccessoryRecord,
    pub device_number: usize,
    pub characteristic: &'static str,
    pub value: Option<CharacteristicValue>,
}

impl PlatformAccessory {
    /// Create an accessory with handlers bound.
    pub fn new(record: AccessoryRecord, handler: UnitHandler) -> Self {
        Self {
            identity: record.identity,
            inner: Mutex::new(AccessoryInner {
                record,
                value: None,
                handler: Some(handler),
            }),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Create an accessory from a record the host persisted earlier.
    pub fn restored(record: AccessoryRecord) -> Self {
        Self {
            identity: record.identity,
            inner: Mutex::new(AccessoryInner {
                record,
                value: None,
                handler: None,
            }),
            refreshing: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AccessoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn record(&self) -> AccessoryRecord {
        self.lock().record.clone()
    }

    pub fn value(&self) -> Option<CharacteristicValue> {
        self.lock().value
    }

    pub fn is_bound(&self) -> bool {
        self.lock().handler.is_some()
    }

    pub fn snapshot(&self) -> AccessorySnapshot {
        let inner = self.lock();
        AccessorySnapshot {
            record: inner.record.clone(),
            device_number: inner.record.device_number(),
            characteristic: inner.record.kind.characteristic(),
            value: inner.value,
        }
    }

    /// Replace the record and handlers with fresh ones from discovery.
    ///
    /// A changed capability kind drops the cached value, since it no longer
    /// has the right shape.
    pub fn bind(&self, record: AccessoryRecord, handler: Option<UnitHandler>) {
        let mut inner = self.lock();
        if inner.record.kind != record.kind {
            inner.value = None;
        }
        inner.record = record;
        if handler.is_some() {
            inner.handler = handler;
        }
    }

    /// Claim the poll refresh slot, or `None` if a refresh is still in flight.
    pub fn begin_refresh(self: &Arc<Self>) -> Option<RefreshGuard> {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(RefreshGuard {
            accessory: self.clone(),
        })
    }

    /// Pull the current remote state into the characteristic value.
    ///
    /// Returns `None` when no handler is bound.
    pub async fn refresh(&self) -> Option<CharacteristicValue> {
        let handler = self.lock().handler.clone()?;
        let value = handler.get().await;

        debug!("{} -> {:?}", self.identity, value);
        self.lock().value = Some(value);
        Some(value)
    }

    /// Command the remote unit.
    ///
    /// On success the cached value becomes the requested one; on failure it
    /// is left untouched until the next poll.
    pub async fn set_value(&self, value: CharacteristicValue) -> Result<(), PlatformError> {
        let (handler, kind) = {
            let inner = self.lock();
            (inner.handler.clone(), inner.record.kind)
        };
        let handler = handler.ok_or(PlatformError::Unbound(self.identity))?;

        handler.set(value).await?;

        self.lock().value = Some(kind.value_from(value.is_on()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::capability::Active;
    use crate::platform::identity;
    use crate::tinxy::MockDeviceClient;

    fn record(kind: CapabilityKind, unit_index: usize) -> AccessoryRecord {
        AccessoryRecord {
            identity: identity::resolve("dev1", 2, unit_index).unwrap(),
            display_name: "Hall - Lamp".to_string(),
            service_name: "Lamp".to_string(),
            kind,
            unit_index,
            device_id: "dev1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_refresh_reads_remote_state() {
        let client = Arc::new(MockDeviceClient::default());
        client.set_state("dev1", 1, true);

        let record = record(CapabilityKind::Fan, 1);
        let handler = UnitHandler::new(client.clone(), &record);
        let accessory = PlatformAccessory::new(record, handler);

        assert_eq!(
            accessory.refresh().await,
            Some(CharacteristicValue::Active(Active::Active))
        );
        assert_eq!(
            accessory.value(),
            Some(CharacteristicValue::Active(Active::Active))
        );
    }

    #[tokio::test]
    async fn test_refresh_defaults_to_off_on_read_error() {
        let client = Arc::new(MockDeviceClient::default());
        client.set_state("dev1", 0, true);
        client.fail_reads("dev1", 0);

        let record = record(CapabilityKind::Light, 0);
        let handler = UnitHandler::new(client.clone(), &record);
        let accessory = PlatformAccessory::new(record, handler);

        assert_eq!(
            accessory.refresh().await,
            Some(CharacteristicValue::On(false))
        );
    }

    #[tokio::test]
    async fn test_restored_accessory_is_unbound() {
        let accessory = PlatformAccessory::restored(record(CapabilityKind::Switch, 0));

        assert!(!accessory.is_bound());
        assert_eq!(accessory.refresh().await, None);
        assert!(matches!(
            accessory.set_value(CharacteristicValue::On(true)).await,
            Err(PlatformError::Unbound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_value_collapses_fan_state() {
        let client = Arc::new(MockDeviceClient::default());
        let record = record(CapabilityKind::Fan, 0);
        let handler = UnitHandler::new(client.clone(), &record);
        let accessory = PlatformAccessory::new(record, handler);

        accessory
            .set_value(CharacteristicValue::Active(Active::Active))
            .await
            .unwrap();

        assert_eq!(
            *client.writes.lock().unwrap(),
            vec![("dev1".to_string(), 0, true)]
        );
        assert_eq!(
            accessory.value(),
            Some(CharacteristicValue::Active(Active::Active))
        );
    }

    #[tokio::test]
    async fn test_failed_set_leaves_value_untouched() {
        let client = Arc::new(MockDeviceClient::default());
        client.fail_writes("dev1", 0);

        let record = record(CapabilityKind::Outlet, 0);
        let handler = UnitHandler::new(client.clone(), &record);
        let accessory = PlatformAccessory::new(record, handler);
        accessory.refresh().await;

        let result = accessory.set_value(CharacteristicValue::On(true)).await;
        assert!(matches!(result, Err(PlatformError::Write(_))));
        assert_eq!(accessory.value(), Some(CharacteristicValue::On(false)));
    }

    #[tokio::test]
    async fn test_one_refresh_in_flight_at_a_time() {
        let client = Arc::new(MockDeviceClient::default());
        client.set_state("dev1", 0, true);
        let record = record(CapabilityKind::Light, 0);
        let handler = UnitHandler::new(client.clone(), &record);
        let accessory = Arc::new(PlatformAccessory::new(record, handler));

        let guard = accessory.begin_refresh().unwrap();
        assert!(accessory.begin_refresh().is_none());

        assert_eq!(guard.refresh().await, Some(CharacteristicValue::On(true)));
        drop(guard);
        assert!(accessory.begin_refresh().is_some());
    }

    #[tokio::test]
    async fn test_refresh_slot_released_when_task_aborted() {
        let accessory = Arc::new(PlatformAccessory::restored(record(
            CapabilityKind::Switch,
            0,
        )));

        let guard = accessory.begin_refresh().unwrap();
        let task = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(accessory.begin_refresh().is_some());
    }

    #[test]
    fn test_bind_resets_value_on_kind_change() {
        let accessory = PlatformAccessory::restored(record(CapabilityKind::Switch, 0));
        accessory.lock().value = Some(CharacteristicValue::On(true));

        accessory.bind(record(CapabilityKind::Switch, 0), None);
        assert_eq!(accessory.value(), Some(CharacteristicValue::On(true)));

        accessory.bind(record(CapabilityKind::Fan, 0), None);
        assert_eq!(accessory.value(), None);
        assert_eq!(accessory.record().kind, CapabilityKind::Fan);
    }
}
