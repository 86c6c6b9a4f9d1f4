use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::accessory::AccessoryRecord;
use super::accessory::PlatformAccessory;
use super::accessory::UnitHandler;
use super::cache::AccessoryCache;
use super::cache::SharedAccessory;
use super::capability;
use super::capability::CharacteristicValue;
use super::error::PlatformError;
use super::host::AccessoryHost;
use super::identity;
use super::identity::Identity;
use super::identity::InvalidIdentityInput;
use crate::tinxy::DeviceClient;
use crate::tinxy::DeviceDescriptor;
use crate::tinxy::FetchError;

/// Outcome of one discovery pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Descriptors returned by the backend
    pub devices: usize,
    pub registered: usize,
    pub updated: usize,
    /// Descriptors dropped for a missing or invalid id
    pub skipped: usize,
}

/// Per-unit decision made while diffing against the cache
#[derive(Debug)]
enum SyncAction {
    Register(AccessoryRecord),
    Update(AccessoryRecord, SharedAccessory),
}

/// Tinxy platform
///
/// Keeps the accessory cache in step with the devices on the Tinxy account:
/// discovery registers or updates accessories, polling refreshes their
/// characteristic values, and host get/set requests are routed to the backend.
pub struct Platform {
    client: Arc<dyn DeviceClient>,
    host: Arc<dyn AccessoryHost>,
    cache: AccessoryCache,
    poll_interval: Duration,
    discovery_interval: Duration,
}

impl Platform {
    /// Create a new Platform instance
    pub fn new(
        client: Arc<dyn DeviceClient>,
        host: Arc<dyn AccessoryHost>,
        poll_interval: Duration,
        discovery_interval: Duration,
    ) -> Self {
        Self {
            client,
            host,
            cache: AccessoryCache::new(),
            poll_interval,
            discovery_interval,
        }
    }

    /// Restore an accessory the host persisted in an earlier run.
    ///
    /// Must happen before the first discovery pass so that the accessory is
    /// updated rather than registered again.
    pub fn configure_accessory(&self, record: AccessoryRecord) {
        debug!("Configuring cached accessory: {}", record.display_name);
        self.cache
            .put(record.identity, PlatformAccessory::restored(record));
    }

    /// Every cached accessory.
    pub fn accessories(&self) -> Vec<SharedAccessory> {
        self.cache.values()
    }

    pub fn accessory_count(&self) -> usize {
        self.cache.count()
    }

    pub fn accessory(&self, identity: &Identity) -> Option<SharedAccessory> {
        self.cache.get(identity)
    }

    /// Run one discovery pass.
    ///
    /// A fetch failure leaves the cache and the host untouched. A descriptor
    /// with a bad id is skipped without affecting the others.
    pub async fn discover(&self) -> Result<DiscoveryReport, FetchError> {
        let devices = self.client.list_devices().await?;
        debug!("Received {} device descriptors", devices.len());

        let (records, skipped) = resolve_devices(&devices);
        let actions = self.diff(records);

        let mut report = self.apply(actions).await;
        report.devices = devices.len();
        report.skipped = skipped;

        info!(
            "Discovered {} devices: {} registered, {} updated, {} skipped",
            report.devices, report.registered, report.updated, report.skipped
        );
        Ok(report)
    }

    fn diff(&self, records: Vec<AccessoryRecord>) -> Vec<SyncAction> {
        records
            .into_iter()
            .map(|record| match self.cache.get(&record.identity) {
                Some(accessory) => SyncAction::Update(record, accessory),
                None => SyncAction::Register(record),
            })
            .collect()
    }

    async fn apply(&self, actions: Vec<SyncAction>) -> DiscoveryReport {
        let mut registered = Vec::new();
        let mut updated = Vec::new();

        for action in actions {
            match action {
                SyncAction::Register(record) => {
                    let handler = UnitHandler::new(self.client.clone(), &record);
                    let (accessory, inserted) =
                        self.cache.get_or_insert_with(record.identity, || {
                            PlatformAccessory::new(record.clone(), handler.clone())
                        });

                    if inserted {
                        info!(
                            "Registering accessory: {} ({})",
                            record.display_name, record.kind
                        );
                        registered.push(accessory);
                    } else {
                        // Inserted by an overlapping pass since diffing
                        accessory.bind(record, Some(handler));
                        updated.push(accessory);
                    }
                }
                SyncAction::Update(record, accessory) => {
                    debug!(
                        "Updating accessory: {} ({})",
                        record.display_name, record.kind
                    );
                    let handler = UnitHandler::new(self.client.clone(), &record);
                    accessory.bind(record, Some(handler));
                    updated.push(accessory);
                }
            }
        }

        if !registered.is_empty() {
            self.host.register_accessories(&registered).await;
        }
        if !updated.is_empty() {
            self.host.update_accessories(&updated).await;
        }

        DiscoveryReport {
            registered: registered.len(),
            updated: updated.len(),
            ..Default::default()
        }
    }

    /// Start a refresh task for every bound accessory that has none in flight.
    ///
    /// Returns how many tasks were started. Each task yields whether the
    /// accessory was refreshed.
    fn spawn_refreshes(&self, tasks: &mut JoinSet<bool>) -> usize {
        let mut spawned = 0;

        for accessory in self.cache.values() {
            if !accessory.is_bound() {
                debug!("Skipping unbound accessory {}", accessory.identity());
                continue;
            }
            let Some(guard) = accessory.begin_refresh() else {
                debug!("Refresh of {} still in flight", accessory.identity());
                continue;
            };
            tasks.spawn(async move { guard.refresh().await.is_some() });
            spawned += 1;
        }

        spawned
    }

    /// Refresh every bound accessory from the backend and wait for the results.
    ///
    /// Each accessory is refreshed in its own task; returns how many were
    /// refreshed. Accessories whose previous refresh is still in flight are
    /// left to it.
    pub async fn reconcile(&self) -> usize {
        let mut tasks = JoinSet::new();
        self.spawn_refreshes(&mut tasks);

        let mut refreshed = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => refreshed += 1,
                Ok(false) => {}
                Err(e) => warn!("Accessory refresh task failed: {}", e),
            }
        }

        debug!("Refreshed {} accessories", refreshed);
        refreshed
    }

    /// Answer a host read of an accessory's primary characteristic.
    pub async fn get_characteristic(
        &self,
        identity: &Identity,
    ) -> Result<CharacteristicValue, PlatformError> {
        let accessory = self
            .cache
            .get(identity)
            .ok_or(PlatformError::UnknownAccessory(*identity))?;

        accessory
            .refresh()
            .await
            .ok_or(PlatformError::Unbound(*identity))
    }

    /// Answer a host write of an accessory's primary characteristic.
    pub async fn set_characteristic(
        &self,
        identity: &Identity,
        value: CharacteristicValue,
    ) -> Result<(), PlatformError> {
        let accessory = self
            .cache
            .get(identity)
            .ok_or(PlatformError::UnknownAccessory(*identity))?;

        info!(
            "Setting {} to {}",
            accessory.record().display_name,
            if value.is_on() { "on" } else { "off" }
        );

        if let Err(e) = accessory.set_value(value).await {
            error!("{}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Run discovery and polling until `shutdown` fires.
    ///
    /// Discovery runs immediately and then every discovery interval; polling
    /// starts one poll interval after launch. Neither waits on the other: a
    /// discovery pass runs in its own task, and each poll tick starts one
    /// refresh task per accessory, so a slow unit only holds back its own
    /// next refresh. On shutdown the timers are dropped and in-flight work is
    /// left to finish in the background.
    pub async fn run(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        info!(
            "Platform finished launching (poll every {:?}, discovery every {:?})",
            self.poll_interval, self.discovery_interval
        );

        let mut discovery = tokio::time::interval(self.discovery_interval);
        discovery.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut poll =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut discovery_task: Option<JoinHandle<()>> = None;
        let mut refreshes = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Platform shutting down");
                    break;
                }
                _ = discovery.tick() => {
                    if discovery_task.as_ref().is_some_and(|task| !task.is_finished()) {
                        debug!("Previous discovery pass still running, skipping");
                    } else {
                        let platform = self.clone();
                        discovery_task = Some(tokio::spawn(async move {
                            if let Err(e) = platform.discover().await {
                                error!("Failed to discover devices: {}", e);
                            }
                        }));
                    }
                }
                _ = poll.tick() => {
                    let started = self.spawn_refreshes(&mut refreshes);
                    debug!("Started {} accessory refreshes", started);
                }
                Some(result) = refreshes.join_next() => {
                    if let Err(e) = result {
                        warn!("Accessory refresh task failed: {}", e);
                    }
                }
            }
        }

        refreshes.detach_all();
    }
}

/// Resolve every unit of every descriptor into an accessory record.
///
/// Returns the records and the number of descriptors skipped.
pub fn resolve_devices(devices: &[DeviceDescriptor]) -> (Vec<AccessoryRecord>, usize) {
    let mut records = Vec::new();
    let mut skipped = 0;

    for device in devices {
        match resolve_device(device) {
            Ok(device_records) => records.extend(device_records),
            Err(e) => {
                warn!("Skipping device {:?}: {}", device.name, e);
                skipped += 1;
            }
        }
    }

    (records, skipped)
}

fn resolve_device(device: &DeviceDescriptor) -> Result<Vec<AccessoryRecord>, InvalidIdentityInput> {
    let device_id = device.id.as_deref().unwrap_or_default();
    let kind = capability::classify(device.device_types.as_slice());
    let unit_count = device.unit_count();
    let multi_unit = !device.sub_switches.is_empty();

    device
        .units()
        .into_iter()
        .map(|unit| -> Result<AccessoryRecord, InvalidIdentityInput> {
            let display_name = if multi_unit {
                format!("{} - {}", device.name, unit.name)
            } else {
                device.name.clone()
            };

            Ok(AccessoryRecord {
                identity: identity::resolve(device_id, unit_count, unit.index)?,
                display_name,
                service_name: unit.name.to_string(),
                kind,
                unit_index: unit.index,
                device_id: device_id.to_string(),
            })
        })
        .collect()
}
