mod accessory;
mod cache;
pub mod capability;
mod error;
mod host;
pub mod identity;
#[allow(clippy::module_inception)]
mod platform;

pub use accessory::AccessoryRecord;
pub use accessory::AccessorySnapshot;
pub use accessory::PlatformAccessory;
pub use accessory::RefreshGuard;
pub use accessory::UnitHandler;
pub use cache::AccessoryCache;
pub use cache::SharedAccessory;
pub use capability::Active;
pub use capability::CapabilityKind;
pub use capability::CharacteristicValue;
pub use error::PlatformError;
#[cfg(test)]
pub use host::RecordingHost;
pub use host::AccessoryHost;
pub use identity::Identity;
pub use identity::InvalidIdentityInput;
pub use platform::resolve_devices;
pub use platform::DiscoveryReport;
pub use platform::Platform;
