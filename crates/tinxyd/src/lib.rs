pub mod api;
pub mod config;
pub mod platform;
pub mod store;
pub mod tinxy;

pub use config::Config;
pub use config::LogLevel;
pub use platform::AccessoryHost;
pub use platform::CapabilityKind;
pub use platform::CharacteristicValue;
pub use platform::Identity;
pub use platform::Platform;
pub use store::AccessoryStore;
pub use tinxy::DeviceClient;
pub use tinxy::TinxyClient;
