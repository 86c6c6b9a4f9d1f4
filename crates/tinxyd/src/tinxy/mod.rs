//! Client for the Tinxy cloud backend.

mod client;
mod device;
mod error;

#[cfg(test)]
pub use client::MockDeviceClient;
pub use client::DeviceClient;
pub use client::TinxyClient;
pub use device::device_number;
pub use device::DeviceDescriptor;
pub use device::RemoteState;
pub use device::ToggleRequest;
pub use device::Unit;
pub use error::ClientError;
pub use error::ConfigurationError;
pub use error::FetchError;
pub use error::ReadError;
pub use error::WriteError;
