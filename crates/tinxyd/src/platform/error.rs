use super::identity::Identity;
use crate::tinxy::WriteError;

/// Failure answering a get/set request from the accessory host.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("accessory {0} not found")]
    UnknownAccessory(Identity),

    #[error("accessory {0} is not bound to a remote device yet")]
    Unbound(Identity),

    #[error(transparent)]
    Write(#[from] WriteError),
}
