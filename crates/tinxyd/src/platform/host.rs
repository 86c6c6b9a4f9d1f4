use async_trait::async_trait;

use super::cache::SharedAccessory;

/// The accessory framework the platform publishes into
///
/// Registration and update are fire-and-forget, like the host callbacks they
/// stand for; implementations log their own failures.
#[async_trait]
pub trait AccessoryHost: Send + Sync {
    /// Announce accessories the host has not seen before
    async fn register_accessories(&self, accessories: &[SharedAccessory]);

    /// Announce that already-registered accessories changed
    async fn update_accessories(&self, accessories: &[SharedAccessory]);
}

/// Host that records every call, for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub registered: std::sync::Mutex<Vec<super::identity::Identity>>,
    pub updated: std::sync::Mutex<Vec<super::identity::Identity>>,
}

#[cfg(test)]
impl RecordingHost {
    pub fn registered(&self) -> Vec<super::identity::Identity> {
        self.registered.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<super::identity::Identity> {
        self.updated.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl AccessoryHost for RecordingHost {
    async fn register_accessories(&self, accessories: &[SharedAccessory]) {
        self.registered
            .lock()
            .unwrap()
            .extend(accessories.iter().map(|a| a.identity()));
    }

    async fn update_accessories(&self, accessories: &[SharedAccessory]) {
        self.updated
            .lock()
            .unwrap()
            .extend(accessories.iter().map(|a| a.identity()));
    }
}
