//! Accessory host that persists registered accessories to disk.
//!
//! On the next start the stored records are handed back to the platform as
//! restored accessories, so identities survive restarts without a second
//! registration.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::platform::AccessoryHost;
use crate::platform::AccessoryRecord;
use crate::platform::Identity;
use crate::platform::SharedAccessory;

pub const ACCESSORIES_FILE: &str = "accessories.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to access {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to decode {0}: {1}")]
    Decode(PathBuf, #[source] serde_json::Error),

    #[error("Failed to encode accessories: {0}")]
    Encode(#[source] serde_json::Error),
}

/// JSON-file backed accessory host
#[derive(Debug)]
pub struct AccessoryStore {
    path: PathBuf,
    records: Mutex<BTreeMap<Identity, AccessoryRecord>>,
    /// Serialises saves so an older snapshot never lands after a newer one
    save_lock: tokio::sync::Mutex<()>,
}

impl AccessoryStore {
    /// Open the store in `dir`, loading any records saved by a previous run.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| StoreError::Io(dir.to_path_buf(), e))?;

        let path = dir.join(ACCESSORIES_FILE);
        let records = match std::fs::read(&path) {
            Ok(bytes) => {
                let records: Vec<AccessoryRecord> = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Decode(path.clone(), e))?;
                records.into_iter().map(|r| (r.identity, r)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Io(path, e)),
        };

        info!(
            "Loaded {} cached accessories from {}",
            records.len(),
            path.display()
        );

        Ok(Self {
            path,
            records: Mutex::new(records),
            save_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Identity, AccessoryRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records to restore into the platform at startup
    pub fn records(&self) -> Vec<AccessoryRecord> {
        self.lock().values().cloned().collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn remember(&self, accessories: &[SharedAccessory]) -> Result<(), StoreError> {
        let _save = self.save_lock.lock().await;

        let json = {
            let mut records = self.lock();
            for accessory in accessories {
                let record = accessory.record();
                records.insert(record.identity, record);
            }
            let snapshot: Vec<&AccessoryRecord> = records.values().collect();
            serde_json::to_vec_pretty(&snapshot).map_err(StoreError::Encode)?
        };

        write_atomic(&self.path, &json).await
    }
}

/// Write via a temporary sibling file, synced and then renamed, so readers
/// never see a partial file.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::Io(tmp.clone(), e))?;
    file.write_all(contents)
        .await
        .map_err(|e| StoreError::Io(tmp.clone(), e))?;
    file.sync_all()
        .await
        .map_err(|e| StoreError::Io(tmp.clone(), e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::Io(path.to_path_buf(), e))?;
    debug!("Saved {}", path.display());
    Ok(())
}

#[async_trait]
impl AccessoryHost for AccessoryStore {
    async fn register_accessories(&self, accessories: &[SharedAccessory]) {
        for accessory in accessories {
            info!("Registered accessory: {}", accessory.record().display_name);
        }
        if let Err(e) = self.remember(accessories).await {
            error!("Failed to save registered accessories: {}", e);
        }
    }

    async fn update_accessories(&self, accessories: &[SharedAccessory]) {
        debug!("Updating {} accessories", accessories.len());
        if let Err(e) = self.remember(accessories).await {
            error!("Failed to save updated accessories: {}", e);
        }
    }
}
