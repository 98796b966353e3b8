use std::collections::BTreeMap;
use std::fs::{self, File};

use async_trait::async_trait;
use camino::Utf8PathBuf;
use tokio::sync::Mutex;

use crate::error::{ApiError, ApiResult};
use crate::host::{ConfigStore, EntryData};

/// Config entries persisted as one YAML document, keyed by entry id.
pub struct YamlConfigStore {
    file: Utf8PathBuf,
    entries: Mutex<BTreeMap<String, EntryData>>,
}

impl YamlConfigStore {
    pub fn load(file: Utf8PathBuf) -> ApiResult<Self> {
        let entries = if file.is_file() {
            match fs::read_to_string(&file) {
                Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
                Ok(raw) => match serde_yml::from_str(&raw) {
                    Ok(entries) => entries,
                    Err(err) => {
                        log::warn!("Failed to parse {}, starting empty: {}", file, err);
                        BTreeMap::new()
                    }
                },
                Err(err) => {
                    log::warn!("Failed to read {}, starting empty: {}", file, err);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        log::debug!("Loaded {} config entries from {}", entries.len(), file);

        Ok(Self {
            file,
            entries: Mutex::new(entries),
        })
    }

    fn write(&self, entries: &BTreeMap<String, EntryData>) -> ApiResult<()> {
        let file = File::create(&self.file)?;
        serde_yml::to_writer(file, entries)?;
        Ok(())
    }

    /// Create the entry if it does not exist yet. Existing data wins.
    pub async fn ensure_entry(&self, entry_id: &str, data: EntryData) -> ApiResult<()> {
        let mut lock = self.entries.lock().await;
        if lock.contains_key(entry_id) {
            return Ok(());
        }
        lock.insert(entry_id.to_string(), data);
        self.write(&lock)
    }

    pub async fn remove_entry(&self, entry_id: &str) -> ApiResult<bool> {
        let mut lock = self.entries.lock().await;
        if lock.remove(entry_id).is_none() {
            return Ok(false);
        }
        self.write(&lock)?;
        Ok(true)
    }
}

#[async_trait]
impl ConfigStore for YamlConfigStore {
    async fn load(&self, entry_id: &str) -> ApiResult<Option<EntryData>> {
        Ok(self.entries.lock().await.get(entry_id).cloned())
    }

    async fn save(&self, entry_id: &str, data: EntryData) -> ApiResult<()> {
        let mut lock = self.entries.lock().await;
        let Some(entry) = lock.get_mut(entry_id) else {
            return Err(ApiError::EntryNotFound(entry_id.to_string()));
        };
        *entry = data;
        self.write(&lock)
    }
}
