//! In-memory fake for the config store (testing only).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::{StoreError, StoreResult};
use crate::{BackupRecord, ConfigStore};

/// In-memory config store backed by maps, with backup-failure injection
/// for exercising the fail-safe "never apply without a backup" path.
#[derive(Default)]
pub struct MemoryConfigStore {
    generated: Mutex<HashMap<String, String>>,
    /// Keyed by backup key; BTreeMap so iteration order is chronological.
    backups: Mutex<BTreeMap<String, (BackupRecord, String)>>,
    last_capture: Mutex<Option<DateTime<Utc>>>,
    fail_backups: AtomicBool,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `write_backup` calls fail, simulating an
    /// unreachable store.
    pub fn fail_backups(&self, fail: bool) {
        self.fail_backups.store(fail, Ordering::SeqCst);
    }

    /// Strictly increasing capture timestamps at second resolution, so
    /// keys never collide and ordering assertions are deterministic.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_capture.lock().unwrap();
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::seconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn save_generated(&self, device: &str, text: &str) -> StoreResult<()> {
        self.generated
            .lock()
            .unwrap()
            .insert(device.to_string(), text.to_string());
        Ok(())
    }

    async fn read_generated(&self, device: &str) -> StoreResult<Option<String>> {
        Ok(self.generated.lock().unwrap().get(device).cloned())
    }

    async fn write_backup(&self, device: &str, text: &str) -> StoreResult<BackupRecord> {
        if self.fail_backups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected backup failure".to_string()));
        }
        let record = BackupRecord::new(device, self.next_timestamp());
        self.backups
            .lock()
            .unwrap()
            .insert(record.key.clone(), (record.clone(), text.to_string()));
        Ok(record)
    }

    async fn read_backup(&self, record: &BackupRecord) -> StoreResult<String> {
        self.backups
            .lock()
            .unwrap()
            .get(&record.key)
            .map(|(_, text)| text.clone())
            .ok_or_else(|| StoreError::BackupNotFound {
                key: record.key.clone(),
            })
    }

    async fn latest_backup(&self, device: &str) -> StoreResult<Option<BackupRecord>> {
        Ok(self.list_backups(device).await?.into_iter().next())
    }

    async fn list_backups(&self, device: &str) -> StoreResult<Vec<BackupRecord>> {
        Ok(self
            .backups
            .lock()
            .unwrap()
            .values()
            .filter(|(record, _)| record.device == device)
            .map(|(record, _)| record.clone())
            .rev()
            .collect())
    }
}
