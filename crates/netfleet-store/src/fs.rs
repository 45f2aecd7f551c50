//! Filesystem-backed config store.
//!
//! Layout:
//! - `<root>/generated/<device>.cfg`: current rendered config, overwritten
//!   atomically (temp file + rename in the same directory).
//! - `<root>/backups/<device>_<timestamp>.cfg`: append-only captures,
//!   created with `create_new` so an existing backup can never be
//!   clobbered.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::{BackupRecord, ConfigStore};

/// File-per-device config store rooted at a directory.
pub struct FsConfigStore {
    generated_dir: PathBuf,
    backups_dir: PathBuf,
}

impl FsConfigStore {
    /// Create a store rooted at `root`, creating its subdirectories.
    pub fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let generated_dir = root.as_ref().join("generated");
        let backups_dir = root.as_ref().join("backups");
        fs::create_dir_all(&generated_dir)?;
        fs::create_dir_all(&backups_dir)?;
        Ok(Self {
            generated_dir,
            backups_dir,
        })
    }

    fn generated_path(&self, device: &str) -> PathBuf {
        self.generated_dir.join(format!("{}.cfg", device))
    }
}

#[async_trait]
impl ConfigStore for FsConfigStore {
    async fn save_generated(&self, device: &str, text: &str) -> StoreResult<()> {
        let path = self.generated_path(device);
        let mut tmp = NamedTempFile::new_in(&self.generated_dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!(device, path = %path.display(), "saved generated config");
        Ok(())
    }

    async fn read_generated(&self, device: &str) -> StoreResult<Option<String>> {
        match fs::read_to_string(self.generated_path(device)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn write_backup(&self, device: &str, text: &str) -> StoreResult<BackupRecord> {
        // Keys have second resolution. Two captures of the same device
        // inside one second (deploy followed by immediate rollback) must
        // both survive, so advance to the next free second instead of
        // clobbering; `create_new` guarantees no overwrite either way.
        let mut timestamp = Utc::now();
        loop {
            let record = BackupRecord::new(device, timestamp);
            let path = self.backups_dir.join(&record.key);

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(text.as_bytes())?;
                    file.sync_all()?;
                    debug!(device, key = %record.key, "wrote backup");
                    return Ok(record);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    timestamp += chrono::Duration::seconds(1);
                }
                Err(e) => return Err(StoreError::Io(e)),
            }
        }
    }

    async fn read_backup(&self, record: &BackupRecord) -> StoreResult<String> {
        let path = self.backups_dir.join(&record.key);
        fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::BackupNotFound {
                    key: record.key.clone(),
                }
            } else {
                StoreError::Io(e)
            }
        })
    }

    async fn latest_backup(&self, device: &str) -> StoreResult<Option<BackupRecord>> {
        Ok(self.list_backups(device).await?.into_iter().next())
    }

    async fn list_backups(&self, device: &str) -> StoreResult<Vec<BackupRecord>> {
        let prefix = format!("{}_", device);
        let mut records = Vec::new();

        for entry in fs::read_dir(&self.backups_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&prefix) {
                continue;
            }
            if let Some(record) = BackupRecord::parse_key(name) {
                if record.device == device {
                    records.push(record);
                }
            }
        }

        records.sort_by(|a, b| b.key.cmp(&a.key));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, FsConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_generated_overwrite_roundtrip() {
        let (_dir, store) = make_store();
        assert!(store.read_generated("CORE1").await.unwrap().is_none());

        store.save_generated("CORE1", "hostname OLD\n").await.unwrap();
        store.save_generated("CORE1", "hostname NEW\n").await.unwrap();

        assert_eq!(
            store.read_generated("CORE1").await.unwrap().as_deref(),
            Some("hostname NEW\n")
        );
    }

    #[tokio::test]
    async fn test_backup_roundtrip_and_latest() {
        let (_dir, store) = make_store();
        assert!(store.latest_backup("CORE1").await.unwrap().is_none());

        let record = store.write_backup("CORE1", "hostname CORE1\n").await.unwrap();
        assert_eq!(record.device, "CORE1");
        assert_eq!(
            store.read_backup(&record).await.unwrap(),
            "hostname CORE1\n"
        );

        let latest = store.latest_backup("CORE1").await.unwrap().unwrap();
        assert_eq!(latest.key, record.key);
    }

    #[tokio::test]
    async fn test_backups_for_distinct_devices_do_not_interfere() {
        let (_dir, store) = make_store();
        store.write_backup("CORE1", "one\n").await.unwrap();
        store.write_backup("CORE2", "two\n").await.unwrap();

        let core1 = store.list_backups("CORE1").await.unwrap();
        assert_eq!(core1.len(), 1);
        assert_eq!(store.read_backup(&core1[0]).await.unwrap(), "one\n");

        // Prefix overlap must not leak: CORE1 never lists CORE1x backups.
        store.write_backup("CORE1x", "three\n").await.unwrap();
        assert_eq!(store.list_backups("CORE1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_backups_newest_first() {
        let (dir, store) = make_store();
        // Fabricate two captures a minute apart; write_backup stamps with
        // now(), so place the files directly.
        for key in [
            "PE1_20260806_090000.cfg",
            "PE1_20260806_170000.cfg",
        ] {
            std::fs::write(dir.path().join("backups").join(key), "x").unwrap();
        }
        let records = store.list_backups("PE1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "PE1_20260806_170000.cfg");
    }

    #[tokio::test]
    async fn test_missing_backup_is_not_found() {
        let (_dir, store) = make_store();
        let ghost = BackupRecord::new("PE1", Utc::now());
        assert!(matches!(
            store.read_backup(&ghost).await,
            Err(StoreError::BackupNotFound { .. })
        ));
    }
}
