//! Config store abstractions for netfleet.
//!
//! The store persists two kinds of artifact:
//! - the *current* rendered config per device (overwritten on each
//!   regeneration), and
//! - timestamped *backups* of captured live configs (append-only, never
//!   overwritten or deleted by this system).
//!
//! Writes to distinct devices' keys never interfere; same-device writes do
//! not race because one device is owned by one in-flight operation at a
//! time. An in-memory fake is provided for testing via the `fakes` module.

pub mod error;
pub mod fakes;
pub mod fs;

pub use error::{StoreError, StoreResult};
pub use fakes::MemoryConfigStore;
pub use fs::FsConfigStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout used in backup keys, second resolution, lexicographic
/// order equals chronological order.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Handle to one immutable backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Device the capture came from.
    pub device: String,

    /// Capture timestamp.
    pub timestamp: DateTime<Utc>,

    /// Store key, e.g. `EUNIV-CORE1_20260806_142501.cfg`.
    pub key: String,
}

impl BackupRecord {
    /// Build the record for a capture of `device` at `timestamp`.
    pub fn new(device: &str, timestamp: DateTime<Utc>) -> Self {
        let key = format!(
            "{}_{}.cfg",
            device,
            timestamp.format(BACKUP_TIMESTAMP_FORMAT)
        );
        Self {
            device: device.to_string(),
            timestamp,
            key,
        }
    }

    /// Recover a record from a store key. Returns `None` for keys that do
    /// not follow the backup layout.
    pub fn parse_key(key: &str) -> Option<Self> {
        let stem = key.strip_suffix(".cfg")?;
        // device + '_' + 15-char timestamp
        if stem.len() < 17 {
            return None;
        }
        let (device_part, ts_part) = stem.split_at(stem.len() - 15);
        let device = device_part.strip_suffix('_')?;
        let naive = NaiveDateTime::parse_from_str(ts_part, BACKUP_TIMESTAMP_FORMAT).ok()?;
        Some(Self {
            device: device.to_string(),
            timestamp: naive.and_utc(),
            key: key.to_string(),
        })
    }
}

/// Persistence contract for rendered configs and live-config backups.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Overwrite the current rendered config for a device.
    async fn save_generated(&self, device: &str, text: &str) -> StoreResult<()>;

    /// Read the current rendered config, `None` if never generated.
    async fn read_generated(&self, device: &str) -> StoreResult<Option<String>>;

    /// Append a new backup of a captured live config. Never overwrites;
    /// a key collision is an error.
    async fn write_backup(&self, device: &str, text: &str) -> StoreResult<BackupRecord>;

    /// Read one backup's captured text.
    async fn read_backup(&self, record: &BackupRecord) -> StoreResult<String>;

    /// The most recent backup for a device, `None` if none exist.
    async fn latest_backup(&self, device: &str) -> StoreResult<Option<BackupRecord>>;

    /// All backups for a device, newest first.
    async fn list_backups(&self, device: &str) -> StoreResult<Vec<BackupRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_key_roundtrip() {
        let ts = "20260806_142501";
        let naive = NaiveDateTime::parse_from_str(ts, BACKUP_TIMESTAMP_FORMAT).unwrap();
        let record = BackupRecord::new("EUNIV-CORE1", naive.and_utc());
        assert_eq!(record.key, "EUNIV-CORE1_20260806_142501.cfg");

        let parsed = BackupRecord::parse_key(&record.key).unwrap();
        assert_eq!(parsed.device, "EUNIV-CORE1");
        assert_eq!(parsed.timestamp, record.timestamp);
    }

    #[test]
    fn test_parse_key_rejects_foreign_files() {
        assert!(BackupRecord::parse_key("README.md").is_none());
        assert!(BackupRecord::parse_key("EUNIV-CORE1.cfg").is_none());
        assert!(BackupRecord::parse_key("EUNIV-CORE1_notatimestamp.cfg").is_none());
    }

    #[test]
    fn test_key_order_is_chronological() {
        let early = NaiveDateTime::parse_from_str("20260806_090000", BACKUP_TIMESTAMP_FORMAT)
            .unwrap()
            .and_utc();
        let late = NaiveDateTime::parse_from_str("20260806_170000", BACKUP_TIMESTAMP_FORMAT)
            .unwrap()
            .and_utc();
        let a = BackupRecord::new("PE1", early);
        let b = BackupRecord::new("PE1", late);
        assert!(a.key < b.key);
    }
}
