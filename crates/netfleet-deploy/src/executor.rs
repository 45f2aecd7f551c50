//! Per-device deployment execution.
//!
//! The executor owns exactly one device at a time. Sequence: capture the
//! live config, durably back it up, then (unless dry-run) push the desired
//! text and persist the device's startup state. A failed backup aborts the
//! apply; the system never mutates a device it cannot restore. Halting
//! the *sequence* of devices after a failure is the orchestrator's job,
//! not the executor's.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use netfleet_core::{
    diff_configs, ConfigDiff, DeviceSession, NetfleetError, Result, SessionProvider,
};
use netfleet_store::{BackupRecord, ConfigStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Terminal status of one device in a deploy phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Applied,
    Failed,
    Skipped,
}

/// Outcome of one device's apply (or rollback) attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub device: String,
    pub status: DeployStatus,

    /// Error detail for failures: names the error kind so the operator
    /// can decide between retry and rollback.
    pub error: Option<String>,

    /// Delta that was (or would be) applied.
    pub diff: Option<ConfigDiff>,

    /// Key of the backup captured before the apply.
    pub backup_key: Option<String>,

    /// Capture timestamp of that backup.
    pub backup_at: Option<DateTime<Utc>>,

    /// When the apply was attempted; strictly after `backup_at`.
    pub applied_at: Option<DateTime<Utc>>,

    /// Whether this was a diff-only dry run.
    pub dry_run: bool,

    pub duration_ms: u64,
}

impl DeploymentResult {
    pub fn skipped(device: &str, reason: &str) -> Self {
        Self {
            device: device.to_string(),
            status: DeployStatus::Skipped,
            error: Some(reason.to_string()),
            diff: None,
            backup_key: None,
            backup_at: None,
            applied_at: None,
            dry_run: false,
            duration_ms: 0,
        }
    }

    fn failed(device: &str, error: NetfleetError, started: Instant) -> Self {
        Self {
            device: device.to_string(),
            status: DeployStatus::Failed,
            error: Some(error.to_string()),
            diff: None,
            backup_key: None,
            backup_at: None,
            applied_at: None,
            dry_run: false,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == DeployStatus::Failed
    }

    pub fn is_applied(&self) -> bool {
        self.status == DeployStatus::Applied
    }
}

/// Applies configuration to one device at a time, backup first.
pub struct DeploymentExecutor {
    sessions: Arc<dyn SessionProvider>,
    store: Arc<dyn ConfigStore>,
    op_timeout: Duration,
}

impl DeploymentExecutor {
    pub fn new(sessions: Arc<dyn SessionProvider>, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            sessions,
            store,
            op_timeout: Duration::from_secs(30),
        }
    }

    /// Override the per-operation timeout applied to every session call.
    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Bound one session operation; a timeout fails this device only.
    async fn bounded<T>(
        &self,
        device: &str,
        op: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(NetfleetError::timeout(device, op, self.op_timeout.as_secs())),
        }
    }

    /// Deploy `desired` to one device.
    ///
    /// Never returns `Err`: every failure mode is folded into a `failed`
    /// result so the orchestrator can make the halt decision uniformly.
    pub async fn apply(&self, device: &str, desired: &str, dry_run: bool) -> DeploymentResult {
        let started = Instant::now();

        let mut session = match self
            .bounded(device, "connect", self.sessions.connect(device))
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!(device, error = %e, "connect failed");
                return DeploymentResult::failed(device, e, started);
            }
        };

        let live = match self.bounded(device, "capture", session.capture()).await {
            Ok(text) => text,
            Err(e) => {
                warn!(device, error = %e, "capture failed");
                let _ = session.disconnect().await;
                return DeploymentResult::failed(device, e, started);
            }
        };

        // Fail-safe: no backup, no apply.
        let backup = match self.store.write_backup(device, &live).await {
            Ok(record) => record,
            Err(e) => {
                let err = NetfleetError::BackupFailure {
                    device: device.to_string(),
                    detail: e.to_string(),
                };
                warn!(device, error = %err, "backup failed, apply aborted");
                let _ = session.disconnect().await;
                return DeploymentResult::failed(device, err, started);
            }
        };

        let diff = diff_configs(&live, desired);

        if dry_run {
            let _ = session.disconnect().await;
            info!(device, diff = %diff.summary(), "dry run, no changes applied");
            return DeploymentResult {
                device: device.to_string(),
                status: DeployStatus::Applied,
                error: None,
                diff: Some(diff),
                backup_key: Some(backup.key),
                backup_at: Some(backup.timestamp),
                applied_at: None,
                dry_run: true,
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }

        let applied_at = Utc::now();
        if let Err(e) = self.bounded(device, "apply", session.apply(desired)).await {
            warn!(device, error = %e, "apply rejected");
            let _ = session.disconnect().await;
            let mut result = DeploymentResult::failed(device, e, started);
            result.diff = Some(diff);
            result.backup_key = Some(backup.key);
            result.backup_at = Some(backup.timestamp);
            return result;
        }

        if let Err(e) = self.bounded(device, "persist", session.persist()).await {
            warn!(device, error = %e, "persist failed");
            let _ = session.disconnect().await;
            let mut result = DeploymentResult::failed(device, e, started);
            result.diff = Some(diff);
            result.backup_key = Some(backup.key);
            result.backup_at = Some(backup.timestamp);
            return result;
        }

        let _ = session.disconnect().await;
        info!(device, diff = %diff.summary(), "deployed");

        DeploymentResult {
            device: device.to_string(),
            status: DeployStatus::Applied,
            error: None,
            diff: Some(diff),
            backup_key: Some(backup.key),
            backup_at: Some(backup.timestamp),
            applied_at: Some(applied_at),
            dry_run: false,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Capture a device's live config into a backup without applying
    /// anything.
    pub async fn backup_device(&self, device: &str) -> Result<BackupRecord> {
        let mut session = self
            .bounded(device, "connect", self.sessions.connect(device))
            .await?;
        let live = match self.bounded(device, "capture", session.capture()).await {
            Ok(text) => text,
            Err(e) => {
                let _ = session.disconnect().await;
                return Err(e);
            }
        };
        let _ = session.disconnect().await;

        self.store
            .write_backup(device, &live)
            .await
            .map_err(|e| NetfleetError::BackupFailure {
                device: device.to_string(),
                detail: e.to_string(),
            })
    }

    /// Restore a device to its most recent backup.
    ///
    /// The current live config is backed up first; a rollback is itself a
    /// mutating apply and gets the same fail-safe. The restored text is
    /// byte-equal to the selected backup.
    pub async fn rollback(&self, device: &str) -> DeploymentResult {
        let started = Instant::now();

        let target = match self.store.latest_backup(device).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return DeploymentResult::failed(
                    device,
                    NetfleetError::BackupFailure {
                        device: device.to_string(),
                        detail: "no backups found".to_string(),
                    },
                    started,
                );
            }
            Err(e) => {
                return DeploymentResult::failed(
                    device,
                    NetfleetError::BackupFailure {
                        device: device.to_string(),
                        detail: e.to_string(),
                    },
                    started,
                );
            }
        };

        let text = match self.store.read_backup(&target).await {
            Ok(text) => text,
            Err(e) => {
                return DeploymentResult::failed(
                    device,
                    NetfleetError::BackupFailure {
                        device: device.to_string(),
                        detail: e.to_string(),
                    },
                    started,
                );
            }
        };

        info!(device, backup = %target.key, "rolling back");
        self.apply(device, &text, false).await
    }
}
