//! Device session interface.
//!
//! Transport, authentication and vendor command syntax live behind these
//! traits; the pipeline never assumes more than capture/apply/persist.
//! Each device has exactly one session in use at a time, owned by
//! whichever phase is currently operating on it.
//!
//! `DirSessionProvider` is the lab-grade implementation: every device's
//! running configuration is a file in a directory, which is enough to
//! exercise the whole pipeline end-to-end. Production transports (SSH,
//! NETCONF) implement the same traits out of tree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{NetfleetError, Result};

/// An established session to one device.
#[async_trait]
pub trait DeviceSession: Send {
    /// Capture the live running configuration as text.
    async fn capture(&mut self) -> Result<String>;

    /// Push the desired configuration. An error means the device rejected
    /// it.
    async fn apply(&mut self, text: &str) -> Result<()>;

    /// Persist the running configuration to the device's saved/startup
    /// state, where the transport exposes that capability.
    async fn persist(&mut self) -> Result<()>;

    /// Release the session.
    async fn disconnect(&mut self) -> Result<()>;
}

/// Establishes sessions to devices by name.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn connect(&self, device: &str) -> Result<Box<dyn DeviceSession>>;
}

/// Directory-backed session provider for lab fleets.
///
/// Layout: `<root>/<device>.cfg` is the running configuration,
/// `<root>/<device>.startup.cfg` the persisted copy. A device without a
/// running-config file is unreachable.
pub struct DirSessionProvider {
    root: PathBuf,
}

impl DirSessionProvider {
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    /// Seed a device's running configuration, creating it if absent.
    pub fn seed(&self, device: &str, text: &str) -> std::io::Result<()> {
        std::fs::write(self.running_path(device), text)
    }

    fn running_path(&self, device: &str) -> PathBuf {
        self.root.join(format!("{}.cfg", device))
    }

    fn startup_path(&self, device: &str) -> PathBuf {
        self.root.join(format!("{}.startup.cfg", device))
    }
}

#[async_trait]
impl SessionProvider for DirSessionProvider {
    async fn connect(&self, device: &str) -> Result<Box<dyn DeviceSession>> {
        let running = self.running_path(device);
        if !running.exists() {
            return Err(NetfleetError::SessionError {
                device: device.to_string(),
                detail: "device unreachable (no running config)".to_string(),
            });
        }
        debug!(device, "session opened");
        Ok(Box::new(DirSession {
            device: device.to_string(),
            running,
            startup: self.startup_path(device),
        }))
    }
}

struct DirSession {
    device: String,
    running: PathBuf,
    startup: PathBuf,
}

#[async_trait]
impl DeviceSession for DirSession {
    async fn capture(&mut self) -> Result<String> {
        std::fs::read_to_string(&self.running).map_err(|e| NetfleetError::SessionError {
            device: self.device.clone(),
            detail: format!("capture failed: {}", e),
        })
    }

    async fn apply(&mut self, text: &str) -> Result<()> {
        std::fs::write(&self.running, text).map_err(|e| NetfleetError::ApplyRejected {
            device: self.device.clone(),
            detail: e.to_string(),
        })
    }

    async fn persist(&mut self) -> Result<()> {
        std::fs::copy(&self.running, &self.startup).map_err(|e| NetfleetError::SessionError {
            device: self.device.clone(),
            detail: format!("persist failed: {}", e),
        })?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        debug!(device = %self.device, "session closed");
        Ok(())
    }
}
