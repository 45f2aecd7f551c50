//! In-memory fakes for the session and parser collaborators (testing only).
//!
//! `FakeSessionProvider` simulates a fleet of devices with scriptable
//! failure modes; `ScriptedParser` returns canned protocol state. Both
//! satisfy the trait contracts without touching the filesystem or a
//! network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{NetfleetError, Result};
use crate::parser::{CheckCategory, OutputParser, ProtocolState};
use crate::session::{DeviceSession, SessionProvider};

/// Scriptable behaviour for one fake device.
#[derive(Debug, Default)]
pub struct FakeDevice {
    /// Current running configuration.
    pub running: Mutex<String>,

    /// Persisted startup copy, when `persist` has been called.
    pub startup: Mutex<Option<String>>,

    /// Refuse `connect` calls.
    pub fail_connect: bool,

    /// Refuse `apply` calls with `ApplyRejected`.
    pub reject_apply: bool,

    /// Number of `apply` calls attempted (including rejected ones).
    pub apply_calls: AtomicUsize,
}

impl FakeDevice {
    pub fn with_running(text: &str) -> Self {
        Self {
            running: Mutex::new(text.to_string()),
            ..Default::default()
        }
    }

    pub fn rejecting(text: &str) -> Self {
        Self {
            running: Mutex::new(text.to_string()),
            reject_apply: true,
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_connect: true,
            ..Default::default()
        }
    }
}

/// In-memory session provider over a map of fake devices.
#[derive(Default)]
pub struct FakeSessionProvider {
    devices: HashMap<String, Arc<FakeDevice>>,
}

impl FakeSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: &str, device: FakeDevice) -> Self {
        self.devices.insert(name.to_string(), Arc::new(device));
        self
    }

    /// Direct handle to a fake device for assertions.
    pub fn device(&self, name: &str) -> Option<Arc<FakeDevice>> {
        self.devices.get(name).cloned()
    }
}

#[async_trait]
impl SessionProvider for FakeSessionProvider {
    async fn connect(&self, device: &str) -> Result<Box<dyn DeviceSession>> {
        let fake = self
            .devices
            .get(device)
            .ok_or_else(|| NetfleetError::SessionError {
                device: device.to_string(),
                detail: "unknown device".to_string(),
            })?;
        if fake.fail_connect {
            return Err(NetfleetError::SessionError {
                device: device.to_string(),
                detail: "connection refused".to_string(),
            });
        }
        Ok(Box::new(FakeSession {
            device: device.to_string(),
            fake: fake.clone(),
        }))
    }
}

struct FakeSession {
    device: String,
    fake: Arc<FakeDevice>,
}

#[async_trait]
impl DeviceSession for FakeSession {
    async fn capture(&mut self) -> Result<String> {
        Ok(self.fake.running.lock().unwrap().clone())
    }

    async fn apply(&mut self, text: &str) -> Result<()> {
        self.fake.apply_calls.fetch_add(1, Ordering::SeqCst);
        if self.fake.reject_apply {
            return Err(NetfleetError::ApplyRejected {
                device: self.device.clone(),
                detail: "invalid command".to_string(),
            });
        }
        *self.fake.running.lock().unwrap() = text.to_string();
        Ok(())
    }

    async fn persist(&mut self) -> Result<()> {
        let running = self.fake.running.lock().unwrap().clone();
        *self.fake.startup.lock().unwrap() = Some(running);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Parser returning canned state per (device, category).
///
/// Unscripted lookups return `ParseUnavailable`, which validation
/// classifies as a skip.
#[derive(Default)]
pub struct ScriptedParser {
    responses: HashMap<(String, CheckCategory), ProtocolState>,
}

impl ScriptedParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, device: &str, category: CheckCategory, state: ProtocolState) -> Self {
        self.responses.insert((device.to_string(), category), state);
        self
    }
}

#[async_trait]
impl OutputParser for ScriptedParser {
    async fn parse(&self, device: &str, category: CheckCategory) -> Result<ProtocolState> {
        self.responses
            .get(&(device.to_string(), category))
            .cloned()
            .ok_or_else(|| NetfleetError::ParseUnavailable {
                device: device.to_string(),
                category: category.name().to_string(),
            })
    }
}
