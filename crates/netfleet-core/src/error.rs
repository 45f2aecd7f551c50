//! Domain-level error taxonomy for netfleet.
//!
//! Every fallible operation in the pipeline returns one of these kinds so
//! callers can make deliberate skip/abort decisions. Device-scoped errors
//! during parallel phases (generate, validate) are isolated per device;
//! during the sequential deploy phase a failure halts the remaining
//! planned devices.

/// Netfleet domain errors.
#[derive(Debug, thiserror::Error)]
pub enum NetfleetError {
    /// Device absent from the intent repository. Callers treat this as a
    /// skip, not a fatal pipeline error: partial fleets are a normal
    /// operating mode.
    #[error("intent not found for device: {0}")]
    IntentNotFound(String),

    /// The intent references a rendering template that does not exist or
    /// fails to render. An authoring error, scoped to one device.
    #[error("template error for '{template}': {detail}")]
    TemplateError { template: String, detail: String },

    /// The backup store was unreachable or the write failed. The apply for
    /// that device must not proceed.
    #[error("backup failure for {device}: {detail}")]
    BackupFailure { device: String, detail: String },

    /// The device refused the pushed configuration.
    #[error("device {device} rejected configuration: {detail}")]
    ApplyRejected { device: String, detail: String },

    /// Session connect/capture/timeout failure, scoped to the current phase.
    #[error("session error for {device}: {detail}")]
    SessionError { device: String, detail: String },

    /// The validation category is not present on the device. Maps to a
    /// `skip` classification, never a `fail`.
    #[error("no parsable {category} state on {device}")]
    ParseUnavailable { device: String, category: String },

    /// The tier assignment is contradictory: devices depend on each other.
    #[error("cyclic dependency among devices: {0}")]
    CyclicDependency(String),

    #[error("intent load error: {0}")]
    IntentLoad(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetfleetError {
    /// Per-operation timeout, reported as a session error for that device.
    pub fn timeout(device: &str, op: &str, secs: u64) -> Self {
        NetfleetError::SessionError {
            device: device.to_string(),
            detail: format!("{} timed out after {}s", op, secs),
        }
    }
}

/// Result type for netfleet domain operations.
pub type Result<T> = std::result::Result<T, NetfleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_the_kind() {
        let err = NetfleetError::IntentNotFound("EDGE-PE9".to_string());
        assert!(err.to_string().contains("intent not found"));

        let err = NetfleetError::BackupFailure {
            device: "CORE1".to_string(),
            detail: "store unreachable".to_string(),
        };
        assert!(err.to_string().contains("backup failure"));
        assert!(err.to_string().contains("CORE1"));
    }

    #[test]
    fn test_timeout_is_a_session_error() {
        let err = NetfleetError::timeout("CORE1", "capture", 30);
        match err {
            NetfleetError::SessionError { device, detail } => {
                assert_eq!(device, "CORE1");
                assert!(detail.contains("30s"));
            }
            other => panic!("expected SessionError, got {other:?}"),
        }
    }
}
