//! Error types for the config store.

/// Errors produced by config store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A referenced backup is missing.
    #[error("backup not found: {key}")]
    BackupNotFound { key: String },

    /// Injected or real store unavailability.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
