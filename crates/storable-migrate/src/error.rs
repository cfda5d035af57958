//! Error types for schema synchronization.

/// Errors that can occur while planning or applying migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Connection, query or entity description failure.
    #[error(transparent)]
    Core(#[from] storable_core::Error),

    /// SQLite reported a damaged database after a batch.
    #[error("integrity check failed: {0}")]
    IntegrityCheck(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
