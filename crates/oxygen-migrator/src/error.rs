//! Error types for the migration engine.

use crate::schema::SchemaError;

/// Errors that can occur while running migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// No dialect exists for the configured driver.
    #[error("unsupported database driver: {0}")]
    UnsupportedDriver(String),

    /// The migrator lock is already held by this instance.
    #[error("migrator is locked")]
    Locked,

    /// The migrator lock was released without being held.
    #[error("migrator is unlocked")]
    Unlocked,

    /// The advisory lock could not be acquired in time.
    #[error("timed out after {timeout_secs}s waiting for migration lock {key}")]
    LockTimeout {
        /// Advisory lock key.
        key: i64,
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },

    /// The backend refused to release the advisory lock.
    #[error("failed to release migration lock {key}")]
    LockRelease {
        /// Advisory lock key.
        key: i64,
    },

    /// A migration failed; the batch was aborted.
    #[error("migration failed (id = {id}): {source}")]
    MigrationFailed {
        /// Id of the failing migration.
        id: String,
        /// Underlying cause.
        #[source]
        source: Box<MigrateError>,
    },

    /// A code migration reported a failure.
    #[error("{0}")]
    Code(String),

    /// A log row could not be decoded.
    #[error("invalid migration log entry {id}: {message}")]
    InvalidLogEntry {
        /// Surrogate key of the row.
        id: i64,
        /// What was wrong with it.
        message: String,
    },

    /// A table descriptor violates its invariants.
    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),

    /// Database error during migration execution.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl MigrateError {
    /// Returns the id of the failing migration, if this error wraps one.
    #[must_use]
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            Self::MigrationFailed { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
