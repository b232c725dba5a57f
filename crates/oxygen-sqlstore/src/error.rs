//! Error types for the SQL store.

use oxygen_migrator::MigrateError;

/// Configuration problems detected before connecting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The database type names no supported backend.
    #[error("unsupported database type: {0}")]
    UnsupportedDatabase(String),

    /// No connection URL was given.
    #[error("database url is empty")]
    MissingUrl,

    /// The URL scheme belongs to another backend.
    #[error("database url {url:?} does not match database type {db_type}")]
    UrlMismatch {
        /// Configured backend.
        db_type: String,
        /// Offending URL.
        url: String,
    },

    /// The pool would never hand out a connection.
    #[error("max_open_conn must be at least 1")]
    InvalidPoolSize,
}

/// Errors returned by [`SqlStore`](crate::SqlStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A migration run failed.
    #[error(transparent)]
    Migrate(#[from] MigrateError),

    /// Database error outside of a migration run.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
