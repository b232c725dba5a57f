//! SQL store for oxygen.
//!
//! Wraps a sqlx `Any` pool with the configured backend's dialect, explicit
//! session helpers, and the built-in migration set run through
//! `oxygen-migrator`.
//!
//! # Example
//!
//! ```rust,ignore
//! use oxygen_sqlstore::{DatabaseConfig, DatabaseType, OxygenMigrations, SqlStore};
//!
//! let cfg = DatabaseConfig::new(DatabaseType::Postgres, "postgres://oxygen@localhost/oxygendb");
//! let store = SqlStore::connect(cfg, OxygenMigrations).await?;
//! store.migrate().await?;
//! ```

pub mod config;
pub mod error;
pub mod migrations;
pub mod session;
pub mod store;

pub use config::{DatabaseConfig, DatabaseType};
pub use error::{ConfigError, Result, StoreError};
pub use migrations::{DatabaseMigrations, OxygenMigrations};
pub use store::SqlStore;
