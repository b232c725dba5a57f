//! Versioned schema migrations for SQLite, PostgreSQL and MySQL.
//!
//! `oxygen-migrator` applies an ordered list of uniquely identified schema
//! changes to a database exactly once each:
//! - Every migration runs in its own transaction and commits or rolls back
//!   as a unit
//! - A `migration_log` table records each attempt; successful rows are never
//!   applied again
//! - The first failure stops the batch
//! - An optional backend advisory lock serializes concurrent instances
//!
//! # Architecture
//!
//! - **Schema** - `Table`, `Column` and `Index` descriptors
//! - **Dialect** - Backend-specific DDL, probes and advisory locks
//! - **Migration** - A declarative `SchemaChange` or a `CodeMigration`,
//!   optionally gated by a `Condition`
//! - **Log** - The persisted ledger of attempts
//! - **Migrator** - Registry and run loop
//!
//! # Example
//!
//! ```rust,ignore
//! use oxygen_migrator::prelude::*;
//!
//! let user = Table::new("user")
//!     .column(Column::new("id", ColumnType::BigInt).primary_key().auto_increment())
//!     .column(Column::new("login", ColumnType::NVarchar).length(190));
//!
//! let mut mg = Migrator::from_driver(pool, "sqlite3")?;
//! mg.add_create_migration();
//! mg.add_migration("create user table", Migration::add_table(user.clone()));
//! mg.add_migration(
//!     "add unique index user.login",
//!     Migration::add_index(&user, Index::unique(["login"])),
//! );
//!
//! let report = mg.start(true, 30).await?;
//! ```

pub mod condition;
pub mod dialect;
pub mod error;
pub mod lock;
pub mod log;
pub mod migration;
pub mod migrator;
pub mod schema;
pub mod sync;

#[cfg(test)]
mod testing;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::condition::{Condition, SchemaCondition};
    pub use crate::dialect::{
        for_driver, Dialect, MysqlDialect, PostgresDialect, Probe, SqliteDialect,
    };
    pub use crate::error::{MigrateError, Result};
    pub use crate::lock::{LockConfig, LockManager};
    pub use crate::log::MigrationLog;
    pub use crate::migration::{CodeMigration, Migration, MigrationKind, RawSql, SchemaChange};
    pub use crate::migrator::{MigrationReport, Migrator};
    pub use crate::schema::{Column, ColumnType, Index, IndexKind, SchemaError, Table};
}

pub use error::{MigrateError, Result};
pub use migration::Migration;
pub use migrator::{MigrationReport, Migrator};
