//! Shared helpers for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::{AnyConnection, AnyPool, Connection};

use crate::dialect::{Dialect, Probe, SqliteDialect};
use crate::error::{MigrateError, Result};
use crate::lock::LockConfig;
use crate::schema::Column;

pub async fn memory_connection() -> AnyConnection {
    install_default_drivers();
    AnyConnection::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite connection")
}

pub async fn memory_pool() -> AnyPool {
    install_default_drivers();
    AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

/// SQLite rendering with counted, optionally failing lock primitives.
#[derive(Debug, Default)]
pub struct RecordingDialect {
    inner: SqliteDialect,
    fail_lock: bool,
    fail_unlock: bool,
    locks: AtomicUsize,
    unlocks: AtomicUsize,
}

impl RecordingDialect {
    pub fn failing_lock() -> Self {
        Self {
            fail_lock: true,
            ..Self::default()
        }
    }

    pub fn failing_unlock() -> Self {
        Self {
            fail_unlock: true,
            ..Self::default()
        }
    }

    pub fn lock_calls(&self) -> usize {
        self.locks.load(Ordering::SeqCst)
    }

    pub fn unlock_calls(&self) -> usize {
        self.unlocks.load(Ordering::SeqCst)
    }
}

impl Dialect for RecordingDialect {
    fn driver_name(&self) -> &'static str {
        self.inner.driver_name()
    }

    fn column_type(&self, column: &Column) -> String {
        self.inner.column_type(column)
    }

    fn auto_increment_keyword(&self) -> &'static str {
        self.inner.auto_increment_keyword()
    }

    fn database_name_sql(&self) -> &'static str {
        self.inner.database_name_sql()
    }

    fn table_check_sql(&self, table: &str) -> Probe {
        self.inner.table_check_sql(table)
    }

    fn column_check_sql(&self, table: &str, column: &str) -> Probe {
        self.inner.column_check_sql(table, column)
    }

    fn index_check_sql(&self, table: &str, index_name: &str) -> Probe {
        self.inner.index_check_sql(table, index_name)
    }

    fn lock<'a>(
        &'a self,
        _conn: &'a mut AnyConnection,
        cfg: &'a LockConfig,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.locks.fetch_add(1, Ordering::SeqCst);
            if self.fail_lock {
                return Err(MigrateError::LockTimeout {
                    key: cfg.key,
                    timeout_secs: cfg.timeout.as_secs(),
                });
            }
            Ok(())
        })
    }

    fn unlock<'a>(
        &'a self,
        _conn: &'a mut AnyConnection,
        cfg: &'a LockConfig,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.unlocks.fetch_add(1, Ordering::SeqCst);
            if self.fail_unlock {
                return Err(MigrateError::LockRelease { key: cfg.key });
            }
            Ok(())
        })
    }
}
