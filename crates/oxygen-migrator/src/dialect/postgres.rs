//! PostgreSQL dialect.

use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::any::Any;
use sqlx::AnyConnection;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::lock::LockConfig;
use crate::schema::{Column, ColumnType};

use super::{Dialect, Probe, POSTGRES};

/// Delay between two `pg_try_advisory_lock` attempts.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// PostgreSQL migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn driver_name(&self) -> &'static str {
        POSTGRES
    }

    fn column_type(&self, column: &Column) -> String {
        // PostgreSQL uses SERIAL types instead of an AUTOINCREMENT keyword
        if column.is_primary_key && column.is_auto_increment {
            match column.column_type {
                ColumnType::Int => return "SERIAL".to_string(),
                ColumnType::BigInt => return "BIGSERIAL".to_string(),
                _ => {}
            }
        }

        match column.column_type {
            ColumnType::Int => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Varchar | ColumnType::NVarchar => {
                format!("VARCHAR({})", column.effective_length())
            }
            ColumnType::Char => format!("CHAR({})", column.effective_length()),
            ColumnType::Text | ColumnType::MediumText | ColumnType::LongText => {
                "TEXT".to_string()
            }
            ColumnType::Bool => "BOOL".to_string(),
            ColumnType::DateTime => "TIMESTAMP".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Blob => "BYTEA".to_string(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        ""
    }

    fn database_name_sql(&self) -> &'static str {
        "SELECT CAST(current_database() AS TEXT)"
    }

    fn table_check_sql(&self, table: &str) -> Probe {
        Probe::new(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1",
        )
        .arg(table)
    }

    fn column_check_sql(&self, table: &str, column: &str) -> Probe {
        Probe::new(
            "SELECT 1 FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2",
        )
        .arg(table)
        .arg(column)
    }

    fn index_check_sql(&self, table: &str, index_name: &str) -> Probe {
        Probe::new(
            "SELECT 1 FROM pg_indexes \
             WHERE schemaname = current_schema() AND tablename = $1 AND indexname = $2",
        )
        .arg(table)
        .arg(index_name)
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${n}")
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn timestamp_as_text(&self, expr: &str) -> String {
        format!("CAST({expr} AS TEXT)")
    }

    fn lock<'a>(
        &'a self,
        conn: &'a mut AnyConnection,
        cfg: &'a LockConfig,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let deadline = Instant::now() + cfg.timeout;
            loop {
                let acquired = sqlx::query_scalar::<Any, bool>("SELECT pg_try_advisory_lock($1)")
                    .bind(cfg.key)
                    .fetch_one(&mut *conn)
                    .await?;
                if acquired {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(MigrateError::LockTimeout {
                        key: cfg.key,
                        timeout_secs: cfg.timeout.as_secs(),
                    });
                }
                debug!(key = cfg.key, "migration lock is held elsewhere, waiting");
                tokio::time::sleep(LOCK_POLL_INTERVAL).await;
            }
        })
    }

    fn unlock<'a>(
        &'a self,
        conn: &'a mut AnyConnection,
        cfg: &'a LockConfig,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let released = sqlx::query_scalar::<Any, bool>("SELECT pg_advisory_unlock($1)")
                .bind(cfg.key)
                .fetch_one(&mut *conn)
                .await?;
            if released {
                Ok(())
            } else {
                Err(MigrateError::LockRelease { key: cfg.key })
            }
        })
    }
}
