//! Migration log tracking.
//!
//! The log is an append-only table with one row per attempt. Only rows with
//! `success = true` count as applied; failed attempts are kept for
//! diagnosis but never stop a migration from being retried.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::any::Any;
use sqlx::AnyConnection;

use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};
use crate::schema::{Column, ColumnType, Table};

/// Default name of the log table.
pub const DEFAULT_LOG_TABLE: &str = "migration_log";

/// A row of the migration log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationLog {
    /// Surrogate key; zero when the backend does not report it.
    pub id: i64,
    /// Id of the migration this attempt belongs to.
    pub migration_id: String,
    /// SQL that was executed.
    pub sql: String,
    /// Whether the attempt committed.
    pub success: bool,
    /// Error message of a failed attempt, empty otherwise.
    pub error: String,
    /// When the attempt was recorded.
    pub timestamp: DateTime<Utc>,
}

impl MigrationLog {
    /// Creates an entry for a committed migration.
    #[must_use]
    pub fn success(migration_id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(migration_id.into(), sql.into(), true, String::new())
    }

    /// Creates an entry for a failed attempt.
    #[must_use]
    pub fn failure(
        migration_id: impl Into<String>,
        sql: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(migration_id.into(), sql.into(), false, error.into())
    }

    fn new(migration_id: String, sql: String, success: bool, error: String) -> Self {
        Self {
            id: 0,
            migration_id,
            sql,
            success,
            error,
            timestamp: Utc::now(),
        }
    }
}

/// Describes the log table.
#[must_use]
pub fn log_table(name: &str) -> Table {
    Table::new(name)
        .column(
            Column::new("id", ColumnType::BigInt)
                .primary_key()
                .auto_increment(),
        )
        .column(Column::new("migration_id", ColumnType::NVarchar).length(255))
        .column(Column::new("sql", ColumnType::Text))
        .column(Column::new("success", ColumnType::Bool))
        .column(Column::new("error", ColumnType::Text))
        .column(Column::new("timestamp", ColumnType::DateTime))
}

type LogRow = (i64, String, Option<String>, Option<String>, Option<String>);

/// Loads the successful entries, keyed by migration id.
///
/// Returns an empty map when the log table does not exist yet.
pub async fn load(
    dialect: &dyn Dialect,
    conn: &mut AnyConnection,
    table: &str,
) -> Result<HashMap<String, MigrationLog>> {
    if !dialect.table_check_sql(table).exists(conn).await? {
        return Ok(HashMap::new());
    }

    let q = |name: &str| dialect.quote(name);
    let sql = format!(
        "SELECT {}, {}, {}, {}, {} FROM {} WHERE {} = {} ORDER BY {}",
        q("id"),
        q("migration_id"),
        q("sql"),
        q("error"),
        dialect.timestamp_as_text(&q("timestamp")),
        q(table),
        q("success"),
        dialect.bool_literal(true),
        q("id"),
    );

    let rows = sqlx::query_as::<Any, LogRow>(&sql)
        .fetch_all(&mut *conn)
        .await?;

    let mut entries = HashMap::with_capacity(rows.len());
    for (id, migration_id, sql, error, timestamp) in rows {
        let timestamp = parse_timestamp(id, timestamp.as_deref().unwrap_or_default())?;
        entries.insert(
            migration_id.clone(),
            MigrationLog {
                id,
                migration_id,
                sql: sql.unwrap_or_default(),
                success: true,
                error: error.unwrap_or_default(),
                timestamp,
            },
        );
    }

    Ok(entries)
}

/// Appends an entry and returns its row id when the backend reports one.
pub async fn append(
    dialect: &dyn Dialect,
    conn: &mut AnyConnection,
    table: &str,
    entry: &MigrationLog,
) -> Result<Option<i64>> {
    let q = |name: &str| dialect.quote(name);
    let mut sql = format!(
        "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES ({}, {}, {}, {}, {})",
        q(table),
        q("migration_id"),
        q("sql"),
        q("success"),
        q("error"),
        q("timestamp"),
        dialect.placeholder(1),
        dialect.placeholder(2),
        dialect.placeholder(3),
        dialect.placeholder(4),
        dialect.timestamp_literal(&entry.timestamp),
    );

    if let Some(returning) = dialect.returning_clause("id") {
        sql.push_str(&returning);
        let id = sqlx::query_scalar::<Any, i64>(&sql)
            .bind(entry.migration_id.as_str())
            .bind(entry.sql.as_str())
            .bind(entry.success)
            .bind(entry.error.as_str())
            .fetch_one(&mut *conn)
            .await?;
        return Ok(Some(id));
    }

    let result = sqlx::query::<Any>(&sql)
        .bind(entry.migration_id.as_str())
        .bind(entry.sql.as_str())
        .bind(entry.success)
        .bind(entry.error.as_str())
        .execute(&mut *conn)
        .await?;

    Ok(result.last_insert_id())
}

fn parse_timestamp(id: i64, raw: &str) -> Result<DateTime<Utc>> {
    // backends print fractional seconds only when they stored them
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| dt.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|err| MigrateError::InvalidLogEntry {
            id,
            message: format!("bad timestamp {raw:?}: {err}"),
        })
}
