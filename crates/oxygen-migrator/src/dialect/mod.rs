//! Database dialect implementations.
//!
//! Each dialect knows how to render DDL for the schema descriptor types,
//! how to probe the live schema, and how to take the backend's advisory
//! lock used to serialize migration runs across processes.

mod mysql;
mod postgres;
mod sqlite;

use std::fmt;

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture};
use sqlx::any::{Any, AnyRow};
use sqlx::AnyConnection;

pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::error::{MigrateError, Result};
use crate::lock::LockConfig;
use crate::schema::{Column, Index, Table};

/// Driver name for PostgreSQL.
pub const POSTGRES: &str = "postgres";
/// Driver name for MySQL.
pub const MYSQL: &str = "mysql";
/// Driver name for SQLite.
pub const SQLITE: &str = "sqlite3";

/// Selects the dialect for a driver name.
pub fn for_driver(driver: &str) -> Result<Box<dyn Dialect>> {
    match driver {
        POSTGRES | "postgresql" => Ok(Box::new(PostgresDialect::new())),
        MYSQL => Ok(Box::new(MysqlDialect::new())),
        SQLITE | "sqlite" => Ok(Box::new(SqliteDialect::new())),
        other => Err(MigrateError::UnsupportedDriver(other.to_string())),
    }
}

/// A parameterized query used to inspect the live database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// Query text with dialect placeholders.
    pub sql: String,
    /// Positional string arguments.
    pub args: Vec<String>,
}

impl Probe {
    /// Creates a probe without arguments.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Runs the probe and returns every row.
    pub async fn fetch(&self, conn: &mut AnyConnection) -> Result<Vec<AnyRow>> {
        let mut query = sqlx::query::<Any>(&self.sql);
        for arg in &self.args {
            query = query.bind(arg.as_str());
        }
        Ok(query.fetch_all(&mut *conn).await?)
    }

    /// Runs the probe and reports whether it returned any row.
    pub async fn exists(&self, conn: &mut AnyConnection) -> Result<bool> {
        Ok(!self.fetch(conn).await?.is_empty())
    }
}

/// Backend-specific SQL rendering and advisory locking.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Returns the driver name this dialect serves.
    fn driver_name(&self) -> &'static str;

    /// Returns the backend type token for a column.
    fn column_type(&self, column: &Column) -> String;

    /// Returns the auto-increment keyword placed after `PRIMARY KEY`.
    fn auto_increment_keyword(&self) -> &'static str;

    /// Query returning the current database name as a single text column.
    fn database_name_sql(&self) -> &'static str;

    /// Probe returning a row when the table exists.
    fn table_check_sql(&self, table: &str) -> Probe;

    /// Probe returning a row when the column exists.
    fn column_check_sql(&self, table: &str, column: &str) -> Probe;

    /// Probe returning a row when the index exists.
    fn index_check_sql(&self, table: &str, index_name: &str) -> Probe;

    /// Returns the identifier quote character.
    fn quote_char(&self) -> char {
        '"'
    }

    /// Quotes an identifier, doubling any embedded quote characters.
    fn quote(&self, name: &str) -> String {
        let q = self.quote_char();
        let escaped = name.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Returns the `n`-th (1-based) bind placeholder.
    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    /// Renders a boolean literal.
    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    /// Renders a timestamp literal.
    fn timestamp_literal(&self, ts: &DateTime<Utc>) -> String {
        format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.6f"))
    }

    /// Wraps a datetime expression so it reads back as text.
    fn timestamp_as_text(&self, expr: &str) -> String {
        expr.to_string()
    }

    /// Clause appended to an `INSERT` so it yields the generated `column`.
    ///
    /// `None` means the id is read from the query result instead.
    fn returning_clause(&self, column: &str) -> Option<String> {
        Some(format!(" RETURNING {}", self.quote(column)))
    }

    /// Trailing table options appended to `CREATE TABLE`.
    fn table_options(&self) -> &'static str {
        ""
    }

    /// Generates column definition SQL.
    fn column_definition(&self, column: &Column) -> String {
        let mut sql = format!("{} {}", self.quote(&column.name), self.column_type(column));

        if column.is_primary_key {
            sql.push_str(" PRIMARY KEY");
            let keyword = self.auto_increment_keyword();
            if column.is_auto_increment && !keyword.is_empty() {
                sql.push(' ');
                sql.push_str(keyword);
            }
        } else if column.nullable {
            sql.push_str(" NULL");
        } else {
            sql.push_str(" NOT NULL");
        }

        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }

        sql
    }

    /// Generates SQL for `CREATE TABLE IF NOT EXISTS`.
    fn create_table_sql(&self, table: &Table) -> String {
        let composite = table.primary_keys().count() > 1;

        let mut defs: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                if composite && c.is_primary_key {
                    let mut inline = c.clone();
                    inline.is_primary_key = false;
                    inline.nullable = false;
                    self.column_definition(&inline)
                } else {
                    self.column_definition(c)
                }
            })
            .collect();

        if composite {
            let keys: Vec<String> = table.primary_keys().map(|c| self.quote(&c.name)).collect();
            defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.quote(&table.name),
            defs.iter()
                .map(|d| format!("  {d}"))
                .collect::<Vec<_>>()
                .join(",\n")
        );
        let options = self.table_options();
        if !options.is_empty() {
            sql.push(' ');
            sql.push_str(options);
        }
        sql
    }

    /// Generates SQL for `CREATE [UNIQUE] INDEX`.
    fn create_index_sql(&self, table: &str, index: &Index) -> String {
        let cols: Vec<String> = index.columns.iter().map(|c| self.quote(c)).collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.is_unique() { "UNIQUE " } else { "" },
            self.quote(&index.name_for(table)),
            self.quote(table),
            cols.join(", ")
        )
    }

    /// Generates SQL for dropping an index.
    fn drop_index_sql(&self, table: &str, index: &Index) -> String {
        format!("DROP INDEX {}", self.quote(&index.name_for(table)))
    }

    /// Generates SQL for adding a column.
    fn add_column_sql(&self, table: &str, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote(table),
            self.column_definition(column)
        )
    }

    /// Generates SQL for dropping a table.
    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(table))
    }

    /// Generates SQL for renaming a table.
    fn rename_table_sql(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote(from),
            self.quote(to)
        )
    }

    /// Takes the advisory lock described by `cfg`.
    ///
    /// Runs on the connection that holds the migration transaction and must
    /// give up once `cfg.timeout` has elapsed.
    fn lock<'a>(
        &'a self,
        conn: &'a mut AnyConnection,
        cfg: &'a LockConfig,
    ) -> BoxFuture<'a, Result<()>> {
        let _ = (conn, cfg);
        Box::pin(future::ready(Ok(())))
    }

    /// Releases the advisory lock described by `cfg`.
    fn unlock<'a>(
        &'a self,
        conn: &'a mut AnyConnection,
        cfg: &'a LockConfig,
    ) -> BoxFuture<'a, Result<()>> {
        let _ = (conn, cfg);
        Box::pin(future::ready(Ok(())))
    }
}
