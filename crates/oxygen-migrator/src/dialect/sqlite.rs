//! SQLite dialect.
//!
//! SQLite serializes writers on its own, so the advisory lock is a no-op
//! and the default `lock`/`unlock` implementations are kept.

use crate::schema::{Column, ColumnType};

use super::{Dialect, Probe, SQLITE};

/// SQLite migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn driver_name(&self) -> &'static str {
        SQLITE
    }

    fn column_type(&self, column: &Column) -> String {
        match column.column_type {
            // SQLite stores booleans as 0/1
            ColumnType::Int | ColumnType::BigInt | ColumnType::Bool => "INTEGER",
            ColumnType::Varchar
            | ColumnType::NVarchar
            | ColumnType::Char
            | ColumnType::Text
            | ColumnType::MediumText
            | ColumnType::LongText
            | ColumnType::DateTime
            | ColumnType::Date => "TEXT",
            ColumnType::Float | ColumnType::Double => "REAL",
            ColumnType::Blob => "BLOB",
        }
        .to_string()
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }

    fn database_name_sql(&self) -> &'static str {
        "SELECT file FROM pragma_database_list WHERE name = 'main'"
    }

    fn table_check_sql(&self, table: &str) -> Probe {
        Probe::new("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?").arg(table)
    }

    fn column_check_sql(&self, table: &str, column: &str) -> Probe {
        Probe::new("SELECT 1 FROM pragma_table_info(?) WHERE name = ?")
            .arg(table)
            .arg(column)
    }

    fn index_check_sql(&self, table: &str, index_name: &str) -> Probe {
        Probe::new("SELECT 1 FROM sqlite_master WHERE type = 'index' AND tbl_name = ? AND name = ?")
            .arg(table)
            .arg(index_name)
    }
}
