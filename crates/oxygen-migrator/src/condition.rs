//! Migration guard conditions.
//!
//! A condition renders a probe query for the active dialect and decides,
//! from the rows it returns, whether its migration should run at all.

use std::fmt;

use sqlx::any::AnyRow;
use sqlx::AnyConnection;

use crate::dialect::{Dialect, Probe};
use crate::error::Result;
use crate::schema::Index;

/// Predicate gating whether a migration executes.
pub trait Condition: Send + Sync + fmt::Debug {
    /// Renders the probe query. `None` means the condition always holds.
    fn probe(&self, dialect: &dyn Dialect) -> Option<Probe>;

    /// Decides from the probe's rows whether the migration runs.
    fn is_fulfilled(&self, rows: &[AnyRow]) -> bool;
}

/// Evaluates a condition on the given connection.
///
/// A probe that fails to execute is an error, not an unmet condition.
pub async fn evaluate(
    condition: &dyn Condition,
    dialect: &dyn Dialect,
    conn: &mut AnyConnection,
) -> Result<bool> {
    match condition.probe(dialect) {
        Some(probe) => {
            let rows = probe.fetch(conn).await?;
            Ok(condition.is_fulfilled(&rows))
        }
        None => Ok(true),
    }
}

/// Conditions on the presence of schema objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaCondition {
    /// Runs only when the table exists.
    TableExists(String),
    /// Runs only when the table does not exist.
    TableMissing(String),
    /// Runs only when the column does not exist.
    ColumnMissing {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Runs only when the index exists.
    IndexExists {
        /// Table name.
        table: String,
        /// Index name as rendered in DDL.
        index: String,
    },
    /// Runs only when the index does not exist.
    IndexMissing {
        /// Table name.
        table: String,
        /// Index name as rendered in DDL.
        index: String,
    },
}

impl SchemaCondition {
    /// Runs only when `column` is absent from `table`.
    #[must_use]
    pub fn column_missing(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnMissing {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Runs only when `index` exists on `table`.
    #[must_use]
    pub fn index_exists(table: &str, index: &Index) -> Self {
        Self::IndexExists {
            table: table.to_string(),
            index: index.name_for(table),
        }
    }

    /// Runs only when `index` is absent from `table`.
    #[must_use]
    pub fn index_missing(table: &str, index: &Index) -> Self {
        Self::IndexMissing {
            table: table.to_string(),
            index: index.name_for(table),
        }
    }

    fn expects_rows(&self) -> bool {
        matches!(self, Self::TableExists(_) | Self::IndexExists { .. })
    }
}

impl Condition for SchemaCondition {
    fn probe(&self, dialect: &dyn Dialect) -> Option<Probe> {
        let probe = match self {
            Self::TableExists(table) | Self::TableMissing(table) => dialect.table_check_sql(table),
            Self::ColumnMissing { table, column } => dialect.column_check_sql(table, column),
            Self::IndexExists { table, index } | Self::IndexMissing { table, index } => {
                dialect.index_check_sql(table, index)
            }
        };
        Some(probe)
    }

    fn is_fulfilled(&self, rows: &[AnyRow]) -> bool {
        rows.is_empty() != self.expects_rows()
    }
}
