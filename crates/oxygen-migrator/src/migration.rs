//! Migration definitions.
//!
//! A [`Migration`] is either a declarative [`SchemaChange`] rendered by the
//! active dialect, or a [`CodeMigration`] running arbitrary logic on the
//! migration's transaction. Either kind may be gated by a [`Condition`]
//! and may opt out of the migration log.

use std::collections::HashMap;
use std::fmt;

use futures::future::BoxFuture;
use sqlx::AnyConnection;
use tracing::debug;

use crate::condition::Condition;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::migrator::Migrator;
use crate::schema::{Column, Index, SchemaError, Table};

/// A migration implemented in Rust code, e.g. a data backfill.
pub trait CodeMigration: Send + Sync {
    /// Describes the migration for the log. Empty by default.
    fn sql(&self, _dialect: &dyn Dialect) -> String {
        String::new()
    }

    /// Runs the migration on the open transaction.
    fn exec<'a>(
        &'a self,
        conn: &'a mut AnyConnection,
        migrator: &'a Migrator,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Adapts an async closure into a [`CodeMigration`].
pub struct CodeFn<F>(F);

impl<F> CodeMigration for CodeFn<F>
where
    F: for<'a> Fn(&'a mut AnyConnection, &'a Migrator) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    fn exec<'a>(
        &'a self,
        conn: &'a mut AnyConnection,
        migrator: &'a Migrator,
    ) -> BoxFuture<'a, Result<()>> {
        (self.0)(conn, migrator)
    }
}

/// Raw SQL with optional per-driver variants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSql {
    default: String,
    per_driver: HashMap<&'static str, String>,
}

impl RawSql {
    /// Creates raw SQL used for every driver without a variant.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            default: sql.into(),
            per_driver: HashMap::new(),
        }
    }

    /// Sets the SQLite variant.
    #[must_use]
    pub fn sqlite(self, sql: impl Into<String>) -> Self {
        self.for_driver(crate::dialect::SQLITE, sql)
    }

    /// Sets the PostgreSQL variant.
    #[must_use]
    pub fn postgres(self, sql: impl Into<String>) -> Self {
        self.for_driver(crate::dialect::POSTGRES, sql)
    }

    /// Sets the MySQL variant.
    #[must_use]
    pub fn mysql(self, sql: impl Into<String>) -> Self {
        self.for_driver(crate::dialect::MYSQL, sql)
    }

    fn for_driver(mut self, driver: &'static str, sql: impl Into<String>) -> Self {
        self.per_driver.insert(driver, sql.into());
        self
    }

    /// Returns the statement for the given dialect.
    #[must_use]
    pub fn sql(&self, dialect: &dyn Dialect) -> String {
        self.per_driver
            .get(dialect.driver_name())
            .unwrap_or(&self.default)
            .clone()
    }
}

/// Declarative schema changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    /// `CREATE TABLE IF NOT EXISTS`.
    CreateTable(Table),
    /// `CREATE [UNIQUE] INDEX`.
    CreateIndex {
        /// Table name.
        table: String,
        /// Index to create.
        index: Index,
    },
    /// `DROP INDEX`.
    DropIndex {
        /// Table name.
        table: String,
        /// Index to drop.
        index: Index,
    },
    /// `ALTER TABLE .. ADD COLUMN`.
    AddColumn {
        /// Table name.
        table: String,
        /// Column to add.
        column: Column,
    },
    /// `DROP TABLE IF EXISTS`.
    DropTable(String),
    /// `ALTER TABLE .. RENAME TO`.
    RenameTable {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Hand-written SQL.
    RawSql(RawSql),
}

impl SchemaChange {
    /// Renders the change for a dialect.
    #[must_use]
    pub fn sql(&self, dialect: &dyn Dialect) -> String {
        match self {
            Self::CreateTable(table) => dialect.create_table_sql(table),
            Self::CreateIndex { table, index } => dialect.create_index_sql(table, index),
            Self::DropIndex { table, index } => dialect.drop_index_sql(table, index),
            Self::AddColumn { table, column } => dialect.add_column_sql(table, column),
            Self::DropTable(table) => dialect.drop_table_sql(table),
            Self::RenameTable { from, to } => dialect.rename_table_sql(from, to),
            Self::RawSql(raw) => raw.sql(dialect),
        }
    }
}

/// The two kinds of migration.
pub enum MigrationKind {
    /// Declarative DDL.
    Schema(SchemaChange),
    /// Arbitrary code.
    Code(Box<dyn CodeMigration>),
}

impl fmt::Debug for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema(change) => f.debug_tuple("Schema").field(change).finish(),
            Self::Code(_) => f.write_str("Code(..)"),
        }
    }
}

/// One versioned, uniquely identified change.
#[derive(Debug)]
pub struct Migration {
    id: String,
    kind: MigrationKind,
    condition: Option<Box<dyn Condition>>,
    skip_log: bool,
}

impl Migration {
    /// Creates a declarative migration.
    #[must_use]
    pub fn schema(change: SchemaChange) -> Self {
        Self::with_kind(MigrationKind::Schema(change))
    }

    /// Creates a code migration.
    #[must_use]
    pub fn code(migration: impl CodeMigration + 'static) -> Self {
        Self::with_kind(MigrationKind::Code(Box::new(migration)))
    }

    /// Creates a code migration from an async closure.
    #[must_use]
    pub fn code_fn<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut AnyConnection, &'a Migrator) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self::code(CodeFn(f))
    }

    fn with_kind(kind: MigrationKind) -> Self {
        Self {
            id: String::new(),
            kind,
            condition: None,
            skip_log: false,
        }
    }

    /// Creates a table.
    #[must_use]
    pub fn add_table(table: Table) -> Self {
        Self::schema(SchemaChange::CreateTable(table))
    }

    /// Creates an index on a table.
    #[must_use]
    pub fn add_index(table: &Table, index: Index) -> Self {
        Self::schema(SchemaChange::CreateIndex {
            table: table.name.clone(),
            index,
        })
    }

    /// Drops an index from a table.
    #[must_use]
    pub fn drop_index(table: &Table, index: Index) -> Self {
        Self::schema(SchemaChange::DropIndex {
            table: table.name.clone(),
            index,
        })
    }

    /// Adds a column to a table.
    #[must_use]
    pub fn add_column(table: &Table, column: Column) -> Self {
        Self::schema(SchemaChange::AddColumn {
            table: table.name.clone(),
            column,
        })
    }

    /// Drops a table.
    #[must_use]
    pub fn drop_table(name: impl Into<String>) -> Self {
        Self::schema(SchemaChange::DropTable(name.into()))
    }

    /// Renames a table.
    #[must_use]
    pub fn rename_table(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::schema(SchemaChange::RenameTable {
            from: from.into(),
            to: to.into(),
        })
    }

    /// Runs hand-written SQL.
    #[must_use]
    pub fn raw_sql(sql: RawSql) -> Self {
        Self::schema(SchemaChange::RawSql(sql))
    }

    /// Gates the migration on a condition.
    #[must_use]
    pub fn when(mut self, condition: impl Condition + 'static) -> Self {
        self.condition = Some(Box::new(condition));
        self
    }

    /// Runs the migration on every start without recording it.
    #[must_use]
    pub fn skip_log(mut self) -> Self {
        self.skip_log = true;
        self
    }

    /// Returns the id assigned at registration.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    /// Returns the migration kind.
    #[must_use]
    pub fn kind(&self) -> &MigrationKind {
        &self.kind
    }

    /// Returns the guard condition, if any.
    #[must_use]
    pub fn condition(&self) -> Option<&dyn Condition> {
        self.condition.as_deref()
    }

    /// Returns whether the migration stays out of the log.
    #[must_use]
    pub fn skips_log(&self) -> bool {
        self.skip_log
    }

    /// Renders the SQL recorded in the log.
    #[must_use]
    pub fn sql(&self, dialect: &dyn Dialect) -> String {
        match &self.kind {
            MigrationKind::Schema(change) => change.sql(dialect),
            MigrationKind::Code(code) => code.sql(dialect),
        }
    }

    /// Checks descriptor invariants of the change.
    pub fn validate(&self) -> std::result::Result<(), SchemaError> {
        match &self.kind {
            MigrationKind::Schema(SchemaChange::CreateTable(table)) => table.validate(),
            _ => Ok(()),
        }
    }

    pub(crate) async fn exec(&self, conn: &mut AnyConnection, migrator: &Migrator) -> Result<()> {
        match &self.kind {
            MigrationKind::Schema(change) => {
                let sql = change.sql(migrator.dialect());
                debug!(id = %self.id, sql = %sql, "Executing SQL");
                sqlx::raw_sql(&sql).execute(&mut *conn).await?;
                Ok(())
            }
            MigrationKind::Code(code) => code.exec(conn, migrator).await,
        }
    }
}
