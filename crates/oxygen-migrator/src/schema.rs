//! Schema descriptor types.
//!
//! These types describe tables the way migrations declare them. They carry
//! no behavior of their own; a [`Dialect`](crate::dialect::Dialect) turns
//! them into backend-specific DDL.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Logical column types understood by every dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    BigInt,
    /// Variable-length string.
    Varchar,
    /// Variable-length unicode string.
    NVarchar,
    /// Fixed-length string.
    Char,
    /// Unbounded text.
    Text,
    /// Medium text (MySQL distinguishes it from TEXT).
    MediumText,
    /// Long text.
    LongText,
    /// Boolean.
    Bool,
    /// Date and time.
    DateTime,
    /// Date only.
    Date,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Binary large object.
    Blob,
}

impl ColumnType {
    /// Returns whether the type takes a length argument.
    #[must_use]
    pub fn has_length(&self) -> bool {
        matches!(self, Self::Varchar | Self::NVarchar | Self::Char)
    }
}

/// Length used for string columns declared without one.
pub const DEFAULT_VARCHAR_LENGTH: u32 = 255;

/// A column descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Logical type.
    pub column_type: ColumnType,
    /// Length for sized string types; `0` means the dialect default.
    pub length: u32,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether this column is the primary key.
    pub is_primary_key: bool,
    /// Whether this column auto-increments.
    pub is_auto_increment: bool,
    /// Raw SQL default expression.
    pub default: Option<String>,
}

impl Column {
    /// Creates a new NOT NULL column.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: 0,
            nullable: false,
            is_primary_key: false,
            is_auto_increment: false,
            default: None,
        }
    }

    /// Sets the length of a sized string column.
    #[must_use]
    pub fn length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    /// Allows NULL values.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Marks the column as primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    /// Marks the column as auto-incrementing.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.is_auto_increment = true;
        self
    }

    /// Sets a raw SQL default expression.
    #[must_use]
    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Returns the declared length, falling back to the dialect default.
    #[must_use]
    pub fn effective_length(&self) -> u32 {
        if self.length == 0 {
            DEFAULT_VARCHAR_LENGTH
        } else {
            self.length
        }
    }
}

/// Kind of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IndexKind {
    /// Plain index.
    #[default]
    Normal,
    /// Unique index.
    Unique,
}

/// An index descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Explicit name; derived from the table and columns when absent.
    pub name: Option<String>,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Index kind.
    pub kind: IndexKind,
}

impl Index {
    /// Creates a plain index.
    #[must_use]
    pub fn normal<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            kind: IndexKind::Normal,
        }
    }

    /// Creates a unique index.
    #[must_use]
    pub fn unique<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: IndexKind::Unique,
            ..Self::normal(columns)
        }
    }

    /// Sets an explicit index name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns whether this is a unique index.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.kind == IndexKind::Unique
    }

    /// Returns the index name used in DDL for the given table.
    ///
    /// Unnamed indices are called `IDX_<table>_<cols>` or `UQE_<table>_<cols>`.
    #[must_use]
    pub fn name_for(&self, table: &str) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let prefix = match self.kind {
            IndexKind::Normal => "IDX",
            IndexKind::Unique => "UQE",
        };
        format!("{}_{}_{}", prefix, table, self.columns.join("_"))
    }
}

/// Violations of the table descriptor invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Two columns share a name.
    #[error("table '{table}' declares column '{column}' more than once")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Repeated column name.
        column: String,
    },

    /// More than one auto-increment primary key.
    #[error("table '{0}' has more than one auto-increment primary key")]
    MultipleAutoIncrement(String),

    /// An index references a column that does not exist.
    #[error("index on table '{table}' references unknown column '{column}'")]
    UnknownIndexColumn {
        /// Table name.
        table: String,
        /// Missing column name.
        column: String,
    },
}

/// A table descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Indices created alongside the table.
    pub indices: Vec<Index>,
}

impl Table {
    /// Creates an empty table descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indices.push(index);
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the primary key columns in declaration order.
    pub fn primary_keys(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }

    /// Checks the descriptor invariants.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        let auto_pks = self
            .columns
            .iter()
            .filter(|c| c.is_primary_key && c.is_auto_increment)
            .count();
        if auto_pks > 1 {
            return Err(SchemaError::MultipleAutoIncrement(self.name.clone()));
        }

        for index in &self.indices {
            if let Some(missing) = index.columns.iter().find(|c| !seen.contains(c.as_str())) {
                return Err(SchemaError::UnknownIndexColumn {
                    table: self.name.clone(),
                    column: missing.clone(),
                });
            }
        }

        Ok(())
    }
}
