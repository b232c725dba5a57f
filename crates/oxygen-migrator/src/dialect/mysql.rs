//! MySQL dialect.

use futures::future::BoxFuture;
use sqlx::any::Any;
use sqlx::AnyConnection;

use crate::error::{MigrateError, Result};
use crate::lock::LockConfig;
use crate::schema::{Column, ColumnType, Index};

use super::{Dialect, Probe, MYSQL};

/// MySQL migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn driver_name(&self) -> &'static str {
        MYSQL
    }

    fn column_type(&self, column: &Column) -> String {
        match column.column_type {
            ColumnType::Int => "INT".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Varchar | ColumnType::NVarchar => {
                format!("VARCHAR({})", column.effective_length())
            }
            ColumnType::Char => format!("CHAR({})", column.effective_length()),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::MediumText => "MEDIUMTEXT".to_string(),
            ColumnType::LongText => "LONGTEXT".to_string(),
            ColumnType::Bool => "TINYINT(1)".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::Blob => "BLOB".to_string(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTO_INCREMENT"
    }

    fn database_name_sql(&self) -> &'static str {
        "SELECT DATABASE()"
    }

    fn table_check_sql(&self, table: &str) -> Probe {
        Probe::new(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ?",
        )
        .arg(table)
    }

    fn column_check_sql(&self, table: &str, column: &str) -> Probe {
        Probe::new(
            "SELECT 1 FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? AND column_name = ?",
        )
        .arg(table)
        .arg(column)
    }

    fn index_check_sql(&self, table: &str, index_name: &str) -> Probe {
        Probe::new(
            "SELECT 1 FROM information_schema.statistics \
             WHERE table_schema = DATABASE() AND table_name = ? AND index_name = ?",
        )
        .arg(table)
        .arg(index_name)
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn timestamp_as_text(&self, expr: &str) -> String {
        format!("CAST({expr} AS CHAR)")
    }

    fn returning_clause(&self, _column: &str) -> Option<String> {
        None
    }

    fn table_options(&self) -> &'static str {
        "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"
    }

    fn drop_index_sql(&self, table: &str, index: &Index) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote(&index.name_for(table)),
            self.quote(table)
        )
    }

    fn lock<'a>(
        &'a self,
        conn: &'a mut AnyConnection,
        cfg: &'a LockConfig,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let timeout = i64::try_from(cfg.timeout.as_secs()).unwrap_or(i64::MAX);
            // 1 = acquired, 0 = timed out, NULL = error
            let acquired = sqlx::query_scalar::<Any, Option<i64>>("SELECT GET_LOCK(?, ?)")
                .bind(cfg.key.to_string())
                .bind(timeout)
                .fetch_one(&mut *conn)
                .await?;
            match acquired {
                Some(1) => Ok(()),
                _ => Err(MigrateError::LockTimeout {
                    key: cfg.key,
                    timeout_secs: cfg.timeout.as_secs(),
                }),
            }
        })
    }

    fn unlock<'a>(
        &'a self,
        conn: &'a mut AnyConnection,
        cfg: &'a LockConfig,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let released = sqlx::query_scalar::<Any, Option<i64>>("SELECT RELEASE_LOCK(?)")
                .bind(cfg.key.to_string())
                .fetch_one(&mut *conn)
                .await?;
            match released {
                Some(1) => Ok(()),
                _ => Err(MigrateError::LockRelease { key: cfg.key }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Table;

    fn dialect() -> MysqlDialect {
        MysqlDialect::new()
    }

    #[test]
    fn test_create_table() {
        let table = Table::new("user")
            .column(
                Column::new("id", ColumnType::BigInt)
                    .primary_key()
                    .auto_increment(),
            )
            .column(Column::new("email", ColumnType::NVarchar).length(190))
            .column(Column::new("is_admin", ColumnType::Bool));

        let sql = dialect().create_table_sql(&table);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS `user` (\n  \
             `id` BIGINT PRIMARY KEY AUTO_INCREMENT,\n  \
             `email` VARCHAR(190) NOT NULL,\n  \
             `is_admin` TINYINT(1) NOT NULL\n) \
             ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"
        );
    }

    #[test]
    fn test_quote_uses_backticks() {
        assert_eq!(dialect().quote("sql"), "`sql`");
        assert_eq!(dialect().quote("a`b"), "`a``b`");
    }

    #[test]
    fn test_drop_index_names_table() {
        assert_eq!(
            dialect().drop_index_sql("user", &Index::unique(["login"])),
            "DROP INDEX `UQE_user_login` ON `user`"
        );
    }

    #[test]
    fn test_text_types() {
        let d = dialect();
        assert_eq!(d.column_type(&Column::new("a", ColumnType::MediumText)), "MEDIUMTEXT");
        assert_eq!(d.column_type(&Column::new("a", ColumnType::LongText)), "LONGTEXT");
        assert_eq!(d.timestamp_as_text("`timestamp`"), "CAST(`timestamp` AS CHAR)");
    }

    #[test]
    fn test_insert_id_comes_from_result() {
        assert!(dialect().returning_clause("id").is_none());
    }
}
