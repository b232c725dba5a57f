//! Final schema sync.
//!
//! After the migration batch, registered model tables are compared with the
//! live database: missing tables, columns and indices are created. Nothing is
//! ever dropped or altered.

use sqlx::AnyConnection;
use tracing::{debug, info};

use crate::dialect::Dialect;
use crate::error::Result;
use crate::schema::Table;

/// Brings the live schema up to the given tables.
///
/// Returns the number of statements executed.
pub async fn sync_tables(
    dialect: &dyn Dialect,
    conn: &mut AnyConnection,
    tables: &[Table],
) -> Result<usize> {
    let mut executed = 0;

    for table in tables {
        let mut statements = Vec::new();

        if dialect.table_check_sql(&table.name).exists(conn).await? {
            for column in &table.columns {
                if !dialect
                    .column_check_sql(&table.name, &column.name)
                    .exists(conn)
                    .await?
                {
                    statements.push(dialect.add_column_sql(&table.name, column));
                }
            }
            for index in &table.indices {
                let name = index.name_for(&table.name);
                if !dialect.index_check_sql(&table.name, &name).exists(conn).await? {
                    statements.push(dialect.create_index_sql(&table.name, index));
                }
            }
        } else {
            statements.push(dialect.create_table_sql(table));
            statements.extend(
                table
                    .indices
                    .iter()
                    .map(|index| dialect.create_index_sql(&table.name, index)),
            );
        }

        for sql in &statements {
            debug!(table = %table.name, sql = %sql, "Syncing schema");
            sqlx::raw_sql(sql).execute(&mut *conn).await?;
        }
        if !statements.is_empty() {
            info!(table = %table.name, statements = statements.len(), "Synced table");
        }
        executed += statements.len();
    }

    Ok(executed)
}
