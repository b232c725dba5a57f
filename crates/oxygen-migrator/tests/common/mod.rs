//! Shared helpers for migrator integration tests.

#![allow(dead_code)]

use std::path::Path;

use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;

use oxygen_migrator::prelude::*;

pub async fn memory_pool() -> AnyPool {
    install_default_drivers();
    AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

pub async fn file_pool(path: &Path) -> AnyPool {
    install_default_drivers();
    AnyPoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite://{}?mode=rwc", path.display()))
        .await
        .expect("Failed to open SQLite file")
}

pub fn migrator(pool: AnyPool) -> Migrator {
    let mut mg = Migrator::new(pool, Box::new(SqliteDialect::new()));
    mg.add_create_migration();
    mg
}

pub fn user_table() -> Table {
    Table::new("user")
        .column(
            Column::new("id", ColumnType::BigInt)
                .primary_key()
                .auto_increment(),
        )
        .column(Column::new("version", ColumnType::Int))
        .column(Column::new("login", ColumnType::NVarchar).length(190))
        .column(Column::new("email", ColumnType::NVarchar).length(190))
        .column(Column::new("name", ColumnType::NVarchar).nullable())
}

pub async fn table_exists(pool: &AnyPool, table: &str) -> bool {
    let mut conn = pool.acquire().await.unwrap();
    let exists = SqliteDialect::new()
        .table_check_sql(table)
        .exists(&mut conn)
        .await
        .unwrap();
    exists
}

pub async fn count(pool: &AnyPool, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql)
        .fetch_one(pool)
        .await
        .unwrap()
}
