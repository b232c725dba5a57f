//! End-to-end migration runs against SQLite.

mod common;
use common::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use sqlx::{AnyConnection, Connection};

use oxygen_migrator::prelude::*;

struct Counted(Arc<AtomicUsize>);

impl CodeMigration for Counted {
    fn exec<'a>(
        &'a self,
        _conn: &'a mut AnyConnection,
        _migrator: &'a Migrator,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Creates a table, then fails.
struct HalfDone;

impl CodeMigration for HalfDone {
    fn sql(&self, _dialect: &dyn Dialect) -> String {
        "create half_done then fail".to_string()
    }

    fn exec<'a>(
        &'a self,
        conn: &'a mut AnyConnection,
        _migrator: &'a Migrator,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query("CREATE TABLE half_done (id INTEGER)")
                .execute(&mut *conn)
                .await?;
            Err(MigrateError::Code("backfill failed".to_string()))
        })
    }
}

/// Re-runs the named migrations on every start.
struct Forget(&'static str);

impl CodeMigration for Forget {
    fn exec<'a>(
        &'a self,
        _conn: &'a mut AnyConnection,
        migrator: &'a Migrator,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            migrator.forget([self.0]);
            Ok(())
        })
    }
}

/// SQLite rendering whose `unlock` inspects the database from a second
/// connection, recording the visible log row count and whether `team` exists.
#[derive(Debug)]
struct UnlockObserver {
    url: String,
    seen: Arc<Mutex<Option<(i64, bool)>>>,
}

impl Dialect for UnlockObserver {
    fn driver_name(&self) -> &'static str {
        SqliteDialect::new().driver_name()
    }

    fn column_type(&self, column: &Column) -> String {
        SqliteDialect::new().column_type(column)
    }

    fn auto_increment_keyword(&self) -> &'static str {
        SqliteDialect::new().auto_increment_keyword()
    }

    fn database_name_sql(&self) -> &'static str {
        SqliteDialect::new().database_name_sql()
    }

    fn table_check_sql(&self, table: &str) -> Probe {
        SqliteDialect::new().table_check_sql(table)
    }

    fn column_check_sql(&self, table: &str, column: &str) -> Probe {
        SqliteDialect::new().column_check_sql(table, column)
    }

    fn index_check_sql(&self, table: &str, index_name: &str) -> Probe {
        SqliteDialect::new().index_check_sql(table, index_name)
    }

    fn unlock<'a>(
        &'a self,
        _conn: &'a mut AnyConnection,
        _cfg: &'a LockConfig,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut other = AnyConnection::connect(&self.url).await?;
            let rows = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM migration_log")
                .fetch_one(&mut other)
                .await
                .unwrap_or(-1);
            let team = self.table_check_sql("team").exists(&mut other).await?;
            *self.seen.lock().unwrap() = Some((rows, team));
            other.close().await?;
            Ok(())
        })
    }
}

fn register_user_migrations(mg: &mut Migrator) {
    let user = user_table();
    mg.add_migration("create user table", Migration::add_table(user.clone()));
    mg.add_migration(
        "add unique index user.login",
        Migration::add_index(&user, Index::unique(["login"])),
    );
    mg.add_migration(
        "add unique index user.email",
        Migration::add_index(&user, Index::unique(["email"])),
    );
}

#[tokio::test]
async fn user_migrations_apply_once() {
    let pool = memory_pool().await;
    let mut mg = migrator(pool.clone());
    register_user_migrations(&mut mg);

    let report = mg.start(false, 0).await.unwrap();
    assert_eq!(report.applied, 4);
    assert!(table_exists(&pool, "user").await);
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM migration_log WHERE success = 1").await,
        4
    );

    let report = mg.start(false, 0).await.unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(report.already_applied, 4);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM migration_log").await, 4);
}

#[tokio::test]
async fn fresh_migrator_sees_previous_run() {
    let pool = memory_pool().await;
    let mut first = migrator(pool.clone());
    register_user_migrations(&mut first);
    first.start(false, 0).await.unwrap();

    let mut second = migrator(pool.clone());
    register_user_migrations(&mut second);
    second.load_log().await.unwrap();
    assert!(second.is_applied("add unique index user.email"));

    let report = second.start(false, 0).await.unwrap();
    assert_eq!(report.applied, 0);
}

#[tokio::test]
async fn duplicate_insert_rejected_by_unique_index() {
    let pool = memory_pool().await;
    let mut mg = migrator(pool.clone());
    register_user_migrations(&mut mg);
    mg.start(false, 0).await.unwrap();

    let insert = "INSERT INTO user (version, login, email) VALUES (0, 'admin', 'a@example.com')";
    sqlx::query(insert).execute(&pool).await.unwrap();
    assert!(sqlx::query(insert).execute(&pool).await.is_err());
}

#[tokio::test]
async fn failure_stops_batch_and_is_logged() {
    let pool = memory_pool().await;
    let mut mg = migrator(pool.clone());
    mg.add_migration(
        "A",
        Migration::add_table(Table::new("a").column(Column::new("id", ColumnType::Int))),
    );
    mg.add_migration(
        "B",
        Migration::raw_sql(RawSql::new("INSERT INTO missing (id) VALUES (1)")),
    );
    mg.add_migration(
        "C",
        Migration::add_table(Table::new("c").column(Column::new("id", ColumnType::Int))),
    );

    let err = mg.start(false, 0).await.unwrap_err();
    assert_eq!(err.migration_id(), Some("B"));
    assert!(err.to_string().starts_with("migration failed (id = B)"));

    assert!(table_exists(&pool, "a").await);
    assert!(!table_exists(&pool, "c").await);
    assert!(mg.is_applied("A"));
    assert!(!mg.is_applied("B"));
    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM migration_log WHERE migration_id = 'B' AND success = 0 AND error <> ''"
        )
        .await,
        1
    );
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM migration_log WHERE migration_id = 'C'").await,
        0
    );
}

#[tokio::test]
async fn failed_migration_rolls_back_its_own_changes() {
    let pool = memory_pool().await;
    let mut mg = migrator(pool.clone());
    mg.add_migration("half done", Migration::code(HalfDone));

    let err = mg.start(false, 0).await.unwrap_err();
    assert_eq!(err.migration_id(), Some("half done"));
    assert!(!table_exists(&pool, "half_done").await);
    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM migration_log WHERE sql = 'create half_done then fail'"
        )
        .await,
        1
    );
}

#[tokio::test]
async fn failed_migration_is_retried_on_next_start() {
    let pool = memory_pool().await;
    let mut mg = migrator(pool.clone());
    mg.add_migration(
        "seed",
        Migration::raw_sql(RawSql::new("INSERT INTO later (id) VALUES (1)")),
    );

    assert!(mg.start(false, 0).await.is_err());

    sqlx::query("CREATE TABLE later (id INTEGER)")
        .execute(&pool)
        .await
        .unwrap();
    let report = mg.start(false, 0).await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM later").await, 1);
}

#[tokio::test]
async fn skip_log_migration_runs_every_time() {
    let pool = memory_pool().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut mg = migrator(pool.clone());
    mg.add_migration(
        "refresh permissions",
        Migration::code(Counted(Arc::clone(&calls))).skip_log(),
    );

    mg.start(false, 0).await.unwrap();
    mg.start(false, 0).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!mg.is_applied("refresh permissions"));
    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM migration_log WHERE migration_id = 'refresh permissions'"
        )
        .await,
        0
    );
}

#[tokio::test]
async fn migrations_run_in_registration_order() {
    let pool = memory_pool().await;
    let mut mg = migrator(pool.clone());
    mg.add_migration(
        "create items",
        Migration::add_table(
            Table::new("items")
                .column(Column::new("id", ColumnType::Int))
                .column(Column::new("label", ColumnType::Text)),
        ),
    );
    for label in ["first", "second", "third"] {
        mg.add_migration(
            format!("insert {label}"),
            Migration::raw_sql(RawSql::new(format!(
                "INSERT INTO items (id, label) VALUES ((SELECT COUNT(*) FROM items), '{label}')"
            ))),
        );
    }

    mg.start(false, 0).await.unwrap();

    let labels: Vec<String> = sqlx::query_scalar("SELECT label FROM items ORDER BY id")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(labels, vec!["first", "second", "third"]);

    let ids: Vec<String> = mg
        .log_entries()
        .into_iter()
        .map(|entry| entry.migration_id)
        .collect();
    assert_eq!(ids, mg.migration_ids(true));
}

#[tokio::test]
async fn condition_skips_existing_column() {
    let pool = memory_pool().await;
    let user = user_table();
    let mut mg = migrator(pool.clone());
    mg.add_migration("create user table", Migration::add_table(user.clone()));
    mg.add_migration(
        "add column user.name again",
        Migration::add_column(&user, Column::new("name", ColumnType::NVarchar).nullable())
            .when(SchemaCondition::column_missing("user", "name")),
    );
    mg.add_migration(
        "add column user.company",
        Migration::add_column(&user, Column::new("company", ColumnType::NVarchar).nullable())
            .when(SchemaCondition::column_missing("user", "company")),
    );

    let report = mg.start(false, 0).await.unwrap();
    assert_eq!(report.applied, 3);
    assert_eq!(report.condition_unmet, 1);
    assert!(mg.is_applied("add column user.company"));
    assert!(!mg.is_applied("add column user.name again"));
}

#[tokio::test]
async fn forget_reruns_migration_in_same_start() {
    let pool = memory_pool().await;
    let mut mg = migrator(pool.clone());
    mg.add_migration(
        "create items",
        Migration::add_table(Table::new("items").column(Column::new("id", ColumnType::Int))),
    );
    mg.add_migration("forget insert", Migration::code(Forget("insert item")).skip_log());
    mg.add_migration(
        "insert item",
        Migration::raw_sql(RawSql::new("INSERT INTO items (id) VALUES (1)")),
    );

    let report = mg.start(false, 0).await.unwrap();
    assert_eq!(report.applied, 4);

    let report = mg.start(false, 0).await.unwrap();
    assert_eq!(report.already_applied, 2);
    assert_eq!(report.applied, 2);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM items").await, 2);
}

#[tokio::test]
async fn closure_code_migration_uses_transaction() {
    let pool = memory_pool().await;
    let mut mg = migrator(pool.clone());
    mg.add_migration(
        "create settings",
        Migration::add_table(
            Table::new("settings")
                .column(Column::new("key", ColumnType::NVarchar).length(50))
                .column(Column::new("value", ColumnType::Text)),
        ),
    );
    mg.add_migration(
        "seed settings",
        Migration::code_fn(|conn, migrator| {
            Box::pin(async move {
                let sql = format!(
                    "INSERT INTO {} ({}, {}) VALUES ('theme', 'dark')",
                    migrator.dialect().quote("settings"),
                    migrator.dialect().quote("key"),
                    migrator.dialect().quote("value"),
                );
                sqlx::query(&sql).execute(&mut *conn).await?;
                Ok::<(), MigrateError>(())
            })
        }),
    );

    mg.start(false, 0).await.unwrap();
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM settings").await, 1);
}

#[tokio::test]
async fn locked_runs_share_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oxygen.db");

    let mut first = migrator(file_pool(&path).await);
    register_user_migrations(&mut first);
    let report = first.start(true, 5).await.unwrap();
    assert_eq!(report.applied, 4);

    let mut second = migrator(file_pool(&path).await);
    register_user_migrations(&mut second);
    let report = second.start(true, 5).await.unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(report.already_applied, 4);
}

#[tokio::test]
async fn lock_is_released_after_batch_commits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oxygen.db");
    let seen = Arc::new(Mutex::new(None));
    let dialect = UnlockObserver {
        url: format!("sqlite://{}?mode=rwc", path.display()),
        seen: Arc::clone(&seen),
    };

    let mut mg = Migrator::new(file_pool(&path).await, Box::new(dialect));
    mg.add_create_migration();
    register_user_migrations(&mut mg);
    mg.register_model(
        Table::new("team")
            .column(Column::new("id", ColumnType::BigInt).primary_key().auto_increment())
            .column(Column::new("name", ColumnType::NVarchar)),
    );

    let report = mg.start(true, 5).await.unwrap();
    assert_eq!(report.applied, 4);
    assert!(report.synced >= 1);

    // migrations, log rows and the model sync are all visible to other
    // sessions by the time the lock is given up
    let seen = *seen.lock().unwrap();
    assert_eq!(seen, Some((4, true)));
}

#[tokio::test]
async fn locked_failure_rolls_back_whole_batch() {
    let pool = memory_pool().await;
    let mut mg = migrator(pool.clone());
    mg.add_migration(
        "A",
        Migration::add_table(Table::new("a").column(Column::new("id", ColumnType::Int))),
    );
    mg.add_migration("B", Migration::code(HalfDone));

    let err = mg.start(true, 1).await.unwrap_err();
    assert_eq!(err.migration_id(), Some("B"));
    assert!(!table_exists(&pool, "a").await);
    assert!(!table_exists(&pool, "half_done").await);
    assert!(!table_exists(&pool, "migration_log").await);
    assert!(!mg.is_applied("A"));

    // the lock is free again
    let err = mg.start(true, 1).await.unwrap_err();
    assert_eq!(err.migration_id(), Some("B"));
}

#[tokio::test]
async fn report_serializes() {
    let mg = migrator(memory_pool().await);
    let report = mg.start(false, 0).await.unwrap();
    let json = serde_json::to_value(report).unwrap();
    assert_eq!(json["applied"], 1);
    assert_eq!(json["already_applied"], 0);
}
