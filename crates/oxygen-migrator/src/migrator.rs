//! The migration orchestrator.
//!
//! A [`Migrator`] owns the ordered migration registry, the in-memory view of
//! the migration log and the lock manager. [`Migrator::start`] applies every
//! pending migration in registration order, each inside its own transaction,
//! and stops at the first failure.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::any::Any;
use sqlx::pool::PoolConnection;
use sqlx::{AnyConnection, AnyPool, Connection};
use tracing::{debug, error, info, warn};

use crate::condition;
use crate::dialect::{self, Dialect};
use crate::error::{MigrateError, Result};
use crate::lock::{LockConfig, LockManager};
use crate::log::{self, MigrationLog, DEFAULT_LOG_TABLE};
use crate::migration::Migration;
use crate::schema::Table;
use crate::sync;

/// Counts describing a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Migrations executed and committed by this run.
    pub applied: usize,
    /// Migrations skipped because the log already records them.
    pub already_applied: usize,
    /// Migrations skipped because their condition did not hold.
    pub condition_unmet: usize,
    /// Statements executed by the final schema sync.
    pub synced: usize,
}

enum Outcome {
    Applied(Option<MigrationLog>),
    ConditionUnmet,
}

/// Applies registered migrations to one database.
pub struct Migrator {
    pool: AnyPool,
    dialect: Box<dyn Dialect>,
    migrations: Vec<Migration>,
    ids: HashSet<String>,
    models: Vec<Table>,
    lock: LockManager,
    log: Mutex<HashMap<String, MigrationLog>>,
    table_name: String,
}

impl Migrator {
    /// Creates a migrator logging to `migration_log`.
    #[must_use]
    pub fn new(pool: AnyPool, dialect: Box<dyn Dialect>) -> Self {
        Self {
            pool,
            dialect,
            migrations: Vec::new(),
            ids: HashSet::new(),
            models: Vec::new(),
            lock: LockManager::new(),
            log: Mutex::new(HashMap::new()),
            table_name: DEFAULT_LOG_TABLE.to_string(),
        }
    }

    /// Creates a migrator for a driver name.
    pub fn from_driver(pool: AnyPool, driver: &str) -> Result<Self> {
        Ok(Self::new(pool, dialect::for_driver(driver)?))
    }

    /// Keeps the log in `<scope>_migration_log` instead.
    #[must_use]
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.table_name = format!("{scope}_{DEFAULT_LOG_TABLE}");
        self
    }

    /// Registers the migration creating the log table.
    ///
    /// Conventionally the first migration of every migrator.
    pub fn add_create_migration(&mut self) {
        let id = format!("create {} table", self.table_name);
        let table = log::log_table(&self.table_name);
        self.add_migration(id, Migration::add_table(table));
    }

    /// Registers a migration under `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already registered or the migration creates a table
    /// that violates its invariants.
    pub fn add_migration(&mut self, id: impl Into<String>, mut migration: Migration) {
        let id = id.into();
        if let Err(err) = migration.validate() {
            panic!("invalid migration {id:?}: {err}");
        }
        assert!(
            self.ids.insert(id.clone()),
            "migration id is not unique: {id:?}"
        );
        migration.set_id(id);
        self.migrations.push(migration);
    }

    /// Registers a table for the final schema sync.
    ///
    /// # Panics
    ///
    /// Panics if the table violates its invariants.
    pub fn register_model(&mut self, table: Table) {
        if let Err(err) = table.validate() {
            panic!("invalid model {:?}: {err}", table.name);
        }
        self.models.push(table);
    }

    /// Returns the active dialect.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Returns the pool migrations run against.
    #[must_use]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Returns the log table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the registered migrations in execution order.
    #[must_use]
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Returns registered ids in order, optionally without `skip_log` ones.
    #[must_use]
    pub fn migration_ids(&self, exclude_not_logged: bool) -> Vec<String> {
        self.migrations
            .iter()
            .filter(|m| !(exclude_not_logged && m.skips_log()))
            .map(|m| m.id().to_string())
            .collect()
    }

    /// Returns the number of registered migrations.
    #[must_use]
    pub fn migrations_count(&self) -> usize {
        self.migrations.len()
    }

    /// Returns whether the last loaded log records `id` as applied.
    #[must_use]
    pub fn is_applied(&self, id: &str) -> bool {
        self.cache().contains_key(id)
    }

    /// Returns the cached successful log entries in the order they were
    /// recorded.
    #[must_use]
    pub fn log_entries(&self) -> Vec<MigrationLog> {
        let mut entries: Vec<_> = self.cache().values().cloned().collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        entries
    }

    /// Drops ids from the in-memory log so they run again in this run.
    ///
    /// Rows already persisted are left untouched.
    pub fn forget<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cache = self.cache();
        for id in ids {
            if cache.remove(id.as_ref()).is_some() {
                debug!(id = %id.as_ref(), "Forgot migration");
            }
        }
    }

    /// Loads the log into memory without running anything.
    pub async fn load_log(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let entries = log::load(self.dialect(), &mut conn, &self.table_name).await?;
        *self.cache() = entries;
        Ok(())
    }

    /// Runs every pending migration, then syncs registered models.
    ///
    /// With `locking`, the batch and the sync run inside one transaction
    /// while the backend advisory lock is held, waiting at most
    /// `lock_timeout_secs` for it. The lock is released only after that
    /// transaction has committed or rolled back.
    pub async fn start(&self, locking: bool, lock_timeout_secs: u64) -> Result<MigrationReport> {
        let started = Instant::now();
        info!(
            migrations = self.migrations.len(),
            locking, "Starting migrations"
        );

        let mut conn = self.pool.acquire().await?;
        let report = if locking {
            self.run_locked(conn, Duration::from_secs(lock_timeout_secs))
                .await?
        } else {
            self.run_and_sync(&mut conn).await?
        };

        info!(
            applied = report.applied,
            skipped = report.already_applied,
            unmet = report.condition_unmet,
            synced = report.synced,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Migrations complete"
        );
        Ok(report)
    }

    async fn run_locked(
        &self,
        mut conn: PoolConnection<Any>,
        timeout: Duration,
    ) -> Result<MigrationReport> {
        let database = sqlx::query_scalar::<Any, Option<String>>(self.dialect.database_name_sql())
            .fetch_one(&mut *conn)
            .await?
            .unwrap_or_default();
        let cfg = LockConfig::for_database(&database, timeout);
        debug!(key = cfg.key, database = %database, "Acquiring migration lock");

        let mut tx = conn.begin().await?;
        self.lock.acquire(self.dialect(), &mut tx, &cfg).await?;

        let outcome = match self.run_and_sync(&mut tx).await {
            Ok(report) => tx.commit().await.map(|()| report).map_err(MigrateError::from),
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback of locked batch failed");
                }
                Err(err)
            }
        };

        if outcome.is_err() {
            // the cache still lists migrations that were just rolled back
            match log::load(self.dialect(), &mut conn, &self.table_name).await {
                Ok(entries) => *self.cache() = entries,
                Err(load_err) => {
                    warn!(error = %load_err, "Failed to reload migration log");
                    self.cache().clear();
                }
            }
        }

        // session-scoped advisory locks outlive the transaction
        if let Err(err) = self.lock.release(self.dialect(), &mut conn, &cfg).await {
            warn!(
                key = cfg.key,
                error = %err,
                "Failed to release migration lock, closing connection"
            );
            // ending the session drops the lock with it
            if let Err(close_err) = conn.detach().close().await {
                warn!(error = %close_err, "Failed to close locked connection");
            }
        }

        outcome
    }

    async fn run_and_sync(&self, conn: &mut AnyConnection) -> Result<MigrationReport> {
        let mut report = self.run(conn).await?;
        if !self.models.is_empty() {
            report.synced = sync::sync_tables(self.dialect(), conn, &self.models).await?;
        }
        Ok(report)
    }

    async fn run(&self, conn: &mut AnyConnection) -> Result<MigrationReport> {
        let entries = log::load(self.dialect(), conn, &self.table_name).await?;
        *self.cache() = entries;

        let mut report = MigrationReport::default();
        for migration in &self.migrations {
            let id = migration.id();
            if !migration.skips_log() && self.is_applied(id) {
                debug!(id = %id, "Skipping migration: already applied");
                report.already_applied += 1;
                continue;
            }

            match self.run_migration(migration, conn).await {
                Ok(true) => report.applied += 1,
                Ok(false) => report.condition_unmet += 1,
                Err(err) => {
                    error!(id = %id, error = %err, "Migration failed");
                    self.record_failure(migration, conn, &err).await;
                    return Err(MigrateError::MigrationFailed {
                        id: id.to_string(),
                        source: Box::new(err),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Runs one migration in its own transaction.
    ///
    /// Returns `false` when its condition did not hold.
    async fn run_migration(&self, migration: &Migration, conn: &mut AnyConnection) -> Result<bool> {
        let mut tx = conn.begin().await?;

        let outcome = match self.apply(migration, &mut tx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(id = %migration.id(), error = %rollback, "Rollback failed");
                }
                return Err(err);
            }
        };

        match outcome {
            Outcome::ConditionUnmet => {
                tx.rollback().await?;
                Ok(false)
            }
            Outcome::Applied(entry) => {
                tx.commit().await?;
                if let Some(entry) = entry {
                    self.cache().insert(entry.migration_id.clone(), entry);
                }
                Ok(true)
            }
        }
    }

    async fn apply(&self, migration: &Migration, conn: &mut AnyConnection) -> Result<Outcome> {
        let id = migration.id();

        if let Some(condition) = migration.condition() {
            if !condition::evaluate(condition, self.dialect(), conn).await? {
                debug!(id = %id, "Skipping migration: condition not fulfilled");
                return Ok(Outcome::ConditionUnmet);
            }
        }

        info!(id = %id, "Executing migration");
        migration.exec(conn, self).await?;

        if migration.skips_log() {
            return Ok(Outcome::Applied(None));
        }

        let mut entry = MigrationLog::success(id, migration.sql(self.dialect()));
        if let Some(row_id) = log::append(self.dialect(), conn, &self.table_name, &entry).await? {
            entry.id = row_id;
        }
        Ok(Outcome::Applied(Some(entry)))
    }

    /// Records a failed attempt in its own transaction.
    ///
    /// A failure to write the row is only logged so it never hides the
    /// migration's own error.
    async fn record_failure(&self, migration: &Migration, conn: &mut AnyConnection, cause: &MigrateError) {
        if migration.skips_log() {
            return;
        }

        let entry = MigrationLog::failure(
            migration.id(),
            migration.sql(self.dialect()),
            cause.to_string(),
        );
        let written = async {
            let mut tx = conn.begin().await?;
            log::append(self.dialect(), &mut tx, &self.table_name, &entry).await?;
            tx.commit().await?;
            Ok::<(), MigrateError>(())
        }
        .await;

        if let Err(err) = written {
            warn!(id = %migration.id(), error = %err, "Failed to record migration failure");
        }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, MigrationLog>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("dialect", &self.dialect)
            .field("migrations", &self.migrations.len())
            .field("table_name", &self.table_name)
            .field("locked", &self.lock.is_locked())
            .finish_non_exhaustive()
    }
}
