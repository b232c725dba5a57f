//! Connection pool, dialect selection and migration entry point.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use oxygen_migrator::dialect::{self, Dialect};
use oxygen_migrator::{MigrationReport, Migrator};
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::{AnyConnection, AnyPool};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{Result, StoreError};
use crate::migrations::DatabaseMigrations;
use crate::session;

/// The data-access entry point.
pub struct SqlStore {
    cfg: DatabaseConfig,
    pool: AnyPool,
    dialect: Box<dyn Dialect>,
    migrations: Box<dyn DatabaseMigrations>,
}

impl SqlStore {
    /// Validates `cfg` and connects the pool.
    pub async fn connect(
        cfg: DatabaseConfig,
        migrations: impl DatabaseMigrations + 'static,
    ) -> Result<Self> {
        cfg.validate()?;
        install_default_drivers();

        info!(db_type = %cfg.db_type, max_open_conn = cfg.max_open_conn, "Connecting to database");
        let pool = pool_options(&cfg).connect(&cfg.url).await?;

        Self::with_pool(cfg, pool, migrations)
    }

    /// Validates `cfg` and creates a pool that connects on first use.
    pub fn connect_lazy(
        cfg: DatabaseConfig,
        migrations: impl DatabaseMigrations + 'static,
    ) -> Result<Self> {
        cfg.validate()?;
        install_default_drivers();

        let pool = pool_options(&cfg).connect_lazy(&cfg.url)?;
        Self::with_pool(cfg, pool, migrations)
    }

    /// Wraps an existing pool.
    pub fn with_pool(
        cfg: DatabaseConfig,
        pool: AnyPool,
        migrations: impl DatabaseMigrations + 'static,
    ) -> Result<Self> {
        let dialect = dialect::for_driver(cfg.db_type.driver_name())?;
        Ok(Self {
            cfg,
            pool,
            dialect,
            migrations: Box::new(migrations),
        })
    }

    /// Returns the configuration the store was built from.
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.cfg
    }

    /// Returns the connection pool.
    #[must_use]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Returns the dialect of the configured backend.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Quotes an identifier for the configured backend.
    #[must_use]
    pub fn quote(&self, ident: &str) -> String {
        self.dialect.quote(ident)
    }

    /// Builds a migrator with every registered migration.
    pub fn migrator(&self) -> Result<Migrator> {
        let mut mg = Migrator::from_driver(self.pool.clone(), self.cfg.db_type.driver_name())?;
        self.migrations.add_migrations(&mut mg);
        Ok(mg)
    }

    /// Runs the registered migrations.
    ///
    /// Returns `None` when migrations are disabled in the configuration.
    pub async fn migrate(&self) -> Result<Option<MigrationReport>> {
        if self.cfg.skip_migrations {
            info!("Skipping migrations");
            return Ok(None);
        }

        let mg = self.migrator()?;
        let report = mg
            .start(self.cfg.migration_locking, self.cfg.lock_attempt_timeout_secs)
            .await?;
        Ok(Some(report))
    }

    /// Runs `f` on a fresh connection from the pool.
    pub async fn with_new_session<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, Result<T>>,
    {
        session::with_new_session::<_, _, StoreError>(&self.pool, f).await
    }

    /// Runs `f` on a fresh connection inside a transaction.
    pub async fn in_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, Result<T>>,
    {
        let mut conn = self.pool.acquire().await?;
        session::in_transaction(&mut conn, f).await
    }
}

impl fmt::Debug for SqlStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlStore")
            .field("db_type", &self.cfg.db_type)
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

fn pool_options(cfg: &DatabaseConfig) -> AnyPoolOptions {
    AnyPoolOptions::new()
        .max_connections(cfg.max_open_conn)
        .max_lifetime(Duration::from_secs(cfg.conn_max_lifetime_secs))
}
