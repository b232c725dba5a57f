//! Database configuration.

use std::fmt;
use std::str::FromStr;

use oxygen_migrator::dialect::{MYSQL, POSTGRES, SQLITE};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DatabaseType {
    /// PostgreSQL
    #[serde(rename = "postgres", alias = "postgresql")]
    Postgres,
    /// MySQL
    #[serde(rename = "mysql")]
    Mysql,
    /// SQLite (default)
    #[default]
    #[serde(rename = "sqlite3", alias = "sqlite")]
    Sqlite,
}

impl DatabaseType {
    /// Returns the driver name the migrator's dialect is selected by.
    #[must_use]
    pub const fn driver_name(self) -> &'static str {
        match self {
            Self::Postgres => POSTGRES,
            Self::Mysql => MYSQL,
            Self::Sqlite => SQLITE,
        }
    }

    fn url_schemes(self) -> &'static [&'static str] {
        match self {
            Self::Postgres => &["postgres:", "postgresql:"],
            Self::Mysql => &["mysql:", "mariadb:"],
            Self::Sqlite => &["sqlite:"],
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver_name())
    }
}

impl FromStr for DatabaseType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            "sqlite3" | "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::UnsupportedDatabase(other.to_string())),
        }
    }
}

/// Database connection and migration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Backend type.
    #[serde(rename = "type", default)]
    pub db_type: DatabaseType,

    /// Connection URL.
    #[serde(default = "default_url")]
    pub url: String,

    /// Skip the migration run entirely.
    #[serde(default)]
    pub skip_migrations: bool,

    /// Serialize migration runs with the backend advisory lock.
    #[serde(default)]
    pub migration_locking: bool,

    /// Seconds to wait for the migration lock.
    #[serde(default)]
    pub lock_attempt_timeout_secs: u64,

    /// Maximum pooled connections.
    #[serde(default = "default_max_open_conn")]
    pub max_open_conn: u32,

    /// Seconds before a pooled connection is recycled.
    #[serde(default = "default_conn_max_lifetime")]
    pub conn_max_lifetime_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DatabaseType::default(),
            url: default_url(),
            skip_migrations: false,
            migration_locking: false,
            lock_attempt_timeout_secs: 0,
            max_open_conn: default_max_open_conn(),
            conn_max_lifetime_secs: default_conn_max_lifetime(),
        }
    }
}

impl DatabaseConfig {
    /// Creates a configuration for a backend and URL with default settings.
    #[must_use]
    pub fn new(db_type: DatabaseType, url: impl Into<String>) -> Self {
        Self {
            db_type,
            url: url.into(),
            ..Self::default()
        }
    }

    /// Checks the settings without connecting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if !self
            .db_type
            .url_schemes()
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
        {
            return Err(ConfigError::UrlMismatch {
                db_type: self.db_type.to_string(),
                url: self.url.clone(),
            });
        }
        if self.max_open_conn == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }
        Ok(())
    }
}

fn default_url() -> String {
    "sqlite:oxygen.db?mode=rwc".to_string()
}

fn default_max_open_conn() -> u32 {
    10
}

fn default_conn_max_lifetime() -> u64 {
    14400
}
