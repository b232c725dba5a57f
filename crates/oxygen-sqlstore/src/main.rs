//! oxygen-migrate CLI
//!
//! Command-line tool for applying the oxygen schema migrations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxygen_sqlstore::{DatabaseConfig, DatabaseType, OxygenMigrations, SqlStore};

/// Versioned schema migrations for oxygen databases.
#[derive(Parser)]
#[command(name = "oxygen-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database backend (postgres, mysql or sqlite3).
    #[arg(short = 't', long, env = "OXYGEN_DB_TYPE", default_value = "sqlite3")]
    database_type: DatabaseType,

    /// Database connection URL.
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:oxygen.db?mode=rwc")]
    database_url: String,

    /// Hold the backend advisory lock while migrating.
    #[arg(long, env = "OXYGEN_MIGRATION_LOCKING")]
    lock: bool,

    /// Seconds to wait for the migration lock.
    #[arg(long, env = "OXYGEN_MIGRATION_LOCK_TIMEOUT", default_value_t = 0)]
    lock_timeout: u64,

    /// Do not run migrations.
    #[arg(long, env = "OXYGEN_SKIP_MIGRATIONS")]
    skip_migrations: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations.
    Migrate,

    /// Show which migrations have been applied.
    Status {
        /// Print the status as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the SQL of every migration without connecting.
    Sql,
}

#[derive(Serialize)]
struct MigrationStatus {
    id: String,
    applied: bool,
    applied_at: Option<DateTime<Utc>>,
}

impl Cli {
    fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            skip_migrations: self.skip_migrations,
            migration_locking: self.lock,
            lock_attempt_timeout_secs: self.lock_timeout,
            ..DatabaseConfig::new(self.database_type, self.database_url.clone())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cfg = cli.database_config();

    match cli.command {
        Commands::Migrate => {
            let store = SqlStore::connect(cfg, OxygenMigrations).await?;
            match store.migrate().await? {
                Some(report) => info!(
                    "Applied {} migration(s), {} already applied, {} skipped by condition.",
                    report.applied, report.already_applied, report.condition_unmet
                ),
                None => info!("Migrations are disabled."),
            }
        }

        Commands::Status { json } => {
            let store = SqlStore::connect(cfg, OxygenMigrations).await?;
            let mg = store.migrator()?;
            mg.load_log().await?;

            let applied: HashMap<String, DateTime<Utc>> = mg
                .log_entries()
                .into_iter()
                .map(|entry| (entry.migration_id, entry.timestamp))
                .collect();
            let statuses: Vec<MigrationStatus> = mg
                .migration_ids(true)
                .into_iter()
                .map(|id| MigrationStatus {
                    applied_at: applied.get(&id).copied(),
                    applied: applied.contains_key(&id),
                    id,
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                println!("\nMigrations ({}):", store.dialect().driver_name());
                println!("{:-<60}", "");
                for status in &statuses {
                    match status.applied_at {
                        Some(at) => {
                            println!(" [X] {} ({})", status.id, at.format("%Y-%m-%d %H:%M:%S"));
                        }
                        None => println!(" [ ] {}", status.id),
                    }
                }
                println!();
            }
        }

        Commands::Sql => {
            let store = SqlStore::connect_lazy(cfg, OxygenMigrations)?;
            let mg = store.migrator()?;
            for migration in mg.migrations() {
                let sql = migration.sql(mg.dialect());
                println!("-- {}", migration.id());
                if sql.is_empty() {
                    println!("-- (code migration)\n");
                } else {
                    println!("{sql};\n");
                }
            }
        }
    }

    Ok(())
}
