//! Built-in migration sets.

mod user;

use oxygen_migrator::Migrator;

pub use user::user_table_v1;

/// A set of migrations registered on a [`Migrator`] before it starts.
pub trait DatabaseMigrations: Send + Sync {
    /// Registers the set's migrations in execution order.
    fn add_migrations(&self, mg: &mut Migrator);
}

/// The migrations every oxygen database starts from.
#[derive(Debug, Clone, Copy, Default)]
pub struct OxygenMigrations;

impl DatabaseMigrations for OxygenMigrations {
    fn add_migrations(&self, mg: &mut Migrator) {
        mg.add_create_migration();
        user::add_user_migrations(mg);
    }
}
