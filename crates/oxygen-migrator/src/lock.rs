//! Migration lock management.
//!
//! A [`LockManager`] pairs an in-process flag with the dialect's advisory
//! lock. The flag moves between two states by compare-and-swap and is
//! restored when the backend call fails, so a second acquire in the same
//! process never reaches the database.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sha2::{Digest, Sha256};
use sqlx::AnyConnection;

use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};

/// Parameters handed to [`Dialect::lock`] and [`Dialect::unlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Advisory lock key.
    pub key: i64,
    /// How long to wait for the lock.
    pub timeout: Duration,
}

impl LockConfig {
    /// Creates a lock configuration for the given database name.
    #[must_use]
    pub fn for_database(database: &str, timeout: Duration) -> Self {
        Self {
            key: advisory_lock_key(database),
            timeout,
        }
    }
}

/// Derives the advisory lock key for a database name.
///
/// The key is the first eight bytes of the SHA-256 digest read as a
/// big-endian `i64`, so every process computes the same key.
#[must_use]
pub fn advisory_lock_key(database: &str) -> i64 {
    let digest = Sha256::digest(database.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Two-state lock guarding a migration run.
#[derive(Debug, Default)]
pub struct LockManager {
    locked: AtomicBool,
}

impl LockManager {
    /// Creates an unlocked manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the lock is currently held by this manager.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Moves Unlocked -> Locked, then takes the backend lock.
    ///
    /// The flag is restored to Unlocked when the backend call fails.
    pub async fn acquire(
        &self,
        dialect: &dyn Dialect,
        conn: &mut AnyConnection,
        cfg: &LockConfig,
    ) -> Result<()> {
        self.swap(false, true, MigrateError::Locked)?;
        dialect.lock(conn, cfg).await.map_err(|err| {
            self.locked.store(false, Ordering::Release);
            err
        })
    }

    /// Moves Locked -> Unlocked, then releases the backend lock.
    ///
    /// The flag is restored to Locked when the backend call fails.
    pub async fn release(
        &self,
        dialect: &dyn Dialect,
        conn: &mut AnyConnection,
        cfg: &LockConfig,
    ) -> Result<()> {
        self.swap(true, false, MigrateError::Unlocked)?;
        dialect.unlock(conn, cfg).await.map_err(|err| {
            self.locked.store(true, Ordering::Release);
            err
        })
    }

    fn swap(&self, from: bool, to: bool, conflict: MigrateError) -> Result<()> {
        self.locked
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| conflict)
    }
}
