//! Explicit session and transaction helpers.
//!
//! Handles are always passed as parameters. A caller that already holds an
//! open transaction passes it to [`in_transaction`], which then nests a
//! savepoint instead of beginning a new transaction.

use futures::future::BoxFuture;
use sqlx::{AnyConnection, AnyPool, Connection};
use tracing::{debug, warn};

/// Runs `f` on a freshly acquired connection, released afterwards.
pub async fn with_new_session<F, T, E>(pool: &AnyPool, f: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, Result<T, E>>,
    E: From<sqlx::Error>,
{
    let mut conn = pool.acquire().await?;
    debug!("Opened new database session");
    f(&mut *conn).await
}

/// Runs `f` inside a transaction on `conn`.
///
/// Commits when `f` succeeds and rolls back when it fails. On a connection
/// that is already inside a transaction this uses a savepoint.
pub async fn in_transaction<F, T, E>(conn: &mut AnyConnection, f: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, Result<T, E>>,
    E: From<sqlx::Error>,
{
    let mut tx = conn.begin().await?;
    match f(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(err)
        }
    }
}
