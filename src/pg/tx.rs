//! Transaction helper: begin on the master, commit on success, roll back
//! on error (and on panic, via sqlx's rollback-on-drop).

use futures::future::BoxFuture;
use sqlx::{Postgres, Transaction};

use crate::error::BoxError;

use super::db::Db;

/// Executes `f` within a transaction on the master pool.
///
/// The transaction commits iff `f` returns `Ok`; any error (or a panic
/// unwinding through `f`) rolls it back.
///
/// ```no_run
/// use appvisor::pg::{self, Db};
///
/// # async fn demo(db: &Db) -> Result<(), appvisor::BoxError> {
/// let inserted = pg::with_tx(db, |tx| {
///     Box::pin(async move {
///         let done = sqlx::query("insert into jobs (state) values ($1)")
///             .bind("queued")
///             .execute(&mut **tx)
///             .await?;
///         Ok(done.rows_affected())
///     })
/// })
/// .await?;
/// # let _ = inserted;
/// # Ok(())
/// # }
/// ```
pub async fn with_tx<T, F>(db: &Db, f: F) -> Result<T, BoxError>
where
    F: for<'t> FnOnce(&'t mut Transaction<'static, Postgres>) -> BoxFuture<'t, Result<T, BoxError>>,
{
    let pool = db.primary().await?;
    let mut tx = pool.begin().await?;

    match f(&mut tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            // rollback failures are dropped, the closure's error is returned
            let _ = tx.rollback().await;
            Err(err)
        }
    }
}
