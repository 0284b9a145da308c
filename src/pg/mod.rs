//! # Postgres connection-pool component.
//!
//! [`Db`] wraps a master [`sqlx::PgPool`] and zero or more replica pools,
//! implements the lifecycle contract, and offers a transaction-scoped
//! helper, [`with_tx`].
//!
//! Enabled via the `postgres` feature.

mod config;
mod db;
mod tx;

pub use config::Config;
pub use db::Db;
pub use tx::with_tx;

use thiserror::Error;

/// Errors raised by the pool wrapper.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PgError {
    /// The component's `start` has not run (or `stop` already did).
    #[error("database not started")]
    NotStarted,

    #[error("{reason}")]
    Config { reason: &'static str },

    #[error("replica[{index}]: {source}")]
    Replica {
        index: usize,
        #[source]
        source: Box<PgError>,
    },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
