//! Connection-pool wrapper: one master pool plus optional replicas, with
//! the lifecycle contract for graceful startup and shutdown.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::components::Lifecycle;
use crate::context::{Context, ContextError};
use crate::error::BoxError;
use crate::logger::Log;

use super::config::Config;
use super::PgError;

struct Pools {
    primary: PgPool,
    replicas: Vec<PgPool>,
}

/// Postgres pool component.
///
/// Pools are created in `start` and closed in `stop`; accessors return
/// [`PgError::NotStarted`] outside that window.
pub struct Db {
    cfg: Config,
    log: Arc<dyn Log>,
    pools: RwLock<Option<Pools>>,
}

impl Db {
    /// Validates the configuration and creates the (not yet started)
    /// component.
    pub fn new(cfg: Config, log: Arc<dyn Log>) -> Result<Self, PgError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            log,
            pools: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Master pool, for writes.
    pub async fn primary(&self) -> Result<PgPool, PgError> {
        self.pools
            .read()
            .await
            .as_ref()
            .map(|p| p.primary.clone())
            .ok_or(PgError::NotStarted)
    }

    /// A replica pool for reads; falls back to the master when no replica
    /// is available.
    pub async fn replica(&self) -> Result<PgPool, PgError> {
        self.pools
            .read()
            .await
            .as_ref()
            .map(|p| p.replicas.first().unwrap_or(&p.primary).clone())
            .ok_or(PgError::NotStarted)
    }

    /// Verifies connectivity to the master and every replica.
    pub async fn ping(&self) -> Result<(), PgError> {
        let guard = self.pools.read().await;
        let pools = guard.as_ref().ok_or(PgError::NotStarted)?;

        pools.primary.acquire().await?;
        for replica in &pools.replicas {
            replica.acquire().await?;
        }
        Ok(())
    }

    fn connect_options(cfg: &Config) -> PgConnectOptions {
        let ssl_mode = if cfg.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        };
        PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.name)
            .ssl_mode(ssl_mode)
            .options([("search_path", cfg.schema.as_str())])
    }

    fn pool_options(cfg: &Config) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(cfg.min_conns)
            .max_connections(cfg.max_conns)
            .max_lifetime(cfg.conn_max_life_time)
            .idle_timeout(cfg.conn_max_idle_time)
    }

    async fn connect(ctx: &Context, cfg: &Config) -> Result<PgPool, BoxError> {
        tokio::select! {
            _ = ctx.cancelled() => {
                Err(Box::new(ctx.error().unwrap_or(ContextError::Canceled)) as BoxError)
            }
            pool = Self::pool_options(cfg).connect_with(Self::connect_options(cfg)) => {
                Ok(pool?)
            }
        }
    }
}

#[async_trait]
impl Lifecycle for Db {
    /// Creates the master pool (connecting verifies reachability) and
    /// best-effort replica pools; replica failures are logged, not fatal.
    async fn start(&self, ctx: Context) -> Result<(), BoxError> {
        let mut guard = self.pools.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let primary = Self::connect(&ctx, &self.cfg).await?;
        self.log.info(
            &ctx,
            "master pool started",
            &[("dsn", &self.cfg.redacted_dsn())],
        );

        let mut replicas = Vec::with_capacity(self.cfg.replicas.len());
        for (index, replica_cfg) in self.cfg.replicas.iter().enumerate() {
            match Self::connect(&ctx, replica_cfg).await {
                Ok(pool) => {
                    self.log.info(
                        &ctx,
                        "replica pool started",
                        &[("index", &index), ("dsn", &replica_cfg.redacted_dsn())],
                    );
                    replicas.push(pool);
                }
                Err(err) => {
                    self.log.warn(
                        &ctx,
                        "create replica pool",
                        &[("index", &index), ("err", &err)],
                    );
                }
            }
        }

        self.log
            .info(&ctx, "db started", &[("replicas", &replicas.len())]);
        *guard = Some(Pools { primary, replicas });
        Ok(())
    }

    /// Closes every pool. Idempotent; bounded by the configured shutdown
    /// timeout within the phase context.
    async fn stop(&self, ctx: Context) -> Result<(), BoxError> {
        let pools = match self.pools.write().await.take() {
            Some(pools) => pools,
            None => return Ok(()),
        };

        let ctx = ctx.with_deadline(self.cfg.shutdown_timeout);
        let close_all = async {
            self.log.info(&ctx, "closing master pool", &[]);
            pools.primary.close().await;
            for (index, replica) in pools.replicas.iter().enumerate() {
                self.log.info(&ctx, "closing replica pool", &[("index", &index)]);
                replica.close().await;
            }
        };

        tokio::select! {
            _ = ctx.cancelled() => {
                self.log.warn(&ctx, "db close interrupted by deadline", &[]);
            }
            _ = close_all => {
                self.log.info(&ctx, "db stopped", &[]);
            }
        }
        Ok(())
    }
}
