//! # Supervisor: drives the component registry through its lifecycle.
//!
//! The [`Supervisor`] owns an ordered [`Registry`] and runs it through two
//! directed passes under deadline pressure:
//!
//! - **start phase** - forward order, each `start` under the start deadline;
//!   a failure rolls back the already-started components in reverse order
//!   and aborts the run.
//! - **wait** - blocks until the shutdown trigger fires.
//! - **stop phase** - reverse order, each `stop` under a fresh stop
//!   deadline; failures accumulate, every component gets its chance.
//!
//! ## Architecture
//! ```text
//! run(ctx)
//!   │
//!   ├──► Idle -> Running (second run fails with AlreadyStarted)
//!   │
//!   ├──► arm shutdown trigger:
//!   │      SIGINT / SIGTERM ─┐
//!   │      exit()            ├──► single-use trigger
//!   │      parent cancel     │
//!   │      internal cancel  ─┘
//!   │
//!   ├──► start phase (forward, rollback on failure)
//!   ├──► wait for trigger or parent cancel
//!   └──► stop phase (reverse, aggregate errors, drain tracker)
//! ```
//!
//! ## Rules
//! - Per-component calls are strictly sequential; no lock is held across a
//!   component call.
//! - Rollback errors are logged, never returned; the original start error
//!   wins.
//! - The stop phase derives a fresh deadline rather than reusing the
//!   (possibly cancelled) parent context.
//! - Background tasks registered via [`Supervisor::spawn`] are drained at
//!   the end of the stop phase, bounded by the stop deadline; overrunning
//!   the deadline logs a warning but does not fail the shutdown.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::components::Registry;
use crate::context::Context;
use crate::error::{AggregateError, ComponentError, Phase, RunError};
use crate::logger::Log;

use super::signals;
use super::state::{State, StateCell};

/// Per-component stop budget while rolling back a failed start.
const ROLLBACK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Orchestrates component startup, steady-state wait, and graceful
/// shutdown. Built via [`SupervisorBuilder`](super::SupervisorBuilder).
pub struct Supervisor {
    name: String,
    hostname: String,
    start_timeout: Duration,
    stop_timeout: Duration,
    log: Arc<dyn Log>,
    registry: Registry,
    state: StateCell,
    /// Internal cancellation handle; one of the shutdown-trigger sources.
    ctx: Context,
    exit_tx: mpsc::Sender<()>,
    exit_rx: Mutex<Option<mpsc::Receiver<()>>>,
    /// Outstanding auxiliary tasks drained during the stop phase.
    tracker: TaskTracker,
}

impl Supervisor {
    pub(super) fn new_internal(
        name: String,
        hostname: String,
        start_timeout: Duration,
        stop_timeout: Duration,
        log: Arc<dyn Log>,
        registry: Registry,
    ) -> Self {
        let (exit_tx, exit_rx) = mpsc::channel(1);
        Self {
            name,
            hostname,
            start_timeout,
            stop_timeout,
            log,
            registry,
            state: StateCell::new(),
            ctx: Context::background(),
            exit_tx,
            exit_rx: Mutex::new(Some(exit_rx)),
            tracker: TaskTracker::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Current run state.
    pub fn state(&self) -> State {
        self.state.state()
    }

    /// Triggers graceful shutdown programmatically.
    ///
    /// Non-blocking and idempotent: the one-slot signal is simply dropped
    /// when already pending. Safe to call before or during [`run`].
    ///
    /// [`run`]: Supervisor::run
    pub fn exit(&self) {
        let _ = self.exit_tx.try_send(());
    }

    /// Registers an auxiliary background task.
    ///
    /// The stop phase waits for all registered tasks to finish, bounded by
    /// the stop deadline.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(future)
    }

    /// Starts components, waits for a shutdown trigger, stops components.
    ///
    /// Single-use: a second call returns [`RunError::AlreadyStarted`]
    /// without touching any component.
    pub async fn run(&self, ctx: Context) -> Result<(), RunError> {
        if !self.state.try_start() {
            return Err(RunError::AlreadyStarted);
        }

        let result = self.run_phases(&ctx).await;

        self.state.terminate();
        self.ctx.cancel();
        result
    }

    async fn run_phases(&self, ctx: &Context) -> Result<(), RunError> {
        let trigger = self.arm_shutdown_trigger(ctx);

        let start_ctx = ctx.with_deadline(self.start_timeout);
        let started = self.start_phase(&start_ctx).await;
        start_ctx.cancel();
        started.map_err(RunError::Start)?;

        let parent_cancelled = tokio::select! {
            _ = trigger.cancelled() => false,
            _ = ctx.cancelled() => true,
        };
        if parent_cancelled {
            self.log
                .info(ctx, "parent context canceled, initiating shutdown", &[]);
        }

        // Fresh deadline: the parent may already be cancelled when
        // cancellation was the trigger, and stop still needs its budget.
        let stop_ctx = Context::background().with_deadline(self.stop_timeout);
        let stopped = self.stop_phase(&stop_ctx).await;
        stop_ctx.cancel();
        stopped
    }

    /// Spawns the single-use shutdown trigger.
    ///
    /// The returned token cancels on the earliest of: an OS termination
    /// signal, [`exit`](Supervisor::exit), parent-context cancellation, or
    /// internal-context cancellation, and stays cancelled.
    fn arm_shutdown_trigger(&self, parent: &Context) -> CancellationToken {
        let trigger = CancellationToken::new();

        let exit_rx = {
            let mut guard = match self.exit_rx.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take()
        };

        let fired = trigger.clone();
        let parent = parent.clone();
        let internal = self.ctx.clone();
        let log = Arc::clone(&self.log);

        tokio::spawn(async move {
            let signal_log = Arc::clone(&log);
            let signal_ctx = parent.clone();
            let signal_wait = async move {
                match signals::wait_for_shutdown_signal().await {
                    Ok(name) => name,
                    Err(err) => {
                        // Other trigger sources still apply.
                        signal_log.error(
                            &signal_ctx,
                            "signal handler registration failed",
                            &[("err", &err)],
                        );
                        std::future::pending().await
                    }
                }
            };

            let signal_name = tokio::select! {
                name = signal_wait => Some(name),
                _ = recv_exit(exit_rx) => None,
                _ = parent.cancelled() => None,
                _ = internal.cancelled() => None,
            };

            if let Some(name) = signal_name {
                log.info(&parent, "received shutdown signal", &[("signal", &name)]);
            }
            fired.cancel();
        });

        trigger
    }

    /// Forward pass: starts every component, rolling back on failure.
    async fn start_phase(&self, ctx: &Context) -> Result<(), ComponentError> {
        self.log.info(
            ctx,
            "starting application",
            &[("name", &self.name), ("hostname", &self.hostname)],
        );

        let mut started: Vec<String> = Vec::new();

        for component in self.registry.iter() {
            self.log.debug(
                ctx,
                "starting component",
                &[("component", &component.name())],
            );

            let begin = Instant::now();
            let result = component.lifecycle().start(ctx.clone()).await;
            let duration = begin.elapsed();

            match result {
                Ok(()) => {
                    self.log.debug(
                        ctx,
                        "component started",
                        &[("component", &component.name()), ("duration", &duration)],
                    );
                    started.push(component.name().to_string());
                }
                Err(err) => {
                    self.log.error(
                        ctx,
                        "cannot start component",
                        &[
                            ("component", &component.name()),
                            ("duration", &duration),
                            ("err", &err),
                        ],
                    );
                    let failure = ComponentError::new(component.name(), Phase::Start, err);
                    self.rollback(ctx, &started).await;
                    return Err(failure);
                }
            }
        }

        self.log.info(
            ctx,
            "application started",
            &[("components", &self.registry.len())],
        );
        Ok(())
    }

    /// Stops already-started components in reverse order.
    ///
    /// Each stop gets a short bounded deadline derived from the phase
    /// context. Errors are logged only; the original start error wins.
    async fn rollback(&self, ctx: &Context, started: &[String]) {
        self.log
            .warn(ctx, "startup failed, rolling back started components", &[]);

        for name in started.iter().rev() {
            let Some(component) = self.registry.by_name(name) else {
                continue;
            };
            let stop_ctx = ctx.with_deadline(ROLLBACK_STOP_TIMEOUT);
            if let Err(err) = component.lifecycle().stop(stop_ctx).await {
                self.log.error(
                    ctx,
                    "error during rollback stop",
                    &[("component", &component.name()), ("err", &err)],
                );
            }
        }
    }

    /// Reverse pass: offers every component the chance to stop, then drains
    /// the outstanding-work tracker bounded by the phase context.
    async fn stop_phase(&self, ctx: &Context) -> Result<(), RunError> {
        self.log.info(ctx, "stopping application", &[]);

        let mut errs: Vec<ComponentError> = Vec::new();

        for component in self.registry.iter().rev() {
            self.log.debug(
                ctx,
                "stopping component",
                &[("component", &component.name())],
            );

            let begin = Instant::now();
            let result = component.lifecycle().stop(ctx.clone()).await;
            let duration = begin.elapsed();

            match result {
                Ok(()) => self.log.debug(
                    ctx,
                    "component stopped",
                    &[("component", &component.name()), ("duration", &duration)],
                ),
                Err(err) => {
                    self.log.error(
                        ctx,
                        "error stopping component",
                        &[
                            ("component", &component.name()),
                            ("duration", &duration),
                            ("err", &err),
                        ],
                    );
                    errs.push(ComponentError::new(component.name(), Phase::Stop, err));
                }
            }
        }

        self.tracker.close();
        tokio::select! {
            _ = self.tracker.wait() => {}
            _ = ctx.cancelled() => {
                self.log.warn(
                    ctx,
                    "shutdown timeout, some background tasks may still be running",
                    &[],
                );
            }
        }

        self.log.info(ctx, "application stopped", &[]);

        if errs.is_empty() {
            Ok(())
        } else {
            Err(RunError::Stop(AggregateError::new(errs)))
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.ctx.cancel();
    }
}

async fn recv_exit(rx: Option<mpsc::Receiver<()>>) {
    match rx {
        Some(mut rx) => {
            let _ = rx.recv().await;
        }
        None => std::future::pending().await,
    }
}
