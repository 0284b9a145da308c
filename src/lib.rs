//! # appvisor
//!
//! **Appvisor** is an infrastructure toolkit for long-running service
//! processes. It supervises the startup, steady state, and graceful
//! shutdown of a set of lifecycle-bearing components, and composes
//! cancellable execution graphs out of plain async steps.
//!
//! ## Features
//!
//! | Area            | Description                                                          | Key types / traits                        |
//! |-----------------|----------------------------------------------------------------------|-------------------------------------------|
//! | **Lifecycle**   | Two-operation contract every managed component exposes.              | [`Lifecycle`], [`LifecycleFn`]             |
//! | **Supervision** | Ordered start, signal-driven wait, reverse stop, rollback, deadlines. | [`Supervisor`], [`SupervisorBuilder`]      |
//! | **Pipelines**   | Layered, cancellable programs with fan-out, fallbacks, interceptors. | [`pipeline::Pipeline`]                     |
//! | **Errors**      | Typed errors carrying component name, phase, and causes.             | [`RunError`], [`ComponentError`]           |
//! | **Logging**     | Level-structured seam with `tracing`-backed and no-op impls.         | [`logger::Log`], [`logger::TracingLog`]    |
//! | **Config**      | Layered defaults / environment / YAML scanner.                       | [`config::Scanner`], [`config::Source`]    |
//!
//! ## Optional features
//! - `postgres`: exports the [`pg`] connection-pool component (sqlx).
//! - `kafka`: exports the [`kafka`] producer/consumer components (rdkafka).
//!
//! ```no_run
//! use std::time::Duration;
//! use appvisor::{Component, Context, LifecycleFn, SupervisorBuilder};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // A component with a trivial lifecycle.
//!     let heartbeat = LifecycleFn::arc(
//!         |_ctx: Context| async {
//!             println!("heartbeat ready");
//!             Ok(())
//!         },
//!         |_ctx: Context| async {
//!             println!("heartbeat stopped");
//!             Ok(())
//!         },
//!     );
//!
//!     let app = SupervisorBuilder::new()
//!         .with_name("demo")
//!         .with_stop_timeout(Duration::from_secs(10))
//!         .with_component(Component::new("heartbeat", heartbeat))
//!         .build()?;
//!
//!     // Runs until SIGINT/SIGTERM or `app.exit()`.
//!     app.run(Context::background()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod app;
mod components;
mod context;
mod error;

pub mod config;
pub mod logger;
pub mod pipeline;

#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(feature = "postgres")]
pub mod pg;

// ---- Public re-exports ----

pub use app::{State, Supervisor, SupervisorBuilder};
pub use components::{Component, Lifecycle, LifecycleFn, LifecycleRef, Registry};
pub use context::{Context, ContextError};
pub use error::{AggregateError, BoxError, BuildError, ComponentError, Phase, RunError};
