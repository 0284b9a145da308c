//! # The lifecycle contract every managed component implements.
//!
//! [`Lifecycle`] is deliberately minimal: two operations, both taking a
//! [`Context`], both returning an error.
//!
//! ## Rules
//! - `start` returns once the component is ready to service work. Long
//!   running loops belong in background tasks whose teardown is triggered
//!   by `stop` (register them via
//!   [`Supervisor::spawn`](crate::Supervisor::spawn) so shutdown can
//!   drain them).
//! - `stop` is idempotent: a second call is a no-op returning `Ok(())`.
//! - Both operations observe the context cooperatively; when its deadline
//!   expires they are expected to return the cancellation cause.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::Context;
use crate::error::BoxError;

/// Shared handle to a lifecycle implementation.
pub type LifecycleRef = Arc<dyn Lifecycle>;

/// Start/stop capability of a managed component.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn start(&self, ctx: Context) -> Result<(), BoxError>;
    async fn stop(&self, ctx: Context) -> Result<(), BoxError>;
}

type LifecycleFuture = BoxFuture<'static, Result<(), BoxError>>;
type LifecycleClosure = Box<dyn Fn(Context) -> LifecycleFuture + Send + Sync>;

/// Function-backed lifecycle.
///
/// Wraps two closures that each *create* a fresh future per call, so no
/// state is shared between invocations unless the closures capture an
/// `Arc` explicitly.
///
/// ```
/// use appvisor::{Context, LifecycleFn};
///
/// let noop = LifecycleFn::arc(
///     |_ctx: Context| async { Ok(()) },
///     |_ctx: Context| async { Ok(()) },
/// );
/// # let _ = noop;
/// ```
pub struct LifecycleFn {
    on_start: LifecycleClosure,
    on_stop: LifecycleClosure,
}

impl LifecycleFn {
    pub fn new<S, SFut, T, TFut>(on_start: S, on_stop: T) -> Self
    where
        S: Fn(Context) -> SFut + Send + Sync + 'static,
        SFut: Future<Output = Result<(), BoxError>> + Send + 'static,
        T: Fn(Context) -> TFut + Send + Sync + 'static,
        TFut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            on_start: Box::new(move |ctx| Box::pin(on_start(ctx))),
            on_stop: Box::new(move |ctx| Box::pin(on_stop(ctx))),
        }
    }

    /// Creates the lifecycle and returns it as a shared handle.
    pub fn arc<S, SFut, T, TFut>(on_start: S, on_stop: T) -> LifecycleRef
    where
        S: Fn(Context) -> SFut + Send + Sync + 'static,
        SFut: Future<Output = Result<(), BoxError>> + Send + 'static,
        T: Fn(Context) -> TFut + Send + Sync + 'static,
        TFut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Arc::new(Self::new(on_start, on_stop))
    }
}

#[async_trait]
impl Lifecycle for LifecycleFn {
    async fn start(&self, ctx: Context) -> Result<(), BoxError> {
        (self.on_start)(ctx).await
    }

    async fn stop(&self, ctx: Context) -> Result<(), BoxError> {
        (self.on_stop)(ctx).await
    }
}
