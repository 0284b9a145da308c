//! A single unit of the pipeline program: one related set of slots.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::Context;
use crate::error::BoxError;

/// A context-taking step; fan-outs run several of these concurrently.
pub type Step = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Plain side-effect hook (`before` / `after` slots).
pub type Hook = Box<dyn FnMut() + Send>;

/// Interceptor over the rolling error; returning `Ok(())` clears it.
pub type Catch = Box<dyn FnMut(BoxError) -> Result<(), BoxError> + Send>;

/// Hook for the no-error path; its result becomes the rolling error.
pub type SuccessHook = Box<dyn FnMut() -> Result<(), BoxError> + Send>;

/// Boxes a closure into a [`Step`].
pub fn step<F, Fut>(f: F) -> Step
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

#[derive(Default)]
pub(crate) struct Layer {
    pub(crate) before: Option<Hook>,
    pub(crate) steps: Vec<Step>,
    pub(crate) then_catch: Option<Catch>,
    pub(crate) fallbacks: Vec<Step>,
    pub(crate) else_catch: Option<Catch>,
    pub(crate) on_error: Option<Catch>,
    pub(crate) on_success: Option<SuccessHook>,
    pub(crate) after: Option<Hook>,
    pub(crate) reset: bool,
}

impl Layer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sentinel layer that clears the rolling error.
    pub(crate) fn reset_marker() -> Self {
        Self {
            reset: true,
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reset {
            return f.write_str("Layer(reset)");
        }
        f.debug_struct("Layer")
            .field("before", &self.before.is_some())
            .field("steps", &self.steps.len())
            .field("then_catch", &self.then_catch.is_some())
            .field("fallbacks", &self.fallbacks.len())
            .field("else_catch", &self.else_catch.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}
