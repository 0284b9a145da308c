//! # Pipeline: a layered, cancellable execution program.
//!
//! A [`Pipeline`] is built by a fluent sequence of builder methods on a
//! single program value; no method fails. The program records **layers**;
//! each layer groups a related set of slots and executes in declaration
//! order:
//!
//! - `before` - side-effect hook, runs only if the layer executes
//! - primary steps ([`then`] / [`then_each`]) - concurrent fan-out
//! - [`then_catch`] - interceptor, runs iff the primary fan-out failed
//! - fallbacks ([`or_else`] / [`or_else_each`]) - fan-out, runs iff an
//!   error survived `then_catch`
//! - [`else_catch`] - interceptor, runs iff the fallback fan-out failed
//! - [`on_error`] / [`on_success`] - exactly one of them, by error state
//! - `after` - side-effect hook, runs only if the layer executed
//!
//! The result of each invocation replaces the **rolling error**; a layer is
//! skipped entirely while the rolling error is set (or when it has no
//! primary steps), and [`reset`] inserts a sentinel layer that clears it.
//!
//! ## Rules
//! - A second [`then`] on a layer that already has steps opens a new layer.
//! - Fallbacks keep their first assignment; catchers and hooks overwrite.
//! - Cancellation comes solely from the pipeline's [`Context`]: it surfaces
//!   as the current fan-out's error and the layer-skip rule does the rest.
//! - After [`run`] the pipeline is consumed.
//!
//! ```
//! use appvisor::pipeline::Pipeline;
//! use appvisor::Context;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! Pipeline::new(Context::background())
//!     .before(|| println!("1. before"))
//!     .then(|_ctx| async { Err("sample error".into()) })
//!     .then_catch(|err| {
//!         println!("2. then catch");
//!         Err(err)
//!     })
//!     .or_else(|_ctx| async { Ok(()) })
//!     .after(|| println!("3. after"))
//!     .run(|err| assert!(err.is_none()))
//!     .await;
//! # }
//! ```
//!
//! [`then`]: Pipeline::then
//! [`then_each`]: Pipeline::then_each
//! [`then_catch`]: Pipeline::then_catch
//! [`or_else`]: Pipeline::or_else
//! [`or_else_each`]: Pipeline::or_else_each
//! [`else_catch`]: Pipeline::else_catch
//! [`on_error`]: Pipeline::on_error
//! [`on_success`]: Pipeline::on_success
//! [`reset`]: Pipeline::reset
//! [`run`]: Pipeline::run

mod layer;

pub use layer::{step, Catch, Hook, Step, SuccessHook};

use std::future::Future;

use tokio::task::JoinSet;

use crate::context::{Context, ContextError};
use crate::error::BoxError;
use layer::Layer;

/// Layered, cancellable execution program.
pub struct Pipeline {
    ctx: Context,
    err: Option<BoxError>,
    layers: Vec<Layer>,
}

impl Pipeline {
    /// Creates an empty program with one implicit open layer.
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            err: None,
            layers: vec![Layer::new()],
        }
    }

    /// Current layer for slot assignment (never a reset sentinel).
    fn current(&mut self) -> &mut Layer {
        let need_new = match self.layers.last() {
            None => true,
            Some(layer) => layer.reset,
        };
        if need_new {
            self.layers.push(Layer::new());
        }
        let idx = self.layers.len() - 1;
        &mut self.layers[idx]
    }

    /// Current layer whose primary-step slot is still free.
    fn open(&mut self) -> &mut Layer {
        let need_new = match self.layers.last() {
            None => true,
            Some(layer) => layer.reset || !layer.steps.is_empty(),
        };
        if need_new {
            self.layers.push(Layer::new());
        }
        let idx = self.layers.len() - 1;
        &mut self.layers[idx]
    }

    /// Hook run before any step of the layer, only if the layer executes.
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.open().before = Some(Box::new(hook));
        self
    }

    /// Adds a single primary step.
    pub fn then<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.then_each([step(f)])
    }

    /// Adds a set of primary steps executed concurrently as a fan-out.
    ///
    /// If the current layer already has primary steps, a new layer opens.
    pub fn then_each<I>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = Step>,
    {
        self.open().steps.extend(steps);
        self
    }

    /// Interceptor invoked iff the primary fan-out failed; may transform
    /// the error or clear it by returning `Ok(())`.
    pub fn then_catch<F>(mut self, catch: F) -> Self
    where
        F: FnMut(BoxError) -> Result<(), BoxError> + Send + 'static,
    {
        self.current().then_catch = Some(Box::new(catch));
        self
    }

    /// Adds a single fallback step.
    pub fn or_else<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.or_else_each([step(f)])
    }

    /// Adds fallback steps, executed only if the primary fan-out failed and
    /// the error survived `then_catch`. First assignment wins.
    pub fn or_else_each<I>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = Step>,
    {
        let layer = self.current();
        if layer.fallbacks.is_empty() {
            layer.fallbacks.extend(steps);
        }
        self
    }

    /// Interceptor invoked iff the fallback fan-out also failed.
    pub fn else_catch<F>(mut self, catch: F) -> Self
    where
        F: FnMut(BoxError) -> Result<(), BoxError> + Send + 'static,
    {
        self.current().else_catch = Some(Box::new(catch));
        self
    }

    /// Hook over the rolling error, invoked iff an error remains after the
    /// layer's catchers and fallbacks ran.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: FnMut(BoxError) -> Result<(), BoxError> + Send + 'static,
    {
        self.current().on_error = Some(Box::new(hook));
        self
    }

    /// Hook invoked iff no error remains; its result becomes the rolling
    /// error.
    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: FnMut() -> Result<(), BoxError> + Send + 'static,
    {
        self.current().on_success = Some(Box::new(hook));
        self
    }

    /// Hook run after all other slots of the layer, only if it executed.
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.current().after = Some(Box::new(hook));
        self
    }

    /// Appends a sentinel layer that clears the rolling error.
    pub fn reset(mut self) -> Self {
        self.layers.push(Layer::reset_marker());
        self
    }

    /// Executes the program and hands the final rolling error to `done`.
    ///
    /// `done` is invoked exactly once.
    pub async fn run<F>(self, done: F)
    where
        F: FnOnce(Option<BoxError>),
    {
        done(self.finish().await);
    }

    /// Executes the program and returns the final rolling error.
    pub async fn finish(mut self) -> Option<BoxError> {
        let layers = std::mem::take(&mut self.layers);

        for mut layer in layers {
            if layer.reset {
                self.err = None;
                continue;
            }
            if self.err.is_some() || layer.steps.is_empty() {
                continue;
            }

            if let Some(hook) = layer.before.as_mut() {
                hook();
            }

            self.err = fan_out(&self.ctx, &layer.steps).await.err();
            if let Some(err) = self.err.take() {
                self.err = match layer.then_catch.as_mut() {
                    Some(catch) => catch(err).err(),
                    None => Some(err),
                };
            }

            if self.err.is_some() && !layer.fallbacks.is_empty() {
                self.err = fan_out(&self.ctx, &layer.fallbacks).await.err();
                if let Some(err) = self.err.take() {
                    self.err = match layer.else_catch.as_mut() {
                        Some(catch) => catch(err).err(),
                        None => Some(err),
                    };
                }
            }

            match self.err.take() {
                Some(err) => {
                    self.err = match layer.on_error.as_mut() {
                        Some(hook) => hook(err).err(),
                        None => Some(err),
                    };
                }
                None => {
                    if let Some(hook) = layer.on_success.as_mut() {
                        self.err = hook().err();
                    }
                }
            }

            if let Some(hook) = layer.after.as_mut() {
                hook();
            }
        }

        self.err
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("layers", &self.layers)
            .field("err", &self.err.as_ref().map(|e| e.to_string()))
            .finish()
    }
}

/// Runs `steps` concurrently under a context derived from `ctx` that is
/// cancelled on the first failure.
///
/// Outcome is the first observed failure, or `Ok(())` when every step
/// succeeded. If `ctx` itself is cancelled before the group settles, the
/// context's cancellation cause is returned immediately and in-flight
/// tasks are detached rather than awaited.
async fn fan_out(ctx: &Context, steps: &[Step]) -> Result<(), BoxError> {
    let group = ctx.child();
    let mut set: JoinSet<Result<(), BoxError>> = JoinSet::new();
    for s in steps {
        set.spawn(s(group.clone()));
    }

    let settled = tokio::select! {
        biased;
        _ = ctx.cancelled() => None,
        first = drain(&mut set, &group) => Some(first),
    };

    match settled {
        None => {
            set.detach_all();
            Err(Box::new(ctx.error().unwrap_or(ContextError::Canceled)))
        }
        Some(None) => Ok(()),
        Some(Some(err)) => Err(err),
    }
}

/// Awaits every task, keeping the first failure and cancelling the group
/// the moment it is observed. A panicking step counts as a failure.
async fn drain(set: &mut JoinSet<Result<(), BoxError>>, group: &Context) -> Option<BoxError> {
    let mut first: Option<BoxError> = None;
    while let Some(joined) = set.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(join_err) => Err(Box::new(join_err) as BoxError),
        };
        if let Err(err) = result {
            if first.is_none() {
                group.cancel();
                first = Some(err);
            }
        }
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(p: &Pipeline) -> usize {
        p.layers.len()
    }

    #[tokio::test]
    async fn second_then_opens_a_new_layer() {
        let p = Pipeline::new(Context::background())
            .then(|_ctx| async { Ok(()) })
            .then(|_ctx| async { Ok(()) });
        assert_eq!(depth(&p), 2);
    }

    #[tokio::test]
    async fn before_after_steps_opens_a_new_layer() {
        let p = Pipeline::new(Context::background())
            .then(|_ctx| async { Ok(()) })
            .before(|| {});
        assert_eq!(depth(&p), 2);
    }

    #[tokio::test]
    async fn fallbacks_keep_first_assignment() {
        let p = Pipeline::new(Context::background())
            .then(|_ctx| async { Err("boom".into()) })
            .or_else(|_ctx| async { Ok(()) })
            .or_else(|_ctx| async { Err("ignored".into()) });
        assert_eq!(depth(&p), 1);
        assert_eq!(p.layers[0].fallbacks.len(), 1);
        assert!(p.finish().await.is_none());
    }

    #[tokio::test]
    async fn reset_forces_a_fresh_layer_for_later_slots() {
        let p = Pipeline::new(Context::background())
            .then(|_ctx| async { Ok(()) })
            .reset()
            .then(|_ctx| async { Ok(()) });
        // implicit + reset sentinel + reopened layer
        assert_eq!(depth(&p), 3);
    }
}
