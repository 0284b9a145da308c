//! # Cancellation context carried through every lifecycle and pipeline call.
//!
//! [`Context`] is a cheap cloneable handle over a
//! [`CancellationToken`](tokio_util::sync::CancellationToken) extended with
//! two things the token alone does not carry:
//!
//! - a **deadline cause**, so [`Context::error`] can distinguish a deadline
//!   expiry from an explicit cancel,
//! - an optional **request id** for log correlation (see
//!   [`logger::REQUEST_ID_KEY`](crate::logger::REQUEST_ID_KEY)).
//!
//! ## Rules
//! - Cancellation is cooperative: bodies observe [`Context::cancelled`] (or
//!   poll [`Context::is_cancelled`]) and return; nothing is force-killed.
//! - Cancelling a context cancels every context derived from it; parents are
//!   unaffected by a child's cancel.
//! - [`Context::with_deadline`] needs a running tokio runtime (it spawns the
//!   deadline timer).
//!
//! ```
//! use std::time::Duration;
//! use appvisor::Context;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let ctx = Context::background().with_deadline(Duration::from_millis(10));
//! ctx.cancelled().await;
//! assert!(ctx.error().is_some());
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a context is no longer live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context (or an ancestor) was cancelled explicitly.
    #[error("context canceled")]
    Canceled,

    /// The context's deadline expired.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Deadline-bearing, cancellable context.
#[derive(Clone)]
pub struct Context {
    token: CancellationToken,
    deadline_hit: Option<Arc<AtomicBool>>,
    request_id: Option<Arc<str>>,
}

impl Context {
    /// Fresh root context with no deadline and no request id.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline_hit: None,
            request_id: None,
        }
    }

    /// Derived context cancelled whenever `self` is cancelled.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline_hit: self.deadline_hit.clone(),
            request_id: self.request_id.clone(),
        }
    }

    /// Derived context that self-cancels once `timeout` elapses.
    ///
    /// The deadline only tightens: the parent cancelling still cancels the
    /// derived context first if it fires earlier.
    pub fn with_deadline(&self, timeout: Duration) -> Self {
        let token = self.token.child_token();
        let hit = Arc::new(AtomicBool::new(false));

        let timer_token = token.clone();
        let timer_hit = Arc::clone(&hit);
        tokio::spawn(async move {
            tokio::select! {
                _ = timer_token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    timer_hit.store(true, Ordering::Release);
                    timer_token.cancel();
                }
            }
        });

        Self {
            token,
            deadline_hit: Some(hit),
            request_id: self.request_id.clone(),
        }
    }

    /// Derived context carrying `id` for log correlation.
    ///
    /// An empty id clears the correlation (absent).
    pub fn with_request_id(&self, id: impl Into<String>) -> Self {
        let id: String = id.into();
        Self {
            token: self.token.clone(),
            deadline_hit: self.deadline_hit.clone(),
            request_id: if id.is_empty() {
                None
            } else {
                Some(Arc::from(id.as_str()))
            },
        }
    }

    /// Correlation id, if one was attached.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Cancels this context and everything derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the context is cancelled (by deadline or explicitly).
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Cancellation cause, or `None` while the context is live.
    pub fn error(&self) -> Option<ContextError> {
        if !self.token.is_cancelled() {
            return None;
        }
        match &self.deadline_hit {
            Some(hit) if hit.load(Ordering::Acquire) => Some(ContextError::DeadlineExceeded),
            _ => Some(ContextError::Canceled),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .field("request_id", &self.request_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_propagates_to_children_only() {
        let root = Context::background();
        let child = root.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());

        root.cancel();
        assert_eq!(root.error(), Some(ContextError::Canceled));
    }

    #[tokio::test]
    async fn deadline_reports_its_cause() {
        let ctx = Context::background().with_deadline(Duration::from_millis(20));
        assert!(ctx.error().is_none());

        ctx.cancelled().await;
        assert_eq!(ctx.error(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn explicit_cancel_wins_over_pending_deadline() {
        let ctx = Context::background().with_deadline(Duration::from_secs(60));
        ctx.cancel();
        assert_eq!(ctx.error(), Some(ContextError::Canceled));
    }

    #[tokio::test]
    async fn request_id_round_trip() {
        let ctx = Context::background().with_request_id("req-1");
        assert_eq!(ctx.request_id(), Some("req-1"));
        assert_eq!(ctx.child().request_id(), Some("req-1"));

        let cleared = ctx.with_request_id("");
        assert_eq!(cleared.request_id(), None);
    }
}
