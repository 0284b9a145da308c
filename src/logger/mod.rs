//! # Structured logging seam.
//!
//! The supervisor (and any component that wants it) logs through the
//! [`Log`] trait: four level-named methods, each taking a [`Context`], a
//! message, and a list of key–value pairs. Two implementations ship with
//! the crate:
//!
//! - [`NopLog`] discards everything; the default, and what tests use.
//! - [`TracingLog`] forwards to the [`tracing`] ecosystem; install a
//!   subscriber via [`init`] to get JSON or colored text output with
//!   runtime level switching.
//!
//! The context's request id, when present, is surfaced under the stable
//! [`REQUEST_ID_KEY`] key.

mod config;

pub use config::{
    init, Config, Handle, LoggerError, ENCODING_JSON, ENCODING_TEXT, LEVEL_DEBUG, LEVEL_ERROR,
    LEVEL_INFO, LEVEL_WARN,
};

use std::fmt;

use crate::context::Context;

/// Stable log key carrying the correlation id.
pub const REQUEST_ID_KEY: &str = "request_id";

/// Key–value pairs attached to a log record.
pub type Fields<'a> = &'a [(&'a str, &'a dyn fmt::Debug)];

/// Level-structured logger.
pub trait Log: Send + Sync {
    fn debug(&self, ctx: &Context, msg: &str, fields: Fields<'_>);
    fn info(&self, ctx: &Context, msg: &str, fields: Fields<'_>);
    fn warn(&self, ctx: &Context, msg: &str, fields: Fields<'_>);
    fn error(&self, ctx: &Context, msg: &str, fields: Fields<'_>);
}

/// Logger that discards all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopLog;

impl Log for NopLog {
    fn debug(&self, _ctx: &Context, _msg: &str, _fields: Fields<'_>) {}
    fn info(&self, _ctx: &Context, _msg: &str, _fields: Fields<'_>) {}
    fn warn(&self, _ctx: &Context, _msg: &str, _fields: Fields<'_>) {}
    fn error(&self, _ctx: &Context, _msg: &str, _fields: Fields<'_>) {}
}

fn render(fields: Fields<'_>) -> String {
    use fmt::Write;

    let mut out = String::new();
    for (key, value) in fields {
        let _ = write!(out, " {key}={value:?}");
    }
    out
}

/// Logger forwarding to [`tracing`] events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

macro_rules! forward_level {
    ($method:ident) => {
        fn $method(&self, ctx: &Context, msg: &str, fields: Fields<'_>) {
            match ctx.request_id() {
                Some(rid) => tracing::$method!(request_id = rid, "{}{}", msg, render(fields)),
                None => tracing::$method!("{}{}", msg, render(fields)),
            }
        }
    };
}

impl Log for TracingLog {
    forward_level!(debug);
    forward_level!(info);
    forward_level!(warn);
    forward_level!(error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_formats_pairs() {
        let duration = std::time::Duration::from_millis(5);
        let out = render(&[("component", &"db"), ("duration", &duration)]);
        assert_eq!(out, r#" component="db" duration=5ms"#);
    }

    #[test]
    fn render_empty_is_empty() {
        assert_eq!(render(&[]), "");
    }
}
