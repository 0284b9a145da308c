//! # Error types used by the supervisor and its components.
//!
//! This module defines the error surface of the crate:
//!
//! - [`RunError`] errors raised by the supervisor's `run` protocol.
//! - [`ComponentError`] a single component's start/stop failure.
//! - [`BuildError`] construction-time option validation failures.
//!
//! Component implementations return [`BoxError`] so any error type can flow
//! through the lifecycle contract and stay reachable through `source()`.

use std::error::Error;
use std::fmt;

use thiserror::Error;

/// Boxed error returned by component lifecycles and pipeline steps.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// The supervisor pass during which a component failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Forward pass over the registry.
    Start,
    /// Reverse pass over the registry.
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Start => f.write_str("start"),
            Phase::Stop => f.write_str("stop"),
        }
    }
}

/// A component's start or stop failure, carrying the component's display
/// name and the phase it failed in.
#[derive(Debug, Error)]
#[error("{phase} component {name:?}: {source}")]
pub struct ComponentError {
    name: String,
    phase: Phase,
    #[source]
    source: BoxError,
}

impl ComponentError {
    pub fn new(name: impl Into<String>, phase: Phase, source: BoxError) -> Self {
        Self {
            name: name.into(),
            phase,
            source,
        }
    }

    /// Display name of the failing component.
    pub fn component(&self) -> &str {
        &self.name
    }

    /// Phase the failure happened in.
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

/// Accumulated stop-phase failures.
///
/// Every underlying [`ComponentError`] stays reachable via [`errors`]
/// (and the first one via `source()`).
///
/// [`errors`]: AggregateError::errors
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<ComponentError>,
}

impl AggregateError {
    pub(crate) fn new(errors: Vec<ComponentError>) -> Self {
        Self { errors }
    }

    /// All accumulated component errors, in stop order.
    pub fn errors(&self) -> &[ComponentError] {
        &self.errors
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl Error for AggregateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.errors.first().map(|e| e as &(dyn Error + 'static))
    }
}

/// Errors returned by [`Supervisor::run`](crate::Supervisor::run).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RunError {
    /// The supervisor already ran (or is running); `run` is single-use.
    #[error("application already started")]
    AlreadyStarted,

    /// A component failed to start; previously started components were
    /// rolled back before this was returned.
    #[error("start failed: {0}")]
    Start(#[source] ComponentError),

    /// One or more components failed to stop.
    #[error("stop failed: {0}")]
    Stop(#[source] AggregateError),
}

/// Construction-time validation failures, naming the offending option.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("empty application name")]
    EmptyName,

    #[error("empty hostname")]
    EmptyHostname,

    /// Hostname lookup against the OS failed.
    #[error("os hostname: {reason}")]
    HostnameLookup { reason: String },

    #[error("start timeout must be positive")]
    InvalidStartTimeout,

    #[error("stop timeout must be positive")]
    InvalidStopTimeout,

    /// A registry entry carries an empty display name.
    #[error("component at index {index} has empty name")]
    UnnamedComponent { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_error_format() {
        let err = ComponentError::new("db", Phase::Start, "boom".into());
        assert_eq!(err.to_string(), r#"start component "db": boom"#);
        assert_eq!(err.source().map(|e| e.to_string()), Some("boom".into()));
    }

    #[test]
    fn aggregate_error_joins_causes() {
        let agg = AggregateError::new(vec![
            ComponentError::new("b", Phase::Stop, "second".into()),
            ComponentError::new("a", Phase::Stop, "first".into()),
        ]);
        assert_eq!(
            agg.to_string(),
            "stop component \"b\": second\nstop component \"a\": first"
        );
        assert_eq!(agg.errors().len(), 2);
    }

    #[test]
    fn run_error_start_is_prefixed() {
        let err = RunError::Start(ComponentError::new("kafka", Phase::Start, "broke".into()));
        assert_eq!(
            err.to_string(),
            r#"start failed: start component "kafka": broke"#
        );
    }
}
