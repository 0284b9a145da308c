//! Subscriber configuration and installation for [`TracingLog`].
//!
//! [`init`] wires a [`tracing_subscriber`] registry: a reloadable level
//! filter (so [`Handle::set_level`] can change verbosity at runtime) plus a
//! JSON or text formatting layer.
//!
//! [`TracingLog`]: super::TracingLog

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;

pub const LEVEL_DEBUG: &str = "debug";
pub const LEVEL_INFO: &str = "info";
pub const LEVEL_WARN: &str = "warn";
pub const LEVEL_ERROR: &str = "error";

pub const ENCODING_JSON: &str = "json";
pub const ENCODING_TEXT: &str = "text";

/// Errors raised while configuring the subscriber.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("invalid log level {value:?}, must be one of debug, info, warn, error")]
    InvalidLevel { value: String },

    #[error("invalid log encoding {value:?}, must be one of json, text")]
    InvalidEncoding { value: String },

    /// A global subscriber is already installed.
    #[error("install subscriber: {reason}")]
    Init { reason: String },

    #[error("reload level filter: {reason}")]
    Reload { reason: String },
}

/// Logger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Minimum level to capture: debug, info, warn, error.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format: json or text.
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Colored output, text encoding only.
    #[serde(default)]
    pub colorize: bool,
}

fn default_level() -> String {
    LEVEL_INFO.to_string()
}

fn default_encoding() -> String {
    ENCODING_JSON.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: default_level(),
            encoding: default_encoding(),
            colorize: false,
        }
    }
}

impl Config {
    /// Debug level, text encoding, colored output.
    pub fn development() -> Self {
        Self {
            level: LEVEL_DEBUG.to_string(),
            encoding: ENCODING_TEXT.to_string(),
            colorize: true,
        }
    }

    pub fn validate(&self) -> Result<(), LoggerError> {
        parse_level(&self.level)?;
        match self.encoding.as_str() {
            ENCODING_JSON | ENCODING_TEXT => Ok(()),
            other => Err(LoggerError::InvalidEncoding {
                value: other.to_string(),
            }),
        }
    }
}

fn parse_level(level: &str) -> Result<LevelFilter, LoggerError> {
    match level {
        LEVEL_DEBUG => Ok(LevelFilter::DEBUG),
        LEVEL_INFO => Ok(LevelFilter::INFO),
        LEVEL_WARN => Ok(LevelFilter::WARN),
        LEVEL_ERROR => Ok(LevelFilter::ERROR),
        other => Err(LoggerError::InvalidLevel {
            value: other.to_string(),
        }),
    }
}

/// Handle to the installed subscriber.
pub struct Handle {
    reload: reload::Handle<LevelFilter, Registry>,
}

impl Handle {
    /// Changes the capture level at runtime.
    pub fn set_level(&self, level: &str) -> Result<(), LoggerError> {
        let filter = parse_level(level)?;
        self.reload.reload(filter).map_err(|e| LoggerError::Reload {
            reason: e.to_string(),
        })
    }
}

/// Installs the global subscriber described by `cfg`.
///
/// Fails if the configuration is invalid or a global subscriber is already
/// installed (tests and embedding hosts may own one).
pub fn init(cfg: &Config) -> Result<Handle, LoggerError> {
    cfg.validate()?;

    let level = parse_level(&cfg.level)?;
    let (filter, handle) = reload::Layer::new(level);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match cfg.encoding.as_str() {
        ENCODING_JSON => registry
            .with(tracing_subscriber::fmt::layer().json().with_ansi(false))
            .try_init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().with_ansi(cfg.colorize))
            .try_init(),
    };

    installed.map_err(|e| LoggerError::Init {
        reason: e.to_string(),
    })?;
    Ok(Handle { reload: handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_production_shaped() {
        let cfg = Config::default();
        assert_eq!(cfg.level, LEVEL_INFO);
        assert_eq!(cfg.encoding, ENCODING_JSON);
        assert!(!cfg.colorize);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_level_and_encoding() {
        let mut cfg = Config::default();
        cfg.level = "verbose".into();
        assert!(matches!(
            cfg.validate(),
            Err(LoggerError::InvalidLevel { .. })
        ));

        let mut cfg = Config::default();
        cfg.encoding = "logfmt".into();
        assert!(matches!(
            cfg.validate(),
            Err(LoggerError::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn development_preset_is_valid() {
        let cfg = Config::development();
        assert_eq!(cfg.level, LEVEL_DEBUG);
        assert_eq!(cfg.encoding, ENCODING_TEXT);
        assert!(cfg.colorize);
        assert!(cfg.validate().is_ok());
    }
}
