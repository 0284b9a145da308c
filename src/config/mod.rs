//! # Layered configuration scanner.
//!
//! A [`Scanner`] applies an ordered list of [`Source`]s to build one merged
//! configuration tree, then deserializes it into the target struct. Later
//! sources override the fields they recognise; any parse failure aborts the
//! scan.
//!
//! Sources:
//! - [`Source::defaults`] - the serialized form of a defaults struct
//!   (typically `T::default()`, whose impl carries the default expressions).
//! - [`Source::env`] - walks the tree built so far; a leaf at path `db.host`
//!   is overridden by `PREFIX_DB_HOST` when that variable is set and
//!   non-empty, parsed according to the leaf's current type.
//! - [`Source::yaml_file`] - decodes a YAML file and merges it.
//!
//! ```no_run
//! use serde::Deserialize;
//! use appvisor::config::{ScanError, Scanner, Source};
//!
//! #[derive(Deserialize, Default, serde::Serialize)]
//! struct Conf {
//!     host: String,
//!     port: u16,
//! }
//!
//! # fn main() -> Result<(), ScanError> {
//! let conf: Conf = Scanner::new()
//!     .with(Source::defaults(&Conf::default()))
//!     .with(Source::env("APP"))
//!     .with(Source::yaml_file("config.yaml"))
//!     .scan()?;
//! # let _ = conf;
//! # Ok(())
//! # }
//! ```

pub mod duration;

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Errors aborting a scan.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("serialize defaults: {reason}")]
    Defaults { reason: String },

    #[error("parse env {var}={value:?}: {reason}")]
    Env {
        var: String,
        value: String,
        reason: String,
    },
}

/// One layer of configuration.
pub enum Source {
    Defaults(Value),
    Env { prefix: String },
    YamlFile(PathBuf),
    /// Defaults whose serialization failed; surfaces at scan time.
    Invalid(String),
}

impl Source {
    /// Layer holding the serialized form of `value`.
    pub fn defaults<T: Serialize>(value: &T) -> Self {
        match serde_yaml::to_value(value) {
            Ok(value) => Source::Defaults(value),
            Err(err) => Source::Invalid(err.to_string()),
        }
    }

    /// Layer reading `PREFIX_`-prefixed environment variables.
    ///
    /// An empty prefix reads bare path-derived names.
    pub fn env(prefix: impl Into<String>) -> Self {
        Source::Env {
            prefix: prefix.into(),
        }
    }

    /// Layer decoding a YAML file.
    pub fn yaml_file(path: impl Into<PathBuf>) -> Self {
        Source::YamlFile(path.into())
    }
}

/// Ordered application of configuration sources.
#[derive(Default)]
pub struct Scanner {
    sources: Vec<Source>,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source. Order matters: later sources override.
    pub fn with(mut self, source: Source) -> Self {
        self.sources.push(source);
        self
    }

    /// Folds every source into one tree and deserializes the target.
    pub fn scan<T: DeserializeOwned>(&self) -> Result<T, ScanError> {
        let mut acc = Value::Mapping(Mapping::new());

        for source in &self.sources {
            match source {
                Source::Defaults(value) => merge(&mut acc, value.clone()),
                Source::YamlFile(path) => {
                    let text = std::fs::read_to_string(path).map_err(|source| ScanError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    let value: Value = serde_yaml::from_str(&text)?;
                    merge(&mut acc, value);
                }
                Source::Env { prefix } => {
                    let mut path = Vec::new();
                    apply_env(prefix, &mut acc, &mut path)?;
                }
                Source::Invalid(reason) => {
                    return Err(ScanError::Defaults {
                        reason: reason.clone(),
                    })
                }
            }
        }

        Ok(serde_yaml::from_value(acc)?)
    }
}

/// Recursive map merge; `layer` wins on scalar collisions, `Null` never
/// erases an existing value.
fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn apply_env(prefix: &str, node: &mut Value, path: &mut Vec<String>) -> Result<(), ScanError> {
    if let Value::Mapping(map) = node {
        for (key, value) in map.iter_mut() {
            if let Value::String(segment) = key {
                path.push(segment.clone());
                apply_env(prefix, value, path)?;
                path.pop();
            }
        }
        return Ok(());
    }

    let var = var_name(prefix, path);
    let raw = match std::env::var(&var) {
        Ok(raw) if !raw.is_empty() => raw,
        _ => return Ok(()),
    };

    *node = parse_scalar(node, &raw).map_err(|reason| ScanError::Env {
        var,
        value: raw.clone(),
        reason,
    })?;
    Ok(())
}

fn var_name(prefix: &str, path: &[String]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(path.len() + 1);
    if !prefix.is_empty() {
        parts.push(prefix.to_string());
    }
    parts.extend(path.iter().cloned());
    parts
        .join("_")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Parses `raw` according to the type the slot currently holds.
fn parse_scalar(current: &Value, raw: &str) -> Result<Value, String> {
    match current {
        Value::Bool(_) => {
            if raw.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if raw.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err("expected true or false".to_string())
            }
        }
        Value::Number(n) => {
            if n.is_f64() {
                let f: f64 = raw.parse().map_err(|_| "expected a float".to_string())?;
                Ok(Value::Number(f.into()))
            } else if n.is_u64() {
                let u: u64 = raw
                    .parse()
                    .map_err(|_| "expected an unsigned integer".to_string())?;
                Ok(Value::Number(u.into()))
            } else {
                let i: i64 = raw.parse().map_err(|_| "expected an integer".to_string())?;
                Ok(Value::Number(i.into()))
            }
        }
        Value::String(_) | Value::Null => Ok(Value::String(raw.to_string())),
        Value::Sequence(_) => Ok(Value::Sequence(
            raw.split(',')
                .map(|item| Value::String(item.trim().to_string()))
                .collect(),
        )),
        other => Err(format!("unsupported type: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Nested {
        host: String,
        port: u16,
        ssl: bool,
        #[serde(with = "duration")]
        timeout: Duration,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Conf {
        name: String,
        workers: u64,
        ratio: f64,
        db: Nested,
    }

    impl Default for Conf {
        fn default() -> Self {
            Self {
                name: "svc".into(),
                workers: 4,
                ratio: 0.5,
                db: Nested {
                    host: "localhost".into(),
                    port: 5432,
                    ssl: false,
                    timeout: Duration::from_secs(5),
                },
            }
        }
    }

    #[test]
    fn defaults_alone() {
        let conf: Conf = Scanner::new()
            .with(Source::defaults(&Conf::default()))
            .scan()
            .unwrap();
        assert_eq!(conf, Conf::default());
    }

    #[test]
    fn yaml_overrides_defaults() {
        let dir = std::env::temp_dir().join("appvisor-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("override.yaml");
        std::fs::write(&path, "db:\n  host: db.internal\n  timeout: 30s\n").unwrap();

        let conf: Conf = Scanner::new()
            .with(Source::defaults(&Conf::default()))
            .with(Source::yaml_file(&path))
            .scan()
            .unwrap();

        assert_eq!(conf.db.host, "db.internal");
        assert_eq!(conf.db.timeout, Duration::from_secs(30));
        // untouched by the file
        assert_eq!(conf.db.port, 5432);
        assert_eq!(conf.workers, 4);
    }

    #[test]
    fn env_overrides_by_path() {
        std::env::set_var("APPVISOR_TEST_DB_PORT", "6432");
        std::env::set_var("APPVISOR_TEST_DB_SSL", "TRUE");
        std::env::set_var("APPVISOR_TEST_DB_TIMEOUT", "10s");
        std::env::set_var("APPVISOR_TEST_RATIO", "0.75");
        // empty values leave the field untouched
        std::env::set_var("APPVISOR_TEST_NAME", "");

        let conf: Conf = Scanner::new()
            .with(Source::defaults(&Conf::default()))
            .with(Source::env("APPVISOR_TEST"))
            .scan()
            .unwrap();

        assert_eq!(conf.db.port, 6432);
        assert!(conf.db.ssl);
        assert_eq!(conf.db.timeout, Duration::from_secs(10));
        assert_eq!(conf.ratio, 0.75);
        assert_eq!(conf.name, "svc");
    }

    #[test]
    fn bad_env_value_aborts() {
        std::env::set_var("APPVISOR_BAD_WORKERS", "many");
        let err = Scanner::new()
            .with(Source::defaults(&Conf::default()))
            .with(Source::env("APPVISOR_BAD"))
            .scan::<Conf>()
            .unwrap_err();
        assert!(matches!(err, ScanError::Env { .. }));
    }

    #[test]
    fn missing_file_aborts() {
        let err = Scanner::new()
            .with(Source::yaml_file("/nonexistent/appvisor.yaml"))
            .scan::<Conf>()
            .unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }
}
