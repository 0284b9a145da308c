//! Builder for constructing a [`Supervisor`] with validated options.

use std::sync::Arc;
use std::time::Duration;

use crate::components::{Component, Registry};
use crate::error::BuildError;
use crate::logger::{Log, NopLog};

use super::supervisor::Supervisor;

const DEFAULT_NAME: &str = "application";
const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder with defaults for every option.
///
/// | Option | Default |
/// |---|---|
/// | name | `"application"` |
/// | hostname | OS hostname |
/// | start timeout | 30s |
/// | stop timeout | 30s |
/// | logger | [`NopLog`] |
/// | components | empty |
///
/// All options are validated in [`build`](SupervisorBuilder::build); the
/// returned error names the first offending option.
pub struct SupervisorBuilder {
    name: String,
    hostname: Option<String>,
    start_timeout: Duration,
    stop_timeout: Duration,
    log: Arc<dyn Log>,
    components: Vec<Component>,
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            hostname: None,
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            log: Arc::new(NopLog),
            components: Vec::new(),
        }
    }

    /// Sets the application display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the host identity (defaults to the OS hostname).
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Sets the start-phase deadline.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Sets the stop-phase deadline.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Sets the structured logger.
    pub fn with_logger(mut self, log: Arc<dyn Log>) -> Self {
        self.log = log;
        self
    }

    /// Replaces the component list. Order defines start order.
    pub fn with_components(mut self, components: Vec<Component>) -> Self {
        self.components = components;
        self
    }

    /// Appends a single component.
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// Validates every option and builds the supervisor.
    pub fn build(self) -> Result<Supervisor, BuildError> {
        if self.name.is_empty() {
            return Err(BuildError::EmptyName);
        }
        if self.start_timeout.is_zero() {
            return Err(BuildError::InvalidStartTimeout);
        }
        if self.stop_timeout.is_zero() {
            return Err(BuildError::InvalidStopTimeout);
        }

        let hostname = match self.hostname {
            Some(hostname) => hostname,
            None => hostname::get()
                .map_err(|e| BuildError::HostnameLookup {
                    reason: e.to_string(),
                })?
                .to_string_lossy()
                .into_owned(),
        };
        if hostname.is_empty() {
            return Err(BuildError::EmptyHostname);
        }

        let registry = Registry::new(self.components)?;

        Ok(Supervisor::new_internal(
            self.name,
            hostname,
            self.start_timeout,
            self.stop_timeout,
            self.log,
            registry,
        ))
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::LifecycleFn;
    use crate::context::Context;

    #[test]
    fn defaults_build() {
        let sup = SupervisorBuilder::new().build().expect("defaults are valid");
        assert_eq!(sup.name(), "application");
        assert!(!sup.hostname().is_empty());
    }

    #[test]
    fn validation_names_the_first_offender() {
        assert_eq!(
            SupervisorBuilder::new().with_name("").build().err(),
            Some(BuildError::EmptyName)
        );
        assert_eq!(
            SupervisorBuilder::new()
                .with_start_timeout(Duration::ZERO)
                .build()
                .err(),
            Some(BuildError::InvalidStartTimeout)
        );
        assert_eq!(
            SupervisorBuilder::new()
                .with_stop_timeout(Duration::ZERO)
                .build()
                .err(),
            Some(BuildError::InvalidStopTimeout)
        );
        assert_eq!(
            SupervisorBuilder::new().with_hostname("").build().err(),
            Some(BuildError::EmptyHostname)
        );
    }

    #[test]
    fn rejects_unnamed_components() {
        let bad = Component::new(
            "",
            LifecycleFn::arc(
                |_ctx: Context| async { Ok(()) },
                |_ctx: Context| async { Ok(()) },
            ),
        );
        assert_eq!(
            SupervisorBuilder::new().with_component(bad).build().err(),
            Some(BuildError::UnnamedComponent { index: 0 })
        );
    }
}
