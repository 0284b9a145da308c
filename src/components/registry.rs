//! # Ordered registry of named lifecycle components.
//!
//! The registry is inert: it supplies forward iteration for the start
//! phase, reverse iteration for the stop phase, and first-match lookup for
//! rollback. All scheduling lives in the supervisor.

use std::sync::Arc;

use crate::components::lifecycle::LifecycleRef;
use crate::error::BuildError;

/// A lifecycle implementation paired with a non-empty display name.
///
/// Names are not required to be unique; [`Registry::by_name`] returns the
/// first match.
#[derive(Clone)]
pub struct Component {
    name: Arc<str>,
    inner: LifecycleRef,
}

impl Component {
    pub fn new(name: impl Into<String>, inner: LifecycleRef) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name.as_str()),
            inner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying lifecycle handle.
    pub fn lifecycle(&self) -> &LifecycleRef {
        &self.inner
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component").field("name", &self.name).finish()
    }
}

/// Ordered component list. Entry order defines start order; reverse order
/// defines stop order.
#[derive(Default, Debug)]
pub struct Registry {
    entries: Vec<Component>,
}

impl Registry {
    /// Builds a registry, rejecting entries with empty display names.
    pub fn new(entries: Vec<Component>) -> Result<Self, BuildError> {
        for (index, entry) in entries.iter().enumerate() {
            if entry.name().is_empty() {
                return Err(BuildError::UnnamedComponent { index });
            }
        }
        Ok(Self { entries })
    }

    /// Components in start order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Component> {
        self.entries.iter()
    }

    /// First component whose display name equals `name`.
    pub fn by_name(&self, name: &str) -> Option<&Component> {
        self.entries.iter().find(|c| c.name() == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::lifecycle::LifecycleFn;
    use crate::context::Context;

    fn noop(name: &str) -> Component {
        Component::new(
            name,
            LifecycleFn::arc(
                |_ctx: Context| async { Ok(()) },
                |_ctx: Context| async { Ok(()) },
            ),
        )
    }

    #[test]
    fn rejects_empty_names() {
        let err = Registry::new(vec![noop("a"), noop("")]).unwrap_err();
        assert_eq!(err, BuildError::UnnamedComponent { index: 1 });
    }

    #[test]
    fn iteration_preserves_declaration_order() {
        let reg = Registry::new(vec![noop("a"), noop("b"), noop("c")]).unwrap();
        let forward: Vec<_> = reg.iter().map(|c| c.name().to_string()).collect();
        let reverse: Vec<_> = reg.iter().rev().map(|c| c.name().to_string()).collect();
        assert_eq!(forward, ["a", "b", "c"]);
        assert_eq!(reverse, ["c", "b", "a"]);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn by_name_returns_first_match() {
        let reg = Registry::new(vec![noop("dup"), noop("dup"), noop("other")]).unwrap();
        assert!(reg.by_name("dup").is_some());
        assert!(reg.by_name("missing").is_none());
    }
}
