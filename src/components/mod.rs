//! # Lifecycle contract and component registry.

mod lifecycle;
mod registry;

pub use lifecycle::{Lifecycle, LifecycleFn, LifecycleRef};
pub use registry::{Component, Registry};
