//! # Application lifecycle supervisor.

mod builder;
mod signals;
mod state;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use state::State;
pub use supervisor::Supervisor;
