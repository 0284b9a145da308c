//! Run-state cell: `Idle -> Running -> Terminated`, one way only.

use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const TERMINATED: u8 = 2;

/// Lifecycle position of the supervisor as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    Terminated,
}

/// Atomic holder for the supervisor's run state.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(IDLE))
    }

    /// Attempts the `Idle -> Running` transition. False when the supervisor
    /// already ran (or is running).
    pub(crate) fn try_start(&self) -> bool {
        self.0
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Marks the supervisor terminated. The cell never leaves this state.
    pub(crate) fn terminate(&self) {
        self.0.store(TERMINATED, Ordering::Release);
    }

    pub(crate) fn state(&self) -> State {
        match self.0.load(Ordering::Acquire) {
            IDLE => State::Idle,
            RUNNING => State::Running,
            _ => State::Terminated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_single_shot() {
        let cell = StateCell::new();
        assert_eq!(cell.state(), State::Idle);
        assert!(cell.try_start());
        assert!(!cell.try_start());
        assert_eq!(cell.state(), State::Running);

        cell.terminate();
        assert!(!cell.try_start());
        assert_eq!(cell.state(), State::Terminated);
    }
}
