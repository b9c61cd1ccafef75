// src/handle/state.rs

//! Pure lifecycle state machine of a watch handle.
//!
//! The only legal path is `Stopped -> Starting -> Running -> Stopping ->
//! Stopped`, plus `Starting -> Stopped` when the native session fails to
//! open. Everything else is rejected by [`HandleState::apply`].

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Inputs that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BeginStart,
    StartSucceeded,
    StartFailed,
    BeginStop,
    StopFinished,
}

impl HandleState {
    /// Next state for `transition`, or `None` if it is not legal from here.
    pub fn apply(self, transition: Transition) -> Option<HandleState> {
        use HandleState::*;
        use Transition::*;

        match (self, transition) {
            (Stopped, BeginStart) => Some(Starting),
            (Starting, StartSucceeded) => Some(Running),
            (Starting, StartFailed) => Some(Stopped),
            (Running, BeginStop) => Some(Stopping),
            (Stopping, StopFinished) => Some(Stopped),
            _ => None,
        }
    }

    /// True when no transition is in flight.
    pub fn is_settled(self) -> bool {
        matches!(self, HandleState::Stopped | HandleState::Running)
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandleState::Stopped => "stopped",
            HandleState::Starting => "starting",
            HandleState::Running => "running",
            HandleState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}
