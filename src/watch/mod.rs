// src/watch/mod.rs

//! Per-caller watches.
//!
//! This module is responsible for:
//! - resolving the requested path to its canonical root,
//! - binding to whatever [`crate::handle::WatchHandle`] the registry picks,
//! - filtering shared-handle cross-talk down to the watch's own subtree,
//! - moving callback subscriptions when the registry replaces a handle.
//!
//! It does **not** decide which handle backs which watch; that belongs to
//! [`crate::registry`].

use std::time::Duration;

use crate::session::{SessionOptions, DEFAULT_DEBOUNCE};

pub mod readiness;
pub mod watcher;

pub use readiness::Readiness;
pub use watcher::{ChangeCallback, Watch, WatchSubscription};

/// Options recognised by the core. Anything else belongs to the registry's
/// sharing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Debounce window passed through to the native session.
    pub debounce: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl WatchOptions {
    pub fn with_debounce(debounce: Duration) -> Self {
        Self { debounce }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            debounce: self.debounce,
        }
    }
}
