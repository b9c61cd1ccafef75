// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::watch::WatchOptions;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [watcher]
/// debounce_ms = 100
/// max_handles = 64
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watcher: WatcherSection,
}

/// `[watcher]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatcherSection {
    /// Debounce window handed to native sessions, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Soft cap on concurrently live handles. Exceeding it is logged, never
    /// enforced.
    #[serde(default)]
    pub max_handles: Option<usize>,
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_handles: None,
        }
    }
}

/// Validated configuration. Build it through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigFile {
    pub watcher: WatcherSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(watcher: WatcherSection) -> Self {
        Self { watcher }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watcher.debounce_ms)
    }

    /// Per-watch options derived from the `[watcher]` defaults.
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions::with_debounce(self.debounce())
    }
}
