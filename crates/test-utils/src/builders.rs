#![allow(dead_code)]

use std::path::{Path, PathBuf};

use watchpool::config::{ConfigFile, RawConfigFile, WatcherSection};
use watchpool::types::{action, RawEvent};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                watcher: WatcherSection::default(),
            },
        }
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.watcher.debounce_ms = ms;
        self
    }

    pub fn max_handles(mut self, max: usize) -> Self {
        self.config.watcher.max_handles = Some(max);
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for native `RawEvent` records.
pub struct RawEventBuilder {
    event: RawEvent,
}

impl RawEventBuilder {
    pub fn new(action: u32, directory: impl Into<PathBuf>) -> Self {
        Self {
            event: RawEvent {
                action,
                directory: directory.into(),
                file: None,
                old_file: None,
                new_file: None,
                new_directory: None,
            },
        }
    }

    pub fn file(mut self, name: &str) -> Self {
        self.event.file = Some(name.to_string());
        self
    }

    pub fn old_file(mut self, name: &str) -> Self {
        self.event.old_file = Some(name.to_string());
        self
    }

    pub fn new_file(mut self, name: &str) -> Self {
        self.event.new_file = Some(name.to_string());
        self
    }

    pub fn new_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.event.new_directory = Some(dir.into());
        self
    }

    pub fn build(self) -> RawEvent {
        self.event
    }
}

pub fn created(path: impl AsRef<Path>) -> RawEvent {
    RawEvent::for_path(action::CREATED, path.as_ref())
}

pub fn modified(path: impl AsRef<Path>) -> RawEvent {
    RawEvent::for_path(action::MODIFIED, path.as_ref())
}

pub fn deleted(path: impl AsRef<Path>) -> RawEvent {
    RawEvent::for_path(action::DELETED, path.as_ref())
}

pub fn renamed(from: impl AsRef<Path>, to: impl AsRef<Path>) -> RawEvent {
    RawEvent::rename(from.as_ref(), to.as_ref())
}
