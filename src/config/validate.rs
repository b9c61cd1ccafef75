// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, WatchpoolError};

/// Largest accepted debounce window (one minute).
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::WatchpoolError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.watcher))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_debounce(cfg)?;
    validate_max_handles(cfg)?;
    Ok(())
}

fn validate_debounce(cfg: &RawConfigFile) -> Result<()> {
    let ms = cfg.watcher.debounce_ms;
    if ms == 0 || ms > MAX_DEBOUNCE_MS {
        return Err(WatchpoolError::ConfigError(format!(
            "[watcher].debounce_ms must be in 1..={MAX_DEBOUNCE_MS} (got {ms})"
        )));
    }
    Ok(())
}

fn validate_max_handles(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watcher.max_handles == Some(0) {
        return Err(WatchpoolError::ConfigError(
            "[watcher].max_handles must be >= 1 when set (got 0)".to_string(),
        ));
    }
    Ok(())
}
