// src/errors.rs

//! Crate-wide error types.
//!
//! - [`WatchError`] is the runtime error shape. It is `Clone` because the same
//!   error fans out to every error subscriber of a handle and is stored in
//!   readiness signals.
//! - [`WatchpoolError`] covers configuration and process-level failures.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    #[error("Cannot resolve watch path {path:?}: {reason}")]
    Canonicalize { path: PathBuf, reason: String },

    #[error("Failed to start watch session on {path:?}: {reason}")]
    SessionStart { path: PathBuf, reason: String },

    #[error("Watch session error on {path:?}: {reason}")]
    Session { path: PathBuf, reason: String },

    #[error("Watch was disposed")]
    Disposed,

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        let path = e.paths.first().cloned().unwrap_or_default();
        WatchError::Session {
            path,
            reason: e.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum WatchpoolError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WatchpoolError>;
