// src/lib.rs

//! Shared filesystem watching.
//!
//! Many independent [`Watch`]es share a small number of native watch
//! sessions ([`WatchHandle`]s). The [`registry`] decides which handle backs
//! which watch and may move watches between handles at any time; watches
//! keep delivering only the changes under their own root.

pub mod cli;
pub mod config;
pub mod errors;
pub mod fs;
pub mod handle;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod session;
pub mod types;
pub mod watch;

use std::io::Write;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::{load_or_default, ConfigFile, RawConfigFile, WatcherSection};
use crate::errors::Result;

pub use crate::errors::{WatchError, WatchpoolError};
pub use crate::handle::{HandleState, WatchHandle};
pub use crate::manager::{ManagerConfig, WatchManager};
pub use crate::types::{ChangeEvent, ChangeKind};
pub use crate::watch::{Watch, WatchOptions, WatchSubscription};

/// Watch `root_path` through the process-scoped manager.
///
/// `event_callback` receives non-empty batches of changes under the
/// canonical form of `root_path`. Errors never surface here; subscribe to
/// them with [`Watch::subscribe_errors`].
pub fn watch_path(
    root_path: impl Into<PathBuf>,
    options: WatchOptions,
    event_callback: impl Fn(&[ChangeEvent]) + Send + Sync + 'static,
) -> Watch {
    WatchManager::global().create_watch(root_path, options, event_callback)
}

/// Stop every handle of the process-scoped manager and wait until all of
/// them are stopped.
pub async fn stop_all_watchers() {
    if let Some(manager) = WatchManager::try_global() {
        manager.stop_all().await;
    }
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the process-scoped manager
/// - one watch per CLI path, printing changes as JSON lines
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_or_default(args.config.as_deref())?;
    if let Some(debounce_ms) = args.debounce_ms {
        cfg = ConfigFile::try_from(RawConfigFile {
            watcher: WatcherSection {
                debounce_ms,
                ..cfg.watcher.clone()
            },
        })?;
    }

    let manager = WatchManager::new(ManagerConfig::from(&cfg));
    WatchManager::set_global(manager.clone());
    let options = manager.default_options();

    let mut watches = Vec::with_capacity(args.paths.len());
    let mut error_subscriptions = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let watch = manager.create_watch(path.clone(), options, print_batch);
        let requested = path.clone();
        error_subscriptions.push(watch.subscribe_errors(move |err| {
            warn!(path = ?requested, error = %err, "watch error");
        }));

        let root = watch.canonicalized().await?;
        info!(requested = ?path, root = ?root, "watching");
        watches.push(watch);
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested; stopping watchers");

    for watch in &watches {
        watch.dispose();
    }
    drop(error_subscriptions);
    manager.stop_all().await;
    Ok(())
}

/// Print each change as one JSON line on stdout.
fn print_batch(batch: &[ChangeEvent]) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for event in batch {
        match serde_json::to_string(event) {
            Ok(line) => {
                if let Err(err) = writeln!(out, "{line}") {
                    warn!(error = %err, "failed to write change event");
                    return;
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize change event"),
        }
    }
}
