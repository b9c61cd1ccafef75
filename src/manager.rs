// src/manager.rs

//! Process-wide watch manager.
//!
//! The manager owns one registry whose handle factory also tracks every
//! created handle in a live set. A handle leaves the set when it reports
//! stop and rejoins it whenever it reports start, so a restarted handle is
//! never invisible to `stop_all`. The manager is the entry point for
//! creating watches and for bulk teardown.
//!
//! A process-scoped instance is built lazily by [`WatchManager::global`];
//! [`WatchManager::reset_global`] stops and drops it so tests start clean.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::fs::{FileSystem, RealFileSystem};
use crate::handle::emitter::lock;
use crate::handle::{HandleId, HandleState, WatchHandle};
use crate::registry::{HandleFactory, NestingRegistry, Registry};
use crate::session::{NotifySessionFactory, SessionFactory};
use crate::types::ChangeEvent;
use crate::watch::{Watch, WatchOptions};

/// Rounds of stop attempts in `stop_all` before giving up on handles that
/// keep getting restarted.
const STOP_ALL_ROUNDS: usize = 3;

/// Manager-level settings.
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    /// Options used by [`crate::watch_path`] callers that pass defaults.
    pub default_options: WatchOptions,
    /// Soft cap on live handles; exceeding it is only logged.
    pub max_handles: Option<usize>,
}

impl From<&ConfigFile> for ManagerConfig {
    fn from(cfg: &ConfigFile) -> Self {
        Self {
            default_options: cfg.watch_options(),
            max_handles: cfg.watcher.max_handles,
        }
    }
}

type LiveHandles = Arc<Mutex<HashMap<HandleId, WatchHandle>>>;

struct ManagerInner {
    config: ManagerConfig,
    registry: Arc<dyn Registry>,
    fs: Arc<dyn FileSystem>,
    live: LiveHandles,
}

#[derive(Clone)]
pub struct WatchManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for WatchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchManager")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("live_handles", &self.live_handle_count())
            .finish()
    }
}

static GLOBAL: Mutex<Option<WatchManager>> = Mutex::new(None);

impl WatchManager {
    /// Manager backed by native `notify` sessions and the real filesystem.
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(NotifySessionFactory::new()),
            Arc::new(RealFileSystem),
        )
    }

    /// Manager with injected session factory and filesystem.
    pub fn with_parts(
        config: ManagerConfig,
        sessions: Arc<dyn SessionFactory>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let live: LiveHandles = Arc::new(Mutex::new(HashMap::new()));

        let factory: HandleFactory = {
            let live = Arc::clone(&live);
            let max_handles = config.max_handles;
            Arc::new(move |root, options| {
                let handle = WatchHandle::new(root, options.session_options(), Arc::clone(&sessions));
                track(&live, &handle, max_handles);
                handle
            })
        };

        Self {
            inner: Arc::new(ManagerInner {
                config,
                registry: Arc::new(NestingRegistry::new(factory)),
                fs,
                live,
            }),
        }
    }

    /// The process-scoped manager, built with defaults on first use.
    pub fn global() -> WatchManager {
        lock(&GLOBAL)
            .get_or_insert_with(|| {
                debug!("initialising global watch manager");
                WatchManager::new(ManagerConfig::default())
            })
            .clone()
    }

    /// Replace the process-scoped manager. Returns the previous one, which is
    /// not stopped.
    pub fn set_global(manager: WatchManager) -> Option<WatchManager> {
        lock(&GLOBAL).replace(manager)
    }

    /// The process-scoped manager if one has been built.
    pub fn try_global() -> Option<WatchManager> {
        lock(&GLOBAL).clone()
    }

    /// Stop every handle of the process-scoped manager and drop it.
    pub async fn reset_global() {
        let previous = lock(&GLOBAL).take();
        if let Some(manager) = previous {
            manager.stop_all().await;
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn default_options(&self) -> WatchOptions {
        self.inner.config.default_options
    }

    pub fn registry(&self) -> Arc<dyn Registry> {
        Arc::clone(&self.inner.registry)
    }

    /// Build a watch for `path` and subscribe `callback` to it. The caller
    /// owns the watch and disposes it.
    pub fn create_watch(
        &self,
        path: impl Into<PathBuf>,
        options: WatchOptions,
        callback: impl Fn(&[ChangeEvent]) + Send + Sync + 'static,
    ) -> Watch {
        let watch = Watch::new(
            path,
            options,
            Arc::clone(&self.inner.registry),
            Arc::clone(&self.inner.fs),
        );
        // Lives until the watch is disposed.
        let _subscription = watch.subscribe_changes(callback);
        debug!(path = ?watch.requested_path(), "created watch");
        watch
    }

    pub fn live_handles(&self) -> Vec<WatchHandle> {
        lock(&self.inner.live).values().cloned().collect()
    }

    pub fn live_handle_count(&self) -> usize {
        lock(&self.inner.live).len()
    }

    /// Stop every live handle concurrently and wait until all are stopped.
    ///
    /// Meant for full teardown (end of tests, process exit), not for steady
    /// state.
    pub async fn stop_all(&self) {
        for round in 1..=STOP_ALL_ROUNDS {
            let handles = self.live_handles();
            if handles.is_empty() {
                break;
            }
            info!(round, handles = handles.len(), "stopping all watch handles");

            let mut tasks = JoinSet::new();
            for handle in handles {
                tasks.spawn(async move {
                    if handle.settled().await == HandleState::Running {
                        if let Err(err) = handle.stop().await {
                            warn!(handle = %handle.id(), error = %err, "handle stopped with error");
                        }
                    }
                });
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    warn!(error = %err, "stop task failed");
                }
            }

            // Handles that never started are already stopped; forget them too.
            let removed: Vec<WatchHandle> = {
                let mut live = lock(&self.inner.live);
                let stopped: Vec<HandleId> = live
                    .iter()
                    .filter(|(_, handle)| handle.state() == HandleState::Stopped)
                    .map(|(id, _)| *id)
                    .collect();
                stopped.iter().filter_map(|id| live.remove(id)).collect()
            };
            drop(removed);
        }

        let remaining = self.live_handle_count();
        if remaining > 0 {
            warn!(remaining, "some watch handles were restarted during stop_all");
        }
    }
}

/// Insert `handle` into the live set now and on every start signal, and
/// remove it on every stop signal. The listeners live as long as the handle
/// and only hold it weakly.
fn track(live: &LiveHandles, handle: &WatchHandle, max_handles: Option<usize>) {
    insert_live(live, handle, max_handles);

    let on_start = {
        let live = Arc::downgrade(live);
        let weak = handle.downgrade();
        move || {
            let (Some(live), Some(handle)) = (live.upgrade(), weak.upgrade()) else {
                return;
            };
            if insert_live(&live, &handle, max_handles) {
                debug!(handle = %handle.id(), "restarted handle rejoined the live set");
            }
        }
    };
    handle.subscribe_start(on_start).keep_alive();

    let on_stop = {
        let live = Arc::downgrade(live);
        let id = handle.id();
        move || {
            let Some(live) = live.upgrade() else {
                return;
            };
            let removed = lock(&live).remove(&id);
            if removed.is_some() {
                debug!(handle = %id, "handle left the live set");
            }
        }
    };
    handle.subscribe_stop(on_stop).keep_alive();
}

/// Returns `true` if the handle was not already live.
fn insert_live(live: &LiveHandles, handle: &WatchHandle, max_handles: Option<usize>) -> bool {
    let (inserted, count) = {
        let mut live = lock(live);
        let inserted = live.insert(handle.id(), handle.clone()).is_none();
        (inserted, live.len())
    };

    if let Some(max) = max_handles {
        if inserted && count > max {
            warn!(live = count, max, "live watch handles above configured maximum");
        }
    }
    inserted
}
