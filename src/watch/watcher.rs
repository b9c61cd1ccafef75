// src/watch/watcher.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, warn};

use crate::errors::WatchError;
use crate::fs::FileSystem;
use crate::handle::emitter::lock;
use crate::handle::{Emitter, HandleState, Subscription, WatchHandle};
use crate::registry::Registry;
use crate::types::ChangeEvent;
use crate::watch::readiness::Readiness;
use crate::watch::WatchOptions;

pub type ChangeCallback = Arc<dyn Fn(&[ChangeEvent]) + Send + Sync>;

/// A caller callback and its current subscription on the bound handle.
struct Binding {
    callback: ChangeCallback,
    subscription: Option<Subscription>,
}

#[derive(Default)]
struct WatchState {
    bound: Option<WatchHandle>,
    bindings: BTreeMap<u64, Binding>,
    /// Error / should-detach / will-stop / start listeners on `bound`.
    handle_subscriptions: Vec<Subscription>,
    attaching: bool,
    disposed: bool,
}

struct WatchInner {
    requested_path: PathBuf,
    options: WatchOptions,
    registry: Arc<dyn Registry>,
    canonicalized: Readiness<PathBuf>,
    first_bound: Readiness<()>,
    first_started: Readiness<()>,
    errors: Emitter<WatchError>,
    next_binding: AtomicU64,
    state: Mutex<WatchState>,
}

/// Per-caller watch on one path.
///
/// The backing [`WatchHandle`] is chosen by the registry and may change
/// during the life of the watch; callers only ever see events under their
/// own canonical root. Clones share the same watch. Dropping the last clone
/// disposes it.
#[derive(Clone)]
pub struct Watch {
    inner: Arc<WatchInner>,
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("Watch")
            .field("requested_path", &self.inner.requested_path)
            .field("canonical_path", &self.canonical_path())
            .field("bound", &state.bound.as_ref().map(WatchHandle::id))
            .field("bindings", &state.bindings.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl Watch {
    /// Create a watch and begin resolving `requested_path`.
    pub fn new(
        requested_path: impl Into<PathBuf>,
        options: WatchOptions,
        registry: Arc<dyn Registry>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let requested_path = requested_path.into();
        let watch = Self {
            inner: Arc::new(WatchInner {
                requested_path: requested_path.clone(),
                options,
                registry,
                canonicalized: Readiness::new(),
                first_bound: Readiness::new(),
                first_started: Readiness::new(),
                errors: Emitter::new(),
                next_binding: AtomicU64::new(1),
                state: Mutex::new(WatchState::default()),
            }),
        };

        let canonicalized = watch.inner.canonicalized.clone();
        let resolve = move || {
            let outcome = fs
                .canonicalize(&requested_path)
                .map_err(|e| WatchError::Canonicalize {
                    path: requested_path.clone(),
                    reason: format!("{e:#}"),
                });
            match &outcome {
                Ok(path) => debug!(requested = ?requested_path, canonical = ?path, "canonicalized watch path"),
                Err(err) => warn!(error = %err, "failed to canonicalize watch path"),
            }
            match outcome {
                Ok(path) => canonicalized.resolve(path),
                Err(err) => canonicalized.fail(err),
            };
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(resolve);
            }
            Err(_) => resolve(),
        }

        watch
    }

    pub fn requested_path(&self) -> &Path {
        &self.inner.requested_path
    }

    /// The resolved root, once canonicalization succeeded.
    pub fn canonical_path(&self) -> Option<PathBuf> {
        self.inner.canonicalized.peek().and_then(Result::ok)
    }

    pub fn options(&self) -> &WatchOptions {
        &self.inner.options
    }

    pub fn bound_handle(&self) -> Option<WatchHandle> {
        lock(&self.inner.state).bound.clone()
    }

    /// Number of live caller callbacks.
    pub fn binding_count(&self) -> usize {
        lock(&self.inner.state).bindings.len()
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.inner.state).disposed
    }

    pub async fn canonicalized(&self) -> Result<PathBuf, WatchError> {
        self.inner.canonicalized.wait().await
    }

    pub async fn first_bound(&self) -> Result<(), WatchError> {
        self.inner.first_bound.wait().await
    }

    pub async fn first_started(&self) -> Result<(), WatchError> {
        self.inner.first_started.wait().await
    }

    /// Errors from the bound handle, plus canonicalization and attach
    /// failures.
    pub fn subscribe_errors(
        &self,
        callback: impl Fn(&WatchError) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.errors.subscribe(callback)
    }

    /// Register a callback for changes under this watch's root.
    ///
    /// If no handle is bound yet, the watch asks the registry to attach it
    /// (after canonicalization) and the callback is installed once a handle
    /// has been bound. Only one attach is in flight at a time.
    pub fn subscribe_changes(
        &self,
        callback: impl Fn(&[ChangeEvent]) + Send + Sync + 'static,
    ) -> WatchSubscription {
        let id = self.inner.next_binding.fetch_add(1, Ordering::Relaxed);
        let callback: ChangeCallback = Arc::new(callback);

        let needs_attach = {
            let mut state = lock(&self.inner.state);
            if state.disposed {
                warn!(path = ?self.inner.requested_path, "subscribe on a disposed watch ignored");
                return WatchSubscription::inert();
            }

            let subscription = match (&state.bound, self.canonical_path()) {
                (Some(handle), Some(root)) => {
                    Some(subscribe_filtered(handle, &root, Arc::clone(&callback)))
                }
                _ => None,
            };
            let installed = subscription.is_some();
            state.bindings.insert(
                id,
                Binding {
                    callback,
                    subscription,
                },
            );

            if !installed && !state.attaching {
                state.attaching = true;
                true
            } else {
                false
            }
        };

        if needs_attach {
            self.spawn_attach();
        }

        WatchSubscription {
            watch: Arc::downgrade(&self.inner),
            id,
            disposed: false,
        }
    }

    fn spawn_attach(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(path = ?self.inner.requested_path, "no tokio runtime; cannot attach watch");
            lock(&self.inner.state).attaching = false;
            return;
        };
        let watch = self.clone();
        runtime.spawn(async move { watch.attach_then_install().await });
    }

    /// The deferred half of `subscribe_changes`: wait for the root, let the
    /// registry bind a handle, then install anything still pending.
    async fn attach_then_install(&self) {
        let attached = match self.canonicalized().await {
            Ok(_) => self.inner.registry.attach(self).await,
            Err(err) => Err(err),
        };

        lock(&self.inner.state).attaching = false;

        match attached {
            Ok(()) => self.install_pending(),
            Err(err) => {
                warn!(path = ?self.inner.requested_path, error = %err, "watch could not be attached");
                self.inner.errors.emit(&err);
            }
        }
    }

    /// Subscribe every binding that has no subscription yet onto the bound
    /// handle. No-op when unbound or disposed.
    fn install_pending(&self) {
        let Some(root) = self.canonical_path() else {
            return;
        };
        let mut state = lock(&self.inner.state);
        let WatchState {
            bound, bindings, ..
        } = &mut *state;
        let Some(handle) = bound.as_ref() else {
            return;
        };
        for binding in bindings.values_mut().filter(|b| b.subscription.is_none()) {
            binding.subscription = Some(subscribe_filtered(handle, &root, Arc::clone(&binding.callback)));
        }
    }

    /// Move this watch onto `handle`. Called by the registry.
    ///
    /// Every callback binding is re-subscribed on the new handle, disposing
    /// its previous subscription first so nothing is delivered twice.
    pub fn bind_to_handle(&self, handle: &WatchHandle) {
        let Some(root) = self.canonical_path() else {
            warn!(path = ?self.inner.requested_path, "cannot bind a watch before its path is resolved");
            return;
        };

        let replaced = {
            let mut state = lock(&self.inner.state);
            if state.disposed || state.bound.as_ref() == Some(handle) {
                return;
            }

            let previous = state.bound.replace(handle.clone());
            for binding in state.bindings.values_mut() {
                if let Some(mut old) = binding.subscription.take() {
                    old.dispose();
                }
                binding.subscription =
                    Some(subscribe_filtered(handle, &root, Arc::clone(&binding.callback)));
            }

            debug!(
                root = ?root,
                from = ?previous.as_ref().map(WatchHandle::id),
                to = %handle.id(),
                bindings = state.bindings.len(),
                "bound watch to handle"
            );

            std::mem::replace(&mut state.handle_subscriptions, self.observe(handle, &root))
        };
        drop(replaced);

        if self.inner.first_bound.resolve(()) {
            info!(root = ?root, handle = %handle.id(), "watch bound");
        }
        if handle.state() == HandleState::Running {
            self.inner.first_started.resolve(());
        }
    }

    /// Listeners installed on each newly bound handle. They hold the watch
    /// weakly and never capture the handle itself.
    fn observe(&self, handle: &WatchHandle, root: &Path) -> Vec<Subscription> {
        let weak = Arc::downgrade(&self.inner);
        let handle_id = handle.id();

        let on_error = {
            let weak = weak.clone();
            move |err: &WatchError| {
                if let Some(inner) = weak.upgrade() {
                    inner.errors.emit(err);
                }
            }
        };

        let on_detach = {
            let weak = weak.clone();
            let root = root.to_path_buf();
            move |request: &crate::handle::DetachRequest| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let watch = Watch { inner };
                let already_there = watch.bound_handle().as_ref() == Some(&request.replacement);
                if !already_there && root.starts_with(&request.scope) {
                    debug!(root = ?root, scope = ?request.scope, "reattaching watch");
                    watch.bind_to_handle(&request.replacement);
                }
            }
        };

        // Unbind and release everything held on the stopping handle. The
        // callbacks stay pending and are reinstalled by the next attach.
        let on_will_stop = {
            let weak = weak.clone();
            move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let released = {
                    let mut state = lock(&inner.state);
                    if state.bound.as_ref().map(WatchHandle::id) != Some(handle_id) {
                        return;
                    }
                    debug!(handle = %handle_id, "bound handle stopping; unbinding watch");
                    state.bound = None;
                    let pending: Vec<Subscription> = state
                        .bindings
                        .values_mut()
                        .filter_map(|b| b.subscription.take())
                        .collect();
                    (pending, std::mem::take(&mut state.handle_subscriptions))
                };
                drop(released);
            }
        };

        let on_start = move || {
            if let Some(inner) = weak.upgrade() {
                inner.first_started.resolve(());
            }
        };

        vec![
            handle.subscribe_errors(on_error),
            handle.subscribe_should_detach(on_detach),
            handle.subscribe_will_stop(on_will_stop),
            handle.subscribe_start(on_start),
        ]
    }

    /// Revoke every callback and handle listener. Idempotent.
    pub fn dispose(&self) {
        let released = {
            let mut state = lock(&self.inner.state);
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.bound = None;
            (
                std::mem::take(&mut state.bindings),
                std::mem::take(&mut state.handle_subscriptions),
            )
        };
        debug!(path = ?self.inner.requested_path, bindings = released.0.len(), "disposing watch");
        drop(released);

        self.inner.first_bound.fail(WatchError::Disposed);
        self.inner.first_started.fail(WatchError::Disposed);
    }
}

/// Subscribe `callback` on `handle`, forwarding only events whose old path
/// lies under `root`. Membership is component-wise (`Path::starts_with`), so
/// `/a/bc` is not under `/a/b`, and symlinks are not followed.
fn subscribe_filtered(handle: &WatchHandle, root: &Path, callback: ChangeCallback) -> Subscription {
    let root = root.to_path_buf();
    handle.subscribe_changes(move |batch| {
        let inside: Vec<ChangeEvent> = batch
            .iter()
            .filter(|event| event.old_path().starts_with(&root))
            .cloned()
            .collect();
        if !inside.is_empty() {
            callback(&inside);
        }
    })
}

/// Returned by [`Watch::subscribe_changes`]. Disposing removes the callback
/// from the watch and its subscription from the bound handle. Dropping it
/// without disposing leaves the callback registered until the watch itself
/// is disposed.
pub struct WatchSubscription {
    watch: Weak<WatchInner>,
    id: u64,
    disposed: bool,
}

impl fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("id", &self.id)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl WatchSubscription {
    fn inert() -> Self {
        Self {
            watch: Weak::new(),
            id: 0,
            disposed: true,
        }
    }

    pub fn dispose(&mut self) {
        if std::mem::replace(&mut self.disposed, true) {
            return;
        }
        if let Some(inner) = self.watch.upgrade() {
            let removed = lock(&inner.state).bindings.remove(&self.id);
            drop(removed);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
