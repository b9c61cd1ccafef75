// src/handle/mod.rs

//! Watch handles: one native session each, shared by any number of
//! [`crate::watch::Watch`]es.
//!
//! A handle owns:
//! - the lifecycle state machine ([`state`]),
//! - the native session while running,
//! - one [`Emitter`] per signal kind (changes, errors, start, will-stop,
//!   stop, should-detach).
//!
//! Start/stop follow change subscriptions: the 0 -> 1 and 1 -> 0 transitions
//! of the change subscriber count schedule a reconcile step, which waits for
//! any in-flight transition and then starts or stops as the count demands.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::WatchError;
use crate::session::{Session, SessionFactory, SessionMessage, SessionOptions, SessionSink};
use crate::types::{ChangeEvent, RawEvent};

pub mod convert;
pub mod emitter;
pub mod state;

pub use emitter::{Emitter, Subscription};
pub use state::{HandleState, Transition};

use emitter::lock;

/// Process-unique handle identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Payload of the should-detach signal.
#[derive(Debug, Clone)]
pub struct DetachRequest {
    /// Handle that watches under `scope` should move to.
    pub replacement: WatchHandle,
    /// Only watches rooted at or below this path are affected.
    pub scope: PathBuf,
}

struct ActiveSession {
    session: Box<dyn Session>,
    dispatcher: JoinHandle<()>,
}

struct HandleInner {
    id: HandleId,
    canonical_path: PathBuf,
    options: SessionOptions,
    factory: Arc<dyn SessionFactory>,
    state: watch::Sender<HandleState>,
    session: Mutex<Option<ActiveSession>>,
    changes: Emitter<Vec<ChangeEvent>>,
    errors: Emitter<WatchError>,
    started: Emitter<()>,
    will_stop: Emitter<()>,
    stopped: Emitter<()>,
    should_detach: Emitter<DetachRequest>,
}

/// Shared, cheaply clonable reference to one native watch session.
#[derive(Clone)]
pub struct WatchHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.inner.id)
            .field("canonical_path", &self.inner.canonical_path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PartialEq for WatchHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for WatchHandle {}

/// Non-owning reference to a [`WatchHandle`], for listeners installed on the
/// handle itself.
#[derive(Clone)]
pub struct WeakWatchHandle {
    inner: Weak<HandleInner>,
}

impl WeakWatchHandle {
    pub fn upgrade(&self) -> Option<WatchHandle> {
        self.inner.upgrade().map(|inner| WatchHandle { inner })
    }
}

impl WatchHandle {
    /// Create a stopped handle. `canonical_path` must already be resolved.
    pub fn new(
        canonical_path: impl Into<PathBuf>,
        options: SessionOptions,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        let (state, _) = watch::channel(HandleState::Stopped);
        let id = HandleId(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed));
        let canonical_path = canonical_path.into();
        debug!(handle = %id, path = ?canonical_path, "created watch handle");

        Self {
            inner: Arc::new(HandleInner {
                id,
                canonical_path,
                options,
                factory,
                state,
                session: Mutex::new(None),
                changes: Emitter::new(),
                errors: Emitter::new(),
                started: Emitter::new(),
                will_stop: Emitter::new(),
                stopped: Emitter::new(),
                should_detach: Emitter::new(),
            }),
        }
    }

    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakWatchHandle {
        WeakWatchHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn canonical_path(&self) -> &Path {
        &self.inner.canonical_path
    }

    pub fn options(&self) -> SessionOptions {
        self.inner.options
    }

    pub fn state(&self) -> HandleState {
        *self.inner.state.borrow()
    }

    pub fn change_subscriber_count(&self) -> usize {
        self.inner.changes.len()
    }

    /// Wait until no transition is in flight and return the settled state.
    pub async fn settled(&self) -> HandleState {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|s| s.is_settled()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Wait until the handle reaches `target`.
    pub async fn wait_for_state(&self, target: HandleState) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|s| *s == target).await;
    }

    /// Apply a transition atomically. Returns `false` if it was not legal
    /// from the current state.
    fn transition(&self, transition: Transition) -> bool {
        let id = self.inner.id;
        self.inner.state.send_if_modified(|state| match state.apply(transition) {
            Some(next) => {
                debug!(handle = %id, from = %state, to = %next, "handle transition");
                *state = next;
                true
            }
            None => false,
        })
    }

    /// Open the native session. No-op unless stopped.
    ///
    /// On failure the handle goes back to `Stopped`, the error is published
    /// to error subscribers and returned; a later `start` may retry.
    pub async fn start(&self) -> Result<(), WatchError> {
        if !self.transition(Transition::BeginStart) {
            return Ok(());
        }

        let (sink, rx) = SessionSink::channel();
        let opened = self
            .inner
            .factory
            .open(&self.inner.canonical_path, self.inner.options, sink)
            .await;

        match opened {
            Ok(session) => {
                let dispatcher = tokio::spawn(dispatch(Arc::downgrade(&self.inner), rx));
                *lock(&self.inner.session) = Some(ActiveSession {
                    session,
                    dispatcher,
                });
                self.transition(Transition::StartSucceeded);
                info!(handle = %self.inner.id, path = ?self.inner.canonical_path, "watch handle running");
                self.inner.started.emit(&());
                Ok(())
            }
            Err(err) => {
                self.transition(Transition::StartFailed);
                warn!(handle = %self.inner.id, error = %err, "failed to start watch handle");
                self.inner.errors.emit(&err);
                Err(err)
            }
        }
    }

    /// Close the native session. No-op unless running.
    ///
    /// Will-stop is emitted before the session is torn down so bound watches
    /// can detach first. The handle always ends up `Stopped`; a close error
    /// is published to error subscribers and returned.
    pub async fn stop(&self) -> Result<(), WatchError> {
        if !self.transition(Transition::BeginStop) {
            return Ok(());
        }

        self.inner.will_stop.emit(&());

        let active = lock(&self.inner.session).take();
        let result = match active {
            Some(active) => {
                let closed = active.session.close().await;
                active.dispatcher.abort();
                closed
            }
            None => Ok(()),
        };

        if let Err(err) = &result {
            warn!(handle = %self.inner.id, error = %err, "error while closing watch session");
            self.inner.errors.emit(err);
        }

        self.transition(Transition::StopFinished);
        info!(handle = %self.inner.id, path = ?self.inner.canonical_path, "watch handle stopped");
        self.inner.stopped.emit(&());
        result
    }

    /// Register a change subscriber. Subscribing to a handle that is not
    /// running schedules a start; dropping or disposing the last change
    /// subscription schedules a stop.
    pub fn subscribe_changes(
        &self,
        callback: impl Fn(&[ChangeEvent]) + Send + Sync + 'static,
    ) -> Subscription {
        let (id, count) = self
            .inner
            .changes
            .add(move |batch: &Vec<ChangeEvent>| callback(batch));
        debug!(handle = %self.inner.id, subscribers = count, "change subscriber added");

        if count == 1 || self.state() != HandleState::Running {
            self.schedule_reconcile();
        }

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Some(remaining) = inner.changes.remove(id) {
                debug!(handle = %inner.id, subscribers = remaining, "change subscriber removed");
                if remaining == 0 {
                    WatchHandle { inner }.schedule_reconcile();
                }
            }
        })
    }

    pub fn subscribe_errors(
        &self,
        callback: impl Fn(&WatchError) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.errors.subscribe(callback)
    }

    pub fn subscribe_start(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.started.subscribe(move |_| callback())
    }

    pub fn subscribe_will_stop(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.will_stop.subscribe(move |_| callback())
    }

    pub fn subscribe_stop(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.stopped.subscribe(move |_| callback())
    }

    pub fn subscribe_should_detach(
        &self,
        callback: impl Fn(&DetachRequest) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.should_detach.subscribe(callback)
    }

    /// Ask watches bound here and rooted under `scope` to move to
    /// `replacement`. Advisory only: this handle keeps running until whoever
    /// owns it stops it (or its last subscriber leaves).
    pub fn request_reattach(&self, replacement: &WatchHandle, scope: impl Into<PathBuf>) {
        let request = DetachRequest {
            replacement: replacement.clone(),
            scope: scope.into(),
        };
        info!(
            handle = %self.inner.id,
            replacement = %replacement.id(),
            scope = ?request.scope,
            "requesting reattachment"
        );
        self.inner.should_detach.emit(&request);
    }

    /// Normalize a raw batch and hand it, in order, to every change
    /// subscriber.
    pub fn ingest_raw_events(&self, batch: &[RawEvent]) {
        let events = convert::to_change_events(batch);
        if events.is_empty() {
            return;
        }
        debug!(handle = %self.inner.id, events = events.len(), "dispatching change batch");
        self.inner.changes.emit(&events);
    }

    /// Publish a runtime error. Does not change state.
    pub fn ingest_error(&self, err: WatchError) {
        warn!(handle = %self.inner.id, error = %err, "watch session reported an error");
        self.inner.errors.emit(&err);
    }

    fn schedule_reconcile(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(handle = %self.inner.id, "no tokio runtime; cannot start or stop handle");
            return;
        };
        let handle = self.clone();
        runtime.spawn(async move { handle.reconcile().await });
    }

    /// Drive the handle towards what the change subscriber count demands.
    async fn reconcile(&self) {
        loop {
            let state = self.settled().await;
            let wanted = !self.inner.changes.is_empty();
            let result = match (state, wanted) {
                (HandleState::Stopped, true) => self.start().await,
                (HandleState::Running, false) => self.stop().await,
                _ => return,
            };
            if result.is_err() {
                return;
            }
        }
    }
}

/// Drain session messages on a single task; this is where native input
/// joins the handle.
async fn dispatch(handle: Weak<HandleInner>, mut rx: mpsc::UnboundedReceiver<SessionMessage>) {
    while let Some(message) = rx.recv().await {
        let Some(inner) = handle.upgrade() else {
            break;
        };
        let handle = WatchHandle { inner };
        match message {
            SessionMessage::Events(batch) => handle.ingest_raw_events(&batch),
            SessionMessage::Error(err) => handle.ingest_error(err),
        }
    }
}
