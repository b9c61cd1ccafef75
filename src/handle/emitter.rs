// src/handle/emitter.rs

//! Typed pub-sub used for every signal a handle exposes.
//!
//! Each signal kind gets its own [`Emitter`]. Listeners are kept in
//! registration order and are invoked outside the internal lock, so a
//! listener may subscribe or unsubscribe (on any emitter) while being called.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Lock a mutex, recovering the data if a listener panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub type ListenerId = u64;

struct EmitterInner<T> {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<ListenerId, Listener<T>>>,
}

pub struct Emitter<T> {
    inner: Arc<EmitterInner<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.len())
            .finish()
    }
}

impl<T> Emitter<T> {
    pub fn len(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                next_id: AtomicU64::new(1),
                listeners: Mutex::new(BTreeMap::new()),
            }),
        }
    }
}

impl<T: 'static> Emitter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, returning its id and the listener count after
    /// insertion.
    pub fn add(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> (ListenerId, usize) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = lock(&self.inner.listeners);
        listeners.insert(id, Arc::new(listener));
        (id, listeners.len())
    }

    /// Remove a listener. Returns the remaining count if it was present.
    pub fn remove(&self, id: ListenerId) -> Option<usize> {
        let mut listeners = lock(&self.inner.listeners);
        listeners.remove(&id).map(|_| listeners.len())
    }

    /// Register a listener and get a [`Subscription`] that removes it.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let (id, _) = self.add(listener);
        let weak = self.downgrade();
        Subscription::new(move || {
            if let Some(emitter) = weak.upgrade() {
                emitter.remove(id);
            }
        })
    }

    /// Invoke every listener registered at the time of the call, in
    /// registration order.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = lock(&self.inner.listeners).values().cloned().collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub(crate) fn downgrade(&self) -> WeakEmitter<T> {
        WeakEmitter {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

pub(crate) struct WeakEmitter<T> {
    inner: Weak<EmitterInner<T>>,
}

impl<T> WeakEmitter<T> {
    pub(crate) fn upgrade(&self) -> Option<Emitter<T>> {
        self.inner.upgrade().map(|inner| Emitter { inner })
    }
}

/// Token for a registered listener.
///
/// Disposing is idempotent. Dropping a subscription disposes it.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn dispose(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_none()
    }

    /// Leave the listener registered for as long as its emitter lives.
    pub fn keep_alive(mut self) {
        self.cancel = None;
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}
