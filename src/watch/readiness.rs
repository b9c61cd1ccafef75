// src/watch/readiness.rs

//! One-shot readiness signals.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::errors::WatchError;

type Slot<T> = Option<Result<T, WatchError>>;

/// Resolved or failed exactly once; any number of waiters.
pub struct Readiness<T> {
    tx: Arc<watch::Sender<Slot<T>>>,
}

impl<T> Clone for Readiness<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone> Default for Readiness<T> {
    fn default() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }
}

impl<T: fmt::Debug> fmt::Debug for Readiness<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Readiness").field(&*self.tx.borrow()).finish()
    }
}

impl<T: Clone> Readiness<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Returns `false` if already settled.
    pub fn fail(&self, err: WatchError) -> bool {
        self.settle(Err(err))
    }

    fn settle(&self, outcome: Result<T, WatchError>) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    pub fn peek(&self) -> Option<Result<T, WatchError>> {
        self.tx.borrow().clone()
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub async fn wait(&self) -> Result<T, WatchError> {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone().unwrap_or(Err(WatchError::ChannelClosed)),
            Err(_) => Err(WatchError::ChannelClosed),
        }
    }
}
