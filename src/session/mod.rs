// src/session/mod.rs

//! Native watch sessions.
//!
//! A session is the expensive OS-level resource a [`crate::handle::WatchHandle`]
//! owns. The handle talks to a [`SessionFactory`] instead of `notify`
//! directly, so tests can swap in a scriptable fake while production uses
//! [`NotifySessionFactory`].
//!
//! Sessions never call into the handle. They push [`SessionMessage`]s into a
//! [`SessionSink`]; the handle drains the other end on a single task, which
//! is the one serialization point for native input.

use std::fmt::Debug;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::errors::WatchError;
use crate::types::RawEvent;

pub mod native;

pub use native::NotifySessionFactory;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default debounce window handed to native sessions.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Options passed through to the native session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub debounce: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// What a session reports back.
#[derive(Debug, Clone)]
pub enum SessionMessage {
    /// One debounced batch, in native order.
    Events(Vec<RawEvent>),
    /// A runtime error; the session keeps running.
    Error(WatchError),
}

/// Sending half handed to a session when it is opened.
#[derive(Debug, Clone)]
pub struct SessionSink {
    tx: mpsc::UnboundedSender<SessionMessage>,
}

impl SessionSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Forward a batch. Empty batches are dropped. Returns `false` once the
    /// owning handle has gone away.
    pub fn events(&self, batch: Vec<RawEvent>) -> bool {
        if batch.is_empty() {
            return !self.tx.is_closed();
        }
        self.tx.send(SessionMessage::Events(batch)).is_ok()
    }

    pub fn error(&self, err: WatchError) -> bool {
        self.tx.send(SessionMessage::Error(err)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An open native session.
pub trait Session: Send {
    /// Tear the session down. Called exactly once.
    fn close(self: Box<Self>) -> BoxFuture<'static, Result<(), WatchError>>;
}

/// Opens native sessions.
pub trait SessionFactory: Send + Sync + Debug {
    /// Open a recursive session rooted at `root`. The returned future resolves
    /// once the session is ready to report changes.
    fn open(
        &self,
        root: &Path,
        options: SessionOptions,
        sink: SessionSink,
    ) -> BoxFuture<'static, Result<Box<dyn Session>, WatchError>>;
}
