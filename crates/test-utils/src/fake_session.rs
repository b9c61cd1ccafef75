use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use watchpool::errors::WatchError;
use watchpool::session::{BoxFuture, Session, SessionFactory, SessionOptions, SessionSink};
use watchpool::types::RawEvent;

#[derive(Debug)]
struct OpenSession {
    id: u64,
    root: PathBuf,
    options: SessionOptions,
    sink: SessionSink,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u64,
    open: Vec<OpenSession>,
    opened: Vec<PathBuf>,
    closed: Vec<PathBuf>,
    fail_next: Option<String>,
    open_delay: Option<Duration>,
    close_delay: Option<Duration>,
}

/// A fake session factory that:
/// - records which roots were opened and closed
/// - lets tests push raw batches and errors into open sessions
/// - can fail the next open, or delay opens and closes to widen race windows.
#[derive(Debug, Clone, Default)]
pub struct FakeSessionFactory {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_open(&self, reason: &str) {
        self.state.lock().unwrap().fail_next = Some(reason.to_string());
    }

    pub fn set_open_delay(&self, delay: Duration) {
        self.state.lock().unwrap().open_delay = Some(delay);
    }

    /// Keep closing handles in `Stopping` for `delay`.
    pub fn set_close_delay(&self, delay: Duration) {
        self.state.lock().unwrap().close_delay = Some(delay);
    }

    /// Roots in the order sessions were opened.
    pub fn opened(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().opened.clone()
    }

    /// Roots in the order sessions were closed.
    pub fn closed(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().closed.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().open.len()
    }

    pub fn is_open(&self, root: &Path) -> bool {
        self.state.lock().unwrap().open.iter().any(|s| s.root == root)
    }

    /// Debounce window the open session at `root` was given.
    pub fn options_for(&self, root: &Path) -> Option<SessionOptions> {
        self.state
            .lock()
            .unwrap()
            .open
            .iter()
            .find(|s| s.root == root)
            .map(|s| s.options)
    }

    /// Deliver a batch through every open session rooted at `root`.
    /// Returns `false` if none is open.
    pub fn emit(&self, root: &Path, batch: Vec<RawEvent>) -> bool {
        let sinks = self.sinks_for(root);
        for sink in &sinks {
            sink.events(batch.clone());
        }
        !sinks.is_empty()
    }

    pub fn emit_error(&self, root: &Path, reason: &str) -> bool {
        let sinks = self.sinks_for(root);
        for sink in &sinks {
            sink.error(WatchError::Session {
                path: root.to_path_buf(),
                reason: reason.to_string(),
            });
        }
        !sinks.is_empty()
    }

    fn sinks_for(&self, root: &Path) -> Vec<SessionSink> {
        self.state
            .lock()
            .unwrap()
            .open
            .iter()
            .filter(|s| s.root == root)
            .map(|s| s.sink.clone())
            .collect()
    }
}

impl SessionFactory for FakeSessionFactory {
    fn open(
        &self,
        root: &Path,
        options: SessionOptions,
        sink: SessionSink,
    ) -> BoxFuture<'static, Result<Box<dyn Session>, WatchError>> {
        let state = Arc::clone(&self.state);
        let root = root.to_path_buf();

        Box::pin(async move {
            let delay = state.lock().unwrap().open_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut guard = state.lock().unwrap();
            if let Some(reason) = guard.fail_next.take() {
                return Err(WatchError::SessionStart { path: root, reason });
            }

            guard.next_id += 1;
            let id = guard.next_id;
            guard.opened.push(root.clone());
            guard.open.push(OpenSession {
                id,
                root: root.clone(),
                options,
                sink,
            });
            drop(guard);

            Ok::<Box<dyn Session>, WatchError>(Box::new(FakeSession {
                id,
                root,
                state: Arc::clone(&state),
            }))
        })
    }
}

struct FakeSession {
    id: u64,
    root: PathBuf,
    state: Arc<Mutex<FakeState>>,
}

impl Session for FakeSession {
    fn close(self: Box<Self>) -> BoxFuture<'static, Result<(), WatchError>> {
        Box::pin(async move {
            let delay = self.state.lock().unwrap().close_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut guard = self.state.lock().unwrap();
            guard.open.retain(|s| s.id != self.id);
            guard.closed.push(self.root.clone());
            Ok(())
        })
    }
}
