#![allow(dead_code)]

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use watchpool::fs::mock::MockFileSystem;
use watchpool::{ManagerConfig, WatchManager};

pub use watchpool_test_utils::builders;
pub use watchpool_test_utils::{init_tracing, with_timeout, BatchRecorder, FakeSessionFactory};

pub type TestResult = Result<(), Box<dyn Error>>;

/// A manager wired to a fake session factory and an in-memory tree.
pub struct Harness {
    pub manager: WatchManager,
    pub sessions: FakeSessionFactory,
    pub fs: MockFileSystem,
}

impl Harness {
    pub fn new(dirs: &[&str]) -> Self {
        Self::with_config(ManagerConfig::default(), dirs)
    }

    pub fn with_config(config: ManagerConfig, dirs: &[&str]) -> Self {
        init_tracing();
        let sessions = FakeSessionFactory::new();
        let fs = MockFileSystem::new();
        for dir in dirs {
            fs.add_dir(dir);
        }
        let manager =
            WatchManager::with_parts(config, Arc::new(sessions.clone()), Arc::new(fs.clone()));
        Self {
            manager,
            sessions,
            fs,
        }
    }

    /// Wait until a session rooted at `root` is open.
    pub async fn wait_open(&self, root: &str) {
        let sessions = self.sessions.clone();
        let root = Path::new(root).to_path_buf();
        eventually(move || sessions.is_open(&root)).await;
    }
}

/// Poll `condition` every 10ms until it holds, failing after 5 seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    with_timeout(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

/// Long enough for spawned reconcile and dispatch tasks to run.
pub const QUIET: Duration = Duration::from_millis(100);
