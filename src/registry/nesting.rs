// src/registry/nesting.rs

//! One handle per watched root, merged upwards.
//!
//! - A root equal to or below an existing handle's root reuses that handle,
//!   unless the handle is already stopping; a fresh handle replaces it.
//! - A root above existing handles gets a new handle; each handle below it is
//!   retired through `request_reattach` and stops on its own once its last
//!   subscriber has moved.
//! - Handles leave the registry when they stop and come back when they
//!   restart into an empty slot. Broad handles are never split back up when
//!   narrower watches remain.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::errors::WatchError;
use crate::handle::emitter::lock;
use crate::handle::{HandleState, WatchHandle};
use crate::registry::{HandleFactory, Registry};
use crate::session::BoxFuture;
use crate::watch::{Watch, WatchOptions};

type Roots = Arc<Mutex<BTreeMap<PathBuf, WatchHandle>>>;

pub struct NestingRegistry {
    factory: HandleFactory,
    roots: Roots,
}

impl fmt::Debug for NestingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roots: Vec<PathBuf> = lock(&self.roots).keys().cloned().collect();
        f.debug_struct("NestingRegistry")
            .field("roots", &roots)
            .finish_non_exhaustive()
    }
}

/// A handle that already announced will-stop cannot take new watches.
fn accepts_watches(handle: &WatchHandle) -> bool {
    handle.state() != HandleState::Stopping
}

impl NestingRegistry {
    pub fn new(factory: HandleFactory) -> Self {
        Self {
            factory,
            roots: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Handle registered exactly at `root`, if any.
    pub fn handle_at(&self, root: &Path) -> Option<WatchHandle> {
        lock(&self.roots).get(root).cloned()
    }

    pub fn handle_count(&self) -> usize {
        lock(&self.roots).len()
    }

    /// Pick the handle for `root`. Returns it plus any handles it replaces.
    fn choose(&self, root: &Path, options: &WatchOptions) -> (WatchHandle, Vec<WatchHandle>) {
        let retired: Vec<WatchHandle>;
        let handle;
        {
            let mut roots = lock(&self.roots);

            let covering = roots
                .iter()
                .find(|(p, h)| root.starts_with(p) && accepts_watches(h));
            if let Some((covering, existing)) = covering {
                debug!(root = ?root, covering = ?covering, handle = %existing.id(), "reusing covering handle");
                return (existing.clone(), Vec::new());
            }

            handle = (self.factory)(root, options);
            let nested: Vec<PathBuf> = roots
                .keys()
                .filter(|p| p.starts_with(root))
                .cloned()
                .collect();
            retired = nested.iter().filter_map(|p| roots.remove(p)).collect();

            follow_lifecycle(&self.roots, &handle);
            roots.insert(root.to_path_buf(), handle.clone());
        }

        // Stopping handles in the replaced slots have no watches left to move.
        let replaced: Vec<WatchHandle> = retired.into_iter().filter(accepts_watches).collect();
        if !replaced.is_empty() {
            info!(root = ?root, retired = replaced.len(), "merging nested handles into new root");
        }
        (handle, replaced)
    }
}

/// Drop `handle` from `roots` when it stops, unless its slot was already
/// taken over, and put it back when it restarts into an uncovered slot.
fn follow_lifecycle(roots: &Roots, handle: &WatchHandle) {
    let path = handle.canonical_path().to_path_buf();

    let on_stop = {
        let roots = Arc::downgrade(roots);
        let id = handle.id();
        let path = path.clone();
        move || {
            let Some(roots) = roots.upgrade() else {
                return;
            };
            let removed = {
                let mut roots = lock(&roots);
                match roots.get(&path) {
                    Some(entry) if entry.id() == id => roots.remove(&path),
                    _ => None,
                }
            };
            if removed.is_some() {
                debug!(handle = %id, path = ?path, "handle stopped; removed from registry");
            }
        }
    };
    handle.subscribe_stop(on_stop).keep_alive();

    let on_start = {
        let roots = Arc::downgrade(roots);
        let weak = handle.downgrade();
        move || {
            let (Some(roots), Some(handle)) = (roots.upgrade(), weak.upgrade()) else {
                return;
            };
            let mut roots = lock(&roots);
            let covered = roots
                .iter()
                .any(|(p, h)| path.starts_with(p) && (h == &handle || accepts_watches(h)));
            if !covered {
                debug!(handle = %handle.id(), path = ?path, "restarted handle re-registered");
                roots.insert(path.clone(), handle);
            }
        }
    };
    handle.subscribe_start(on_start).keep_alive();
}

impl Registry for NestingRegistry {
    fn attach<'a>(&'a self, watch: &'a Watch) -> BoxFuture<'a, Result<(), WatchError>> {
        Box::pin(async move {
            let root = watch.canonicalized().await?;
            let (handle, replaced) = self.choose(&root, watch.options());

            watch.bind_to_handle(&handle);

            for old in replaced {
                let scope = old.canonical_path().to_path_buf();
                old.request_reattach(&handle, scope);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionFactory, SessionOptions, SessionSink};

    #[derive(Debug)]
    struct Unused;

    impl SessionFactory for Unused {
        fn open(
            &self,
            root: &Path,
            _options: SessionOptions,
            _sink: SessionSink,
        ) -> BoxFuture<'static, Result<Box<dyn Session>, WatchError>> {
            let path = root.to_path_buf();
            Box::pin(async move {
                Err::<Box<dyn Session>, WatchError>(WatchError::SessionStart {
                    path,
                    reason: "not used".to_string(),
                })
            })
        }
    }

    fn registry() -> NestingRegistry {
        let sessions: Arc<dyn SessionFactory> = Arc::new(Unused);
        NestingRegistry::new(Arc::new(move |root: &Path, options: &WatchOptions| {
            WatchHandle::new(root, options.session_options(), Arc::clone(&sessions))
        }))
    }

    #[test]
    fn covered_roots_reuse_and_ancestors_retire() {
        let registry = registry();
        let opts = WatchOptions::default();

        let (inner, none) = registry.choose(Path::new("/a/b"), &opts);
        assert!(none.is_empty());
        let (same, _) = registry.choose(Path::new("/a/b/c"), &opts);
        assert_eq!(same, inner);

        let (outer, retired) = registry.choose(Path::new("/a"), &opts);
        assert_ne!(outer, inner);
        assert_eq!(retired, vec![inner]);
        assert_eq!(registry.handle_count(), 1);
        assert_eq!(registry.handle_at(Path::new("/a")), Some(outer));
    }
}
