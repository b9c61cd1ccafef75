// src/session/native.rs

//! `notify`-backed native sessions.
//!
//! The notify callback runs on notify's own thread. It only forwards results
//! into a tokio channel; a batching task then coalesces everything that
//! arrives within the debounce window into one ordered batch for the sink.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::WatchError;
use crate::session::{BoxFuture, Session, SessionFactory, SessionOptions, SessionSink};
use crate::types::{action, RawEvent};

/// Production session factory.
#[derive(Debug, Clone, Default)]
pub struct NotifySessionFactory;

impl NotifySessionFactory {
    pub fn new() -> Self {
        Self
    }
}

impl SessionFactory for NotifySessionFactory {
    fn open(
        &self,
        root: &Path,
        options: SessionOptions,
        sink: SessionSink,
    ) -> BoxFuture<'static, Result<Box<dyn Session>, WatchError>> {
        let root = root.to_path_buf();

        Box::pin(async move {
            let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

            // Adding recursive native watches walks the tree; keep it off the
            // async workers.
            let watch_root = root.clone();
            let watcher = tokio::task::spawn_blocking(move || {
                let mut watcher = RecommendedWatcher::new(
                    move |res: notify::Result<Event>| {
                        // Receiver gone means the session is closing.
                        let _ = raw_tx.send(res);
                    },
                    Config::default(),
                )
                .map_err(|e| start_error(&watch_root, e))?;
                watcher
                    .watch(&watch_root, RecursiveMode::Recursive)
                    .map_err(|e| start_error(&watch_root, e))?;
                Ok::<_, WatchError>(watcher)
            })
            .await
            .map_err(|e| start_error(&root, e))??;

            let batcher = tokio::spawn(run_batcher(raw_rx, options.debounce, sink));

            info!(
                root = ?root,
                debounce_ms = options.debounce.as_millis() as u64,
                "native session opened"
            );

            Ok::<Box<dyn Session>, WatchError>(Box::new(NotifySession {
                root,
                watcher,
                batcher,
            }))
        })
    }
}

fn start_error(root: &Path, err: impl std::fmt::Display) -> WatchError {
    WatchError::SessionStart {
        path: root.to_path_buf(),
        reason: err.to_string(),
    }
}

struct NotifySession {
    root: PathBuf,
    watcher: RecommendedWatcher,
    batcher: JoinHandle<()>,
}

impl Session for NotifySession {
    fn close(self: Box<Self>) -> BoxFuture<'static, Result<(), WatchError>> {
        let NotifySession {
            root,
            watcher,
            batcher,
        } = *self;

        Box::pin(async move {
            // Dropping the watcher removes the native watches.
            let dropped = tokio::task::spawn_blocking(move || drop(watcher)).await;
            batcher.abort();

            match dropped {
                Ok(()) => {
                    info!(root = ?root, "native session closed");
                    Ok(())
                }
                Err(e) => Err(WatchError::Session {
                    path: root,
                    reason: format!("failed to release native watcher: {e}"),
                }),
            }
        })
    }
}

async fn run_batcher(
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    debounce: Duration,
    sink: SessionSink,
) {
    while let Some(first) = rx.recv().await {
        let mut pending = vec![first];

        let deadline = tokio::time::sleep(debounce);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                next = rx.recv() => match next {
                    Some(res) => pending.push(res),
                    None => break,
                },
            }
        }

        debug!(received = pending.len(), "flushing debounced notify events");
        if !flush(pending, &sink) {
            warn!("session sink closed; dropping native events");
            break;
        }
    }
    debug!("native batcher finished");
}

/// Push one debounce window to the sink. Errors are forwarded in position,
/// splitting the batch around them.
fn flush(pending: Vec<notify::Result<Event>>, sink: &SessionSink) -> bool {
    let paired = paired_renames(pending.iter().filter_map(|r| r.as_ref().ok()));

    let mut batch = Vec::new();
    for res in pending {
        match res {
            Ok(event) => batch.extend(translate(&event, &paired)),
            Err(err) => {
                if !sink.events(std::mem::take(&mut batch)) {
                    return false;
                }
                if !sink.error(WatchError::from(err)) {
                    return false;
                }
            }
        }
    }
    sink.events(batch)
}

/// Rename trackers for which a combined `Both` event is present. Backends
/// that report both halves separately as well are deduplicated against it.
fn paired_renames<'a>(events: impl Iterator<Item = &'a Event>) -> HashSet<usize> {
    events
        .filter(|e| matches!(e.kind, EventKind::Modify(ModifyKind::Name(RenameMode::Both))))
        .filter_map(|e| e.attrs.tracker())
        .collect()
}

/// Translate one notify event into raw records.
pub fn translate(event: &Event, paired: &HashSet<usize>) -> Vec<RawEvent> {
    let per_path = |code: u32| -> Vec<RawEvent> {
        event
            .paths
            .iter()
            .map(|p| RawEvent::for_path(code, p))
            .collect()
    };
    let is_paired = event.attrs.tracker().is_some_and(|t| paired.contains(&t));

    match &event.kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Create(_) => per_path(action::CREATED),
        EventKind::Remove(_) => per_path(action::DELETED),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::Both if event.paths.len() >= 2 => {
                vec![RawEvent::rename(&event.paths[0], &event.paths[1])]
            }
            RenameMode::From | RenameMode::To if is_paired => Vec::new(),
            RenameMode::From => per_path(action::DELETED),
            RenameMode::To => per_path(action::CREATED),
            _ => event
                .paths
                .iter()
                .map(|p| {
                    let code = if p.exists() {
                        action::CREATED
                    } else {
                        action::DELETED
                    };
                    RawEvent::for_path(code, p)
                })
                .collect(),
        },
        EventKind::Modify(_) => per_path(action::MODIFIED),
        EventKind::Any | EventKind::Other => per_path(action::OTHER_ACTION),
    }
}

#[cfg(test)]
mod tests {
    use notify::event::{CreateKind, DataChange};

    use super::*;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn create_and_modify_map_to_codes() {
        let none = HashSet::new();
        let created = translate(&event(EventKind::Create(CreateKind::File), &["/r/a"]), &none);
        assert_eq!(created, vec![RawEvent::for_path(action::CREATED, Path::new("/r/a"))]);

        let modified = translate(
            &event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/r/b"],
            ),
            &none,
        );
        assert_eq!(modified[0].action, action::MODIFIED);
    }

    #[test]
    fn paired_halves_are_dropped_in_favour_of_both() {
        let both = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/r/old", "/r/new"],
        )
        .set_tracker(9);
        let from = event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/r/old"])
            .set_tracker(9);

        let paired = paired_renames([&both, &from].into_iter());
        assert!(translate(&from, &paired).is_empty());

        let renamed = translate(&both, &paired);
        assert_eq!(renamed.len(), 1);
        assert_eq!(renamed[0].old_file.as_deref(), Some("old"));
        assert_eq!(renamed[0].new_file.as_deref(), Some("new"));
    }

    #[test]
    fn access_is_ignored_and_other_is_unclassified() {
        let none = HashSet::new();
        let access = event(
            EventKind::Access(notify::event::AccessKind::Any),
            &["/r/a"],
        );
        assert!(translate(&access, &none).is_empty());

        let other = translate(&event(EventKind::Other, &["/r/a"]), &none);
        assert_eq!(other[0].action, action::OTHER_ACTION);
    }
}
