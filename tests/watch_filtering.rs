mod common;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use common::builders::{created, deleted, renamed, RawEventBuilder};
use common::{eventually, with_timeout, BatchRecorder, Harness, TestResult};
use watchpool::types::action;
use watchpool::{ChangeKind, Watch, WatchError, WatchOptions};

#[tokio::test]
async fn nested_watch_sees_only_its_subtree() -> TestResult {
    let h = Harness::new(&["/repo/src", "/repo/docs"]);
    let mut whole = BatchRecorder::new();
    let mut src = BatchRecorder::new();

    let repo = h
        .manager
        .create_watch("/repo", WatchOptions::default(), whole.callback());
    with_timeout(repo.first_started()).await?;

    let nested = h
        .manager
        .create_watch("/repo/src", WatchOptions::default(), src.callback());
    with_timeout(nested.first_started()).await?;
    assert_eq!(repo.bound_handle(), nested.bound_handle());
    assert_eq!(h.sessions.opened(), vec![PathBuf::from("/repo")]);

    h.sessions.emit(
        Path::new("/repo"),
        vec![
            created("/repo/src/main.rs"),
            created("/repo/docs/guide.md"),
            renamed("/repo/src/old.rs", "/repo/docs/old.rs"),
            deleted("/repo/srcfile"),
        ],
    );

    let all = whole.next_batch().await;
    assert_eq!(all.len(), 4);

    let mine = src.next_batch().await;
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].kind(), ChangeKind::Added);
    assert_eq!(mine[0].old_path(), Path::new("/repo/src/main.rs"));
    // Membership is decided by the old path only.
    assert_eq!(mine[1].kind(), ChangeKind::Renamed);
    assert_eq!(mine[1].new_path(), Some(Path::new("/repo/docs/old.rs")));
    Ok(())
}

#[tokio::test]
async fn batch_outside_the_subtree_is_not_delivered() -> TestResult {
    let h = Harness::new(&["/repo/src", "/repo/docs"]);
    let repo = h.manager.create_watch("/repo", WatchOptions::default(), |_| {});
    with_timeout(repo.first_started()).await?;

    let mut src = BatchRecorder::new();
    let nested = h
        .manager
        .create_watch("/repo/src", WatchOptions::default(), src.callback());
    with_timeout(nested.first_started()).await?;

    h.sessions
        .emit(Path::new("/repo"), vec![created("/repo/docs/only-docs.md")]);
    src.expect_silence(common::QUIET).await;
    Ok(())
}

#[tokio::test]
async fn symlinked_request_watches_the_canonical_root() -> TestResult {
    let h = Harness::new(&["/real/project"]);
    h.fs.add_symlink("/link", "/real/project");

    let mut recorder = BatchRecorder::new();
    let watch = h
        .manager
        .create_watch("/link", WatchOptions::default(), recorder.callback());

    assert_eq!(
        with_timeout(watch.canonicalized()).await?,
        PathBuf::from("/real/project")
    );
    assert_eq!(watch.requested_path(), Path::new("/link"));
    with_timeout(watch.first_started()).await?;
    assert_eq!(h.sessions.opened(), vec![PathBuf::from("/real/project")]);

    h.sessions
        .emit(Path::new("/real/project"), vec![created("/real/project/a")]);
    let batch = recorder.next_batch().await;
    assert_eq!(batch[0].old_path(), Path::new("/real/project/a"));
    Ok(())
}

#[tokio::test]
async fn unresolvable_path_reports_and_never_binds() -> TestResult {
    let h = Harness::new(&["/exists"]);
    let watch = Watch::new(
        "/missing",
        WatchOptions::default(),
        h.manager.registry(),
        Arc::new(h.fs.clone()),
    );

    let seen: Arc<Mutex<Vec<WatchError>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _errors = watch.subscribe_errors(move |err| sink.lock().unwrap().push(err.clone()));
    let _sub = watch.subscribe_changes(|_| {});

    let err = with_timeout(watch.canonicalized()).await.unwrap_err();
    assert!(matches!(err, WatchError::Canonicalize { ref path, .. } if path == Path::new("/missing")));
    eventually(|| seen.lock().unwrap().len() == 1).await;

    assert!(watch.canonical_path().is_none());
    assert!(watch.bound_handle().is_none());
    assert!(h.sessions.opened().is_empty());
    assert_eq!(h.manager.live_handle_count(), 0);
    Ok(())
}

#[tokio::test]
async fn unmapped_actions_surface_as_unexpected() -> TestResult {
    let h = Harness::new(&["/w"]);
    let mut recorder = BatchRecorder::new();
    let watch = h
        .manager
        .create_watch("/w", WatchOptions::default(), recorder.callback());
    with_timeout(watch.first_started()).await?;

    h.sessions.emit(
        Path::new("/w"),
        vec![
            RawEventBuilder::new(7, "/w").file("odd").build(),
            RawEventBuilder::new(action::RENAMED, "/w").old_file("half").build(),
        ],
    );

    let batch = recorder.next_batch().await;
    let kinds: Vec<String> = batch.iter().map(|e| e.kind().to_string()).collect();
    assert_eq!(kinds, vec!["unexpected(7)", "unexpected(3)"]);
    assert!(batch.iter().all(|e| e.new_path().is_none()));
    Ok(())
}
