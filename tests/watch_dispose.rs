mod common;

use std::path::Path;
use std::sync::Arc;

use common::builders::created;
use common::{eventually, with_timeout, BatchRecorder, Harness, TestResult};
use watchpool::{HandleState, Watch, WatchError, WatchOptions};

#[tokio::test]
async fn dispose_is_idempotent_and_releases_the_handle() -> TestResult {
    let h = Harness::new(&["/w"]);
    let watch = h.manager.create_watch("/w", WatchOptions::default(), |_| {});
    with_timeout(watch.first_started()).await?;
    let handle = watch.bound_handle().expect("bound");
    assert_eq!(handle.change_subscriber_count(), 1);

    watch.dispose();
    watch.dispose();

    assert!(watch.is_disposed());
    assert_eq!(watch.binding_count(), 0);
    assert_eq!(handle.change_subscriber_count(), 0);
    with_timeout(handle.wait_for_state(HandleState::Stopped)).await;
    assert_eq!(h.sessions.closed().len(), 1);
    Ok(())
}

#[tokio::test]
async fn disposing_one_subscription_keeps_the_others() -> TestResult {
    let h = Harness::new(&["/w"]);
    let watch = Watch::new(
        "/w",
        WatchOptions::default(),
        h.manager.registry(),
        Arc::new(h.fs.clone()),
    );
    let mut gone = BatchRecorder::new();
    let mut kept = BatchRecorder::new();
    let mut first = watch.subscribe_changes(gone.callback());
    let _second = watch.subscribe_changes(kept.callback());
    with_timeout(watch.first_started()).await?;
    let handle = watch.bound_handle().expect("bound");
    let installed = handle.clone();
    eventually(move || installed.change_subscriber_count() == 2).await;

    first.dispose();
    first.dispose();
    assert!(first.is_disposed());
    assert_eq!(watch.binding_count(), 1);
    assert_eq!(handle.change_subscriber_count(), 1);

    h.sessions.emit(Path::new("/w"), vec![created("/w/a")]);
    assert_eq!(kept.next_batch().await.len(), 1);
    gone.expect_silence(common::QUIET).await;
    Ok(())
}

#[tokio::test]
async fn dropping_the_last_clone_disposes() -> TestResult {
    let h = Harness::new(&["/w"]);
    let watch = h.manager.create_watch("/w", WatchOptions::default(), |_| {});
    with_timeout(watch.first_started()).await?;
    let handle = watch.bound_handle().expect("bound");

    let clone = watch.clone();
    drop(watch);
    assert_eq!(handle.change_subscriber_count(), 1);

    drop(clone);
    let released = handle.clone();
    eventually(move || released.change_subscriber_count() == 0).await;
    with_timeout(handle.wait_for_state(HandleState::Stopped)).await;
    Ok(())
}

#[tokio::test]
async fn subscribe_after_dispose_is_inert() -> TestResult {
    let h = Harness::new(&["/w"]);
    let watch = h.manager.create_watch("/w", WatchOptions::default(), |_| {});
    watch.dispose();

    let sub = watch.subscribe_changes(|_| {});
    assert!(sub.is_disposed());
    assert_eq!(watch.binding_count(), 0);
    Ok(())
}

#[tokio::test]
async fn readiness_fails_when_disposed_before_binding() -> TestResult {
    // Never resolves, so the watch never binds.
    let h = Harness::new(&[]);
    let watch = h.manager.create_watch("/absent", WatchOptions::default(), |_| {});
    let _ = with_timeout(watch.canonicalized()).await;

    watch.dispose();
    assert_eq!(with_timeout(watch.first_bound()).await, Err(WatchError::Disposed));
    assert_eq!(with_timeout(watch.first_started()).await, Err(WatchError::Disposed));
    Ok(())
}

#[tokio::test]
async fn dispose_while_attaching_leaves_nothing_behind() -> TestResult {
    let h = Harness::new(&["/w"]);
    let watch = h.manager.create_watch("/w", WatchOptions::default(), |_| {});
    watch.dispose();

    tokio::time::sleep(common::QUIET).await;
    assert_eq!(watch.binding_count(), 0);
    assert!(watch.bound_handle().is_none());
    let sessions = h.sessions.clone();
    eventually(move || sessions.open_count() == 0).await;
    Ok(())
}
