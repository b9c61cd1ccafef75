mod common;

use common::builders::{created, deleted, modified, renamed, RawEventBuilder};
use common::TestResult;
use serde_json::json;
use watchpool::handle::convert::to_change_events;
use watchpool::types::action;
use watchpool::{ChangeEvent, ChangeKind};

#[test]
fn conversion_keeps_batch_order() {
    let batch = vec![
        modified("/w/a"),
        created("/w/b"),
        deleted("/w/c"),
        renamed("/w/d", "/w/e"),
    ];
    let events = to_change_events(&batch);
    let kinds: Vec<ChangeKind> = events.iter().map(ChangeEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![
            ChangeKind::Changed,
            ChangeKind::Added,
            ChangeKind::Deleted,
            ChangeKind::Renamed
        ]
    );
}

#[test]
fn rename_across_directories_uses_the_new_directory() {
    let raw = RawEventBuilder::new(action::RENAMED, "/w/from")
        .old_file("x")
        .new_file("y")
        .new_directory("/w/to")
        .build();
    let events = to_change_events(&[raw]);
    assert_eq!(
        events,
        vec![ChangeEvent::renamed("/w/from/x", "/w/to/y")]
    );
}

#[test]
fn record_without_a_file_names_the_directory() {
    let raw = RawEventBuilder::new(action::DELETED, "/w/gone").build();
    let events = to_change_events(&[raw]);
    assert_eq!(events[0].old_path(), std::path::Path::new("/w/gone"));
}

#[test]
fn wire_shape_is_camel_case_without_empty_new_path() -> TestResult {
    let added = serde_json::to_value(ChangeEvent::new(ChangeKind::Added, "/w/a"))?;
    assert_eq!(added, json!({ "oldPath": "/w/a", "kind": "added" }));

    let moved = serde_json::to_value(ChangeEvent::renamed("/w/a", "/w/b"))?;
    assert_eq!(
        moved,
        json!({ "oldPath": "/w/a", "newPath": "/w/b", "kind": "renamed" })
    );

    let odd = serde_json::to_value(ChangeEvent::new(ChangeKind::Unexpected(9), "/w/c"))?;
    assert_eq!(odd, json!({ "oldPath": "/w/c", "kind": "unexpected(9)" }));
    Ok(())
}

#[test]
fn renamed_kind_without_destination_is_unexpected() {
    let event = ChangeEvent::new(ChangeKind::Renamed, "/w/a");
    assert_eq!(event.kind(), ChangeKind::Unexpected(action::RENAMED));
    assert!(event.new_path().is_none());
}

#[test]
fn display_is_one_line() {
    assert_eq!(
        ChangeEvent::renamed("/w/a", "/w/b").to_string(),
        "renamed /w/a -> /w/b"
    );
    assert_eq!(ChangeEvent::new(ChangeKind::Changed, "/w/a").to_string(), "changed /w/a");
}
