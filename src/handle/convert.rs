// src/handle/convert.rs

//! Raw record -> [`ChangeEvent`] normalization.

use crate::types::{action, ChangeEvent, ChangeKind, RawAction, RawEvent};

/// Closed lookup from raw action to change kind.
fn kind_for(raw: RawAction) -> ChangeKind {
    match raw {
        RawAction::Modified => ChangeKind::Changed,
        RawAction::Created => ChangeKind::Added,
        RawAction::Deleted => ChangeKind::Deleted,
        RawAction::Renamed => ChangeKind::Renamed,
    }
}

/// Convert one raw record. Never fails: unknown codes become
/// [`ChangeKind::Unexpected`].
pub fn to_change_event(raw: &RawEvent) -> ChangeEvent {
    let name = raw.old_file.as_deref().or(raw.file.as_deref());
    let old_path = match name {
        Some(name) => raw.directory.join(name),
        None => raw.directory.clone(),
    };

    match RawAction::from_code(raw.action).map(kind_for) {
        Some(ChangeKind::Renamed) => match raw.new_file.as_deref() {
            Some(new_name) => {
                let new_dir = raw.new_directory.as_ref().unwrap_or(&raw.directory);
                ChangeEvent::renamed(old_path, new_dir.join(new_name))
            }
            None => ChangeEvent::new(ChangeKind::Unexpected(action::RENAMED), old_path),
        },
        Some(kind) => ChangeEvent::new(kind, old_path),
        None => ChangeEvent::new(ChangeKind::Unexpected(raw.action), old_path),
    }
}

/// Convert a batch, preserving order and producing one event per record.
pub fn to_change_events(batch: &[RawEvent]) -> Vec<ChangeEvent> {
    batch.iter().map(to_change_event).collect()
}
