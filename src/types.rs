// src/types.rs

//! Event shapes shared by sessions, handles and watches.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};

/// Raw action codes as reported by a native session.
pub mod action {
    pub const CREATED: u32 = 0;
    pub const DELETED: u32 = 1;
    pub const MODIFIED: u32 = 2;
    pub const RENAMED: u32 = 3;
    /// Reported for native kinds that have no closed mapping.
    pub const OTHER_ACTION: u32 = 4;
}

/// The closed set of raw actions the core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawAction {
    Created,
    Deleted,
    Modified,
    Renamed,
}

impl RawAction {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            action::CREATED => Some(RawAction::Created),
            action::DELETED => Some(RawAction::Deleted),
            action::MODIFIED => Some(RawAction::Modified),
            action::RENAMED => Some(RawAction::Renamed),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            RawAction::Created => action::CREATED,
            RawAction::Deleted => action::DELETED,
            RawAction::Modified => action::MODIFIED,
            RawAction::Renamed => action::RENAMED,
        }
    }
}

/// One record as produced by a native session.
///
/// Paths are split into a directory and file names. For renames the old and
/// new names are both set, and `new_directory` is set when the entry moved to
/// another directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub action: u32,
    pub directory: PathBuf,
    pub file: Option<String>,
    pub old_file: Option<String>,
    pub new_file: Option<String>,
    pub new_directory: Option<PathBuf>,
}

impl RawEvent {
    /// Build a non-rename record from a full path.
    pub fn for_path(action: u32, path: &Path) -> Self {
        let (directory, file) = split_path(path);
        Self {
            action,
            directory,
            file,
            old_file: None,
            new_file: None,
            new_directory: None,
        }
    }

    /// Build a rename record from the two full paths.
    pub fn rename(from: &Path, to: &Path) -> Self {
        let (directory, old_file) = split_path(from);
        let (to_dir, new_file) = split_path(to);
        let new_directory = (to_dir != directory).then_some(to_dir);
        Self {
            action: action::RENAMED,
            directory,
            file: None,
            old_file,
            new_file,
            new_directory,
        }
    }
}

fn split_path(path: &Path) -> (PathBuf, Option<String>) {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => (
            parent.to_path_buf(),
            Some(name.to_string_lossy().into_owned()),
        ),
        _ => (path.to_path_buf(), None),
    }
}

/// Normalized kind of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Changed,
    Deleted,
    Renamed,
    /// A raw action code with no closed mapping.
    Unexpected(u32),
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => f.write_str("added"),
            ChangeKind::Changed => f.write_str("changed"),
            ChangeKind::Deleted => f.write_str("deleted"),
            ChangeKind::Renamed => f.write_str("renamed"),
            ChangeKind::Unexpected(code) => write!(f, "unexpected({code})"),
        }
    }
}

impl Serialize for ChangeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A normalized filesystem change.
///
/// `old_path` is always set. `new_path` is set if and only if the kind is
/// [`ChangeKind::Renamed`]; the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    old_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_path: Option<PathBuf>,
    kind: ChangeKind,
}

impl ChangeEvent {
    /// A non-rename change. Passing [`ChangeKind::Renamed`] here is reported as
    /// `unexpected` since there is no destination path.
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        let kind = match kind {
            ChangeKind::Renamed => ChangeKind::Unexpected(action::RENAMED),
            other => other,
        };
        Self {
            old_path: path.into(),
            new_path: None,
            kind,
        }
    }

    pub fn renamed(old_path: impl Into<PathBuf>, new_path: impl Into<PathBuf>) -> Self {
        Self {
            old_path: old_path.into(),
            new_path: Some(new_path.into()),
            kind: ChangeKind::Renamed,
        }
    }

    pub fn old_path(&self) -> &Path {
        &self.old_path
    }

    pub fn new_path(&self) -> Option<&Path> {
        self.new_path.as_deref()
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.new_path {
            Some(new_path) => write!(
                f,
                "{} {} -> {}",
                self.kind,
                self.old_path.display(),
                new_path.display()
            ),
            None => write!(f, "{} {}", self.kind, self.old_path.display()),
        }
    }
}
