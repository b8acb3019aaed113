//! Change events delivered by the watch backend.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kind of change observed for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Entry appeared. Covers files and directories.
    Created,

    /// Entry contents or metadata changed.
    Modified,

    /// Entry disappeared.
    Deleted,
}

/// One change notification: the watched directory it was observed in,
/// the entry name inside it, and what happened. Transient: consumed by
/// the reconciler, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    /// Directory the event was observed in.
    pub dir: PathBuf,

    /// Entry name within `dir`.
    pub name: PathBuf,

    /// What happened.
    pub kind: ChangeKind,
}

impl WatchEvent {
    /// Create an event from a directory context and entry name.
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            kind,
        }
    }

    /// Event for a full path, split into directory context and entry
    /// name. `None` for paths without a parent (filesystem roots).
    pub fn for_path(path: &Path, kind: ChangeKind) -> Option<Self> {
        let dir = path.parent()?;
        let name = path.file_name()?;
        Some(Self::new(dir, name, kind))
    }

    /// Full path of the affected entry.
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

/// What the backend hands the event loop: resolved changes, or the
/// coalesced-overflow signal that individual changes were lost and a
/// re-walk of the given directory (the whole base directory when
/// unattributed) is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// A resolved change notification.
    Change(WatchEvent),

    /// The backend lost events for the given directory.
    Overflow(Option<PathBuf>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_path_joins_dir_and_name() {
        let event = WatchEvent::new("/data/sub", "a.log", ChangeKind::Created);
        assert_eq!(event.path(), PathBuf::from("/data/sub/a.log"));
    }

    #[test]
    fn test_for_path_splits_into_context_and_name() {
        let event = WatchEvent::for_path(Path::new("/data/sub/a.log"), ChangeKind::Deleted).unwrap();

        assert_eq!(event.dir, PathBuf::from("/data/sub"));
        assert_eq!(event.name, PathBuf::from("a.log"));
        assert_eq!(event.kind, ChangeKind::Deleted);
    }

    #[test]
    fn test_for_path_rejects_root() {
        assert!(WatchEvent::for_path(Path::new("/"), ChangeKind::Modified).is_none());
    }
}
