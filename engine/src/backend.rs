//! The OS watch capability consumed by the engine.
//!
//! The engine talks to the operating system through [`WatchBackend`] so
//! the event source can be swapped for a scripted one in tests. The
//! production implementation wraps `notify` with one non-recursive
//! watch per directory, matching the per-directory token model kept by
//! the registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::event::{BackendEvent, ChangeKind, WatchEvent};

/// Opaque token for one registered directory watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchToken(u64);

impl WatchToken {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }
}

/// Capability interface over the OS file-change notification primitive.
#[async_trait]
pub trait WatchBackend: Send {
    /// Begin monitoring `dir` (non-recursively) for create, modify and
    /// delete events. Fails if the directory is unreachable.
    fn watch(&mut self, dir: &Path) -> Result<WatchToken>;

    /// Release the watch behind `token`. Unknown tokens are a no-op.
    fn unwatch(&mut self, token: WatchToken) -> Result<()>;

    /// Block until at least one event is available. An error means the
    /// watch subsystem itself is gone.
    async fn next_batch(&mut self) -> Result<Vec<BackendEvent>>;
}

/// Production backend over `notify`.
///
/// Events are bridged from the notify callback thread into an unbounded
/// channel; the callback never blocks. Rescan flags surface as
/// [`BackendEvent::Overflow`].
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<BackendEvent>,
    dirs: HashMap<WatchToken, PathBuf>,
    next_token: u64,
}

impl NotifyBackend {
    /// Create the backend and its event bridge.
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(
            move |result: std::result::Result<notify::Event, notify::Error>| match result {
                Ok(event) => {
                    for translated in translate(&event) {
                        let _ = tx.send(translated);
                    }
                }
                Err(err) => warn!("watch backend error: {err}"),
            },
        )?;

        Ok(Self {
            watcher,
            rx,
            dirs: HashMap::new(),
            next_token: 0,
        })
    }
}

#[async_trait]
impl WatchBackend for NotifyBackend {
    fn watch(&mut self, dir: &Path) -> Result<WatchToken> {
        self.watcher.watch(dir, RecursiveMode::NonRecursive)?;
        let token = WatchToken::new(self.next_token);
        self.next_token += 1;
        self.dirs.insert(token, dir.to_path_buf());
        Ok(token)
    }

    fn unwatch(&mut self, token: WatchToken) -> Result<()> {
        if let Some(dir) = self.dirs.remove(&token) {
            // A watch on a deleted directory is already gone at the OS
            // level; unwatch failure there is expected.
            if let Err(err) = self.watcher.unwatch(&dir) {
                debug!("unwatch {}: {err}", dir.display());
            }
        }
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Vec<BackendEvent>> {
        let first = self.rx.recv().await.ok_or(EngineError::BackendClosed)?;
        let mut batch = vec![first];
        while let Ok(event) = self.rx.try_recv() {
            batch.push(event);
        }
        Ok(batch)
    }
}

/// Translate one notify event into engine events.
///
/// Renames surface as a delete of the old path and a create of the new
/// one; access events are dropped; rescan requests become the overflow
/// signal.
fn translate(event: &notify::Event) -> Vec<BackendEvent> {
    if event.need_rescan() {
        return vec![BackendEvent::Overflow(event.paths.first().cloned())];
    }

    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
        if let [from, to] = event.paths.as_slice() {
            return [
                WatchEvent::for_path(from, ChangeKind::Deleted),
                WatchEvent::for_path(to, ChangeKind::Created),
            ]
            .into_iter()
            .flatten()
            .map(BackendEvent::Change)
            .collect();
        }
        return Vec::new();
    }

    let Some(kind) = classify(&event.kind) else {
        return Vec::new();
    };

    event
        .paths
        .iter()
        .filter_map(|path| WatchEvent::for_path(path, kind).map(BackendEvent::Change))
        .collect()
}

/// Collapse notify's event taxonomy into the engine's three kinds.
fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, Flag, RemoveKind};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_translate_create() {
        let event =
            notify::Event::new(EventKind::Create(CreateKind::File)).add_path("/data/a.log".into());

        assert_eq!(
            translate(&event),
            vec![BackendEvent::Change(WatchEvent::new(
                "/data",
                "a.log",
                ChangeKind::Created
            ))]
        );
    }

    #[test]
    fn test_translate_remove() {
        let event =
            notify::Event::new(EventKind::Remove(RemoveKind::Any)).add_path("/data/a.log".into());

        assert_eq!(
            translate(&event),
            vec![BackendEvent::Change(WatchEvent::new(
                "/data",
                "a.log",
                ChangeKind::Deleted
            ))]
        );
    }

    #[test]
    fn test_translate_rename_pair() {
        let event = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/data/old.log".into())
            .add_path("/data/new.log".into());

        assert_eq!(
            translate(&event),
            vec![
                BackendEvent::Change(WatchEvent::new("/data", "old.log", ChangeKind::Deleted)),
                BackendEvent::Change(WatchEvent::new("/data", "new.log", ChangeKind::Created)),
            ]
        );
    }

    #[test]
    fn test_translate_rescan_as_overflow() {
        let event = notify::Event::new(EventKind::Other)
            .add_path("/data/sub".into())
            .set_flag(Flag::Rescan);

        assert_eq!(
            translate(&event),
            vec![BackendEvent::Overflow(Some("/data/sub".into()))]
        );
    }

    #[test]
    fn test_access_events_are_dropped() {
        let event = notify::Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path("/data/a.log".into());

        assert!(translate(&event).is_empty());
    }

    #[test]
    fn test_watch_and_unwatch_track_tokens() {
        let dir = TempDir::new().unwrap();
        let mut backend = NotifyBackend::new().unwrap();

        let token = backend.watch(dir.path()).unwrap();
        assert_eq!(backend.dirs.len(), 1);

        backend.unwatch(token).unwrap();
        assert!(backend.dirs.is_empty());

        // unknown tokens are a no-op
        backend.unwatch(token).unwrap();
    }
}
