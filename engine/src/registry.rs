//! Lifecycle table for active directory watches.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::backend::{WatchBackend, WatchToken};
use crate::error::Result;
use crate::event::BackendEvent;

/// Maps live watch tokens to the directories they cover and owns the
/// backend that issued them. A directory has at most one live token;
/// the engine's loop runs exactly while this table is non-empty.
#[derive(Debug)]
pub struct WatchRegistry<B: WatchBackend> {
    backend: B,
    tokens: HashMap<WatchToken, PathBuf>,
    dirs: HashMap<PathBuf, WatchToken>,
}

impl<B: WatchBackend> WatchRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            tokens: HashMap::new(),
            dirs: HashMap::new(),
        }
    }

    /// Begin watching `dir`. Registering an already watched directory
    /// is a no-op returning the existing token; a failure means the
    /// directory was unreachable and only that subtree is affected.
    pub fn register(&mut self, dir: &Path) -> Result<WatchToken> {
        if let Some(token) = self.dirs.get(dir) {
            return Ok(*token);
        }

        let token = self.backend.watch(dir)?;
        debug!("watching {}", dir.display());
        self.tokens.insert(token, dir.to_path_buf());
        self.dirs.insert(dir.to_path_buf(), token);
        Ok(token)
    }

    /// Stop watching the directory behind `token`. Unknown tokens are
    /// a no-op.
    pub fn unregister(&mut self, token: WatchToken) {
        if let Some(dir) = self.tokens.remove(&token) {
            self.dirs.remove(&dir);
            debug!("retired watch on {}", dir.display());
            if let Err(err) = self.backend.unwatch(token) {
                warn!("failed to release watch on {}: {err}", dir.display());
            }
        }
    }

    /// Retire the watch for `root` and every watched descendant.
    /// Returns how many watches were released.
    pub fn remove_subtree(&mut self, root: &Path) -> usize {
        let doomed: Vec<WatchToken> = self
            .tokens
            .iter()
            .filter(|(_, dir)| dir.starts_with(root))
            .map(|(token, _)| *token)
            .collect();

        for token in &doomed {
            self.unregister(*token);
        }
        doomed.len()
    }

    /// Whether `dir` currently has a live watch.
    pub fn contains(&self, dir: &Path) -> bool {
        self.dirs.contains_key(dir)
    }

    /// Token currently covering `dir`, if any.
    pub fn token_for(&self, dir: &Path) -> Option<WatchToken> {
        self.dirs.get(dir).copied()
    }

    /// Directories watched at or under `root`.
    pub fn watched_under(&self, root: &Path) -> Vec<PathBuf> {
        self.dirs
            .keys()
            .filter(|dir| dir.starts_with(root))
            .cloned()
            .collect()
    }

    /// True when no directories remain watched.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of live watches.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Retire every live watch. Used on cancellation.
    pub fn drain(&mut self) {
        let all: Vec<WatchToken> = self.tokens.keys().copied().collect();
        for token in all {
            self.unregister(token);
        }
    }

    /// Wait for the next batch of events from the backend.
    pub async fn next_batch(&mut self) -> Result<Vec<BackendEvent>> {
        self.backend.next_batch().await
    }
}
