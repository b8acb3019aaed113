//! Scripted watch backend for deterministic tests.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::backend::{WatchBackend, WatchToken};
use crate::error::{EngineError, Result};
use crate::event::BackendEvent;

/// Shared view of the directories a [`ScriptedBackend`] is watching.
pub type WatchedDirs = Arc<Mutex<HashMap<WatchToken, PathBuf>>>;

/// Handle for pushing scripted batches into a [`ScriptedBackend`].
#[derive(Clone)]
pub struct Script {
    tx: mpsc::UnboundedSender<Vec<BackendEvent>>,
}

impl Script {
    pub fn push(&self, batch: Vec<BackendEvent>) {
        self.tx.send(batch).expect("scripted backend dropped");
    }
}

/// In-memory backend that replays scripted event batches and records
/// which directories are watched, so tests can assert on registration
/// without touching the OS watch primitive.
#[derive(Debug)]
pub struct ScriptedBackend {
    rx: mpsc::UnboundedReceiver<Vec<BackendEvent>>,
    watched: WatchedDirs,
    fail_on: Vec<PathBuf>,
    next_token: u64,
}

impl ScriptedBackend {
    pub fn new() -> (Self, Script, WatchedDirs) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watched: WatchedDirs = Arc::new(Mutex::new(HashMap::new()));

        let backend = Self {
            rx,
            watched: Arc::clone(&watched),
            fail_on: Vec::new(),
            next_token: 0,
        };

        (backend, Script { tx }, watched)
    }

    /// Make registration of `dir` fail, simulating a directory that
    /// vanished before it could be watched.
    pub fn fail_registration_of(&mut self, dir: impl Into<PathBuf>) {
        self.fail_on.push(dir.into());
    }
}

#[async_trait]
impl WatchBackend for ScriptedBackend {
    fn watch(&mut self, dir: &Path) -> Result<WatchToken> {
        if self.fail_on.iter().any(|failing| failing == dir) {
            return Err(EngineError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} vanished before registration", dir.display()),
            )));
        }

        let token = WatchToken::new(self.next_token);
        self.next_token += 1;
        self.watched
            .lock()
            .expect("watched map poisoned")
            .insert(token, dir.to_path_buf());
        Ok(token)
    }

    fn unwatch(&mut self, token: WatchToken) -> Result<()> {
        self.watched
            .lock()
            .expect("watched map poisoned")
            .remove(&token);
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Vec<BackendEvent>> {
        self.rx.recv().await.ok_or(EngineError::BackendClosed)
    }
}
