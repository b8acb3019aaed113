//! Configuration types for the watch engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One watched base directory and its path rules.
///
/// Rules are glob patterns evaluated against paths relative to
/// `base_dir`. They govern which files get metric records, not which
/// directories are traversed; an excluded directory is still walked so
/// included descendants are found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchTarget {
    /// Base directory the engine is responsible for.
    pub base_dir: PathBuf,

    /// Include patterns. Empty means every path not excluded.
    pub include: Vec<String>,

    /// Exclude patterns. Exclude wins over include.
    pub exclude: Vec<String>,

    /// Bounded wait on event arrival. `None` blocks until an event or
    /// cancellation arrives.
    pub poll_timeout: Option<Duration>,
}

impl WatchTarget {
    /// Create a target that tracks everything under `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            poll_timeout: None,
        }
    }

    /// Add an include pattern.
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    /// Bound the event wait so the loop re-checks its registry while
    /// idle.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }
}
