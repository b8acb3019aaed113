//! The watch engine: baseline walk, event loop, reconciliation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::WatchBackend;
use crate::config::WatchTarget;
use crate::error::{EngineError, Result};
use crate::event::{BackendEvent, ChangeKind, WatchEvent};
use crate::filter::PathFilter;
use crate::registry::WatchRegistry;
use crate::store::MetricStore;
use crate::walker;

/// Lifecycle phase of a [`WatchEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Baseline walk in progress.
    Starting,

    /// Steady-state event processing.
    Watching,

    /// The registry drained; nothing is left to watch.
    Drained,
}

/// One base directory's watch engine.
///
/// Drives the baseline walk, then reconciles filesystem events into the
/// metric store until the watch registry drains or the engine is
/// cancelled. All state is mutated by the single task driving
/// [`WatchEngine::run`]; other tasks read metrics through the shared
/// [`MetricStore`] handle.
#[derive(Debug)]
pub struct WatchEngine<B: WatchBackend> {
    target: WatchTarget,
    filter: PathFilter,
    store: Arc<MetricStore>,
    registry: WatchRegistry<B>,
    cancel: CancellationToken,
    state: EngineState,
}

impl<B: WatchBackend> WatchEngine<B> {
    /// Validate the target and assemble an engine over `backend`.
    pub fn new(target: WatchTarget, backend: B) -> Result<Self> {
        if !target.base_dir.exists() {
            return Err(EngineError::BaseDirectoryNotFound(
                target.base_dir.display().to_string(),
            ));
        }
        if !target.base_dir.is_dir() {
            return Err(EngineError::NotADirectory(
                target.base_dir.display().to_string(),
            ));
        }

        let filter = PathFilter::new(&target)?;

        Ok(Self {
            filter,
            store: Arc::new(MetricStore::new()),
            registry: WatchRegistry::new(backend),
            cancel: CancellationToken::new(),
            state: EngineState::Starting,
            target,
        })
    }

    /// Shared handle to this engine's metric store.
    pub fn store(&self) -> Arc<MetricStore> {
        Arc::clone(&self.store)
    }

    /// Token that stops the engine when cancelled: the event wait is
    /// unblocked, every live watch is released, and `run` returns
    /// without further reconciliation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run to completion: baseline walk, then the event loop.
    ///
    /// Returns `Ok(EngineState::Drained)` when every watched directory
    /// is gone, or `Ok(EngineState::Watching)` when cancelled mid-loop.
    /// Only configuration and watch-subsystem failures are errors.
    pub async fn run(mut self) -> Result<EngineState> {
        self.baseline().await;
        self.watch().await
    }

    /// Perform the one-time baseline walk: register the base directory
    /// tree and seed the store. Transitions the engine into `Watching`;
    /// a snapshot taken afterwards reflects the tree as walked.
    pub async fn baseline(&mut self) -> walker::WalkStats {
        let base = &self.target.base_dir;

        info!("walking {}", base.display());
        let stats = walker::walk(base, &self.filter, &self.store, &mut self.registry).await;
        info!(
            "baseline for {}: {} files recorded, {} directories watched, {} entries skipped",
            base.display(),
            stats.recorded,
            stats.registered,
            stats.skipped,
        );

        self.state = EngineState::Watching;
        debug!("watching {} for events", base.display());
        stats
    }

    /// Drive the event loop until the registry drains, the engine is
    /// cancelled, or the watch subsystem fails.
    pub async fn watch(mut self) -> Result<EngineState> {
        let base = self.target.base_dir.clone();

        loop {
            if self.registry.is_empty() {
                info!("no directories left to watch under {}", base.display());
                self.state = EngineState::Drained;
                return Ok(self.state);
            }

            let cancel = self.cancel.clone();
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("cancelled; releasing watches under {}", base.display());
                    self.registry.drain();
                    return Ok(self.state);
                }
                result = Self::wait_for_events(&mut self.registry, self.target.poll_timeout) => result,
            };

            let batch = match result {
                Ok(batch) => batch,
                Err(err) => {
                    warn!("watch subsystem lost for {}: {err}", base.display());
                    self.registry.drain();
                    return Err(err);
                }
            };

            for event in batch {
                match event {
                    BackendEvent::Change(change) => self.apply(change).await,
                    BackendEvent::Overflow(dir) => self.recover(dir).await,
                }
            }
        }
    }

    /// One bounded (or unbounded) wait on event arrival. A timeout
    /// yields an empty batch so the loop can re-check its registry.
    async fn wait_for_events(
        registry: &mut WatchRegistry<B>,
        poll_timeout: Option<Duration>,
    ) -> Result<Vec<BackendEvent>> {
        match poll_timeout {
            Some(timeout) => match time::timeout(timeout, registry.next_batch()).await {
                Ok(result) => result,
                Err(_) => Ok(Vec::new()),
            },
            None => registry.next_batch().await,
        }
    }

    /// Reconcile one change notification into the store and registry.
    async fn apply(&mut self, event: WatchEvent) {
        let path = event.path();
        debug!("{:?} {}", event.kind, path.display());

        match event.kind {
            ChangeKind::Created => self.on_created(&path).await,
            ChangeKind::Modified => self.on_modified(&path).await,
            ChangeKind::Deleted => self.on_deleted(&path).await,
        }
    }

    async fn on_created(&mut self, path: &Path) {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("cannot resolve created path {}: {err}", path.display());
                return;
            }
        };

        if metadata.is_dir() {
            // Watch the new directory, then pick up anything already
            // inside it by the time the event arrived.
            let stats = walker::walk(path, &self.filter, &self.store, &mut self.registry).await;
            debug!(
                "created directory {}: {} files recorded, {} watches added",
                path.display(),
                stats.recorded,
                stats.registered,
            );
        } else if metadata.is_file() && self.filter.matches(path) {
            self.store.observe(path, &metadata).await;
        }
    }

    async fn on_modified(&mut self, path: &Path) {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!("cannot resolve modified path {}: {err}", path.display());
                return;
            }
        };

        if !metadata.is_file() {
            return;
        }

        let refreshed = self
            .store
            .update(path, |record| record.refresh(&metadata))
            .await;

        // Some platforms coalesce create+modify; an unknown but
        // matching path is treated as a creation.
        if !refreshed && self.filter.matches(path) {
            self.store.observe(path, &metadata).await;
        }
    }

    async fn on_deleted(&mut self, path: &Path) {
        let dropped = self.store.remove_subtree(path).await;
        if dropped > 0 {
            debug!("dropped {dropped} records under deleted {}", path.display());
        }

        if self.registry.contains(path) {
            let retired = self.registry.remove_subtree(path);
            debug!("retired {retired} watches under deleted {}", path.display());
        }
    }

    /// An overflow means events were lost; re-walk the affected subtree
    /// (or the whole base directory) to restore consistency.
    async fn recover(&mut self, dir: Option<PathBuf>) {
        let root = match dir {
            Some(dir) if dir.starts_with(&self.target.base_dir) => dir,
            _ => self.target.base_dir.clone(),
        };

        warn!("event overflow; re-walking {}", root.display());
        let stats = walker::resync(&root, &self.filter, &self.store, &mut self.registry).await;
        debug!(
            "re-walk of {}: {} files recorded",
            root.display(),
            stats.recorded,
        );
    }
}
