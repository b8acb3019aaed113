//! Recursive traversal that seeds and repairs the metric store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::backend::WatchBackend;
use crate::filter::PathFilter;
use crate::registry::WatchRegistry;
use crate::store::MetricStore;

/// Outcome of one walk.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkStats {
    /// Records inserted or refreshed.
    pub recorded: usize,

    /// Directories registered with the watch registry.
    pub registered: usize,

    /// Entries skipped because they were unreadable or unregistrable.
    pub skipped: usize,
}

/// Paths encountered by a corrective walk, kept so the sweep can tell
/// stale state from live state.
#[derive(Default)]
struct Observed {
    files: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
}

/// Walk `root` depth-first, registering every directory *before* its
/// entries are enumerated and recording every matching regular file.
///
/// Directories are traversed regardless of whether they match the
/// filter; rules govern metric inclusion, not reachability. Unreadable
/// subtrees and directories that vanish before registration are skipped
/// with a warning, never fatal.
pub async fn walk<B: WatchBackend>(
    root: &Path,
    filter: &PathFilter,
    store: &MetricStore,
    registry: &mut WatchRegistry<B>,
) -> WalkStats {
    walk_inner(root, filter, store, registry, None).await
}

/// Corrective walk after an overflow: the same traversal, followed by a
/// sweep of store records and registry watches under `root` that the
/// walk did not encounter.
pub async fn resync<B: WatchBackend>(
    root: &Path,
    filter: &PathFilter,
    store: &MetricStore,
    registry: &mut WatchRegistry<B>,
) -> WalkStats {
    let mut observed = Observed::default();
    let stats = walk_inner(root, filter, store, registry, Some(&mut observed)).await;

    let swept = store.retain_seen(root, &observed.files).await;
    if swept > 0 {
        debug!("swept {swept} stale records under {}", root.display());
    }

    for dir in registry.watched_under(root) {
        if !observed.dirs.contains(&dir) {
            if let Some(token) = registry.token_for(&dir) {
                registry.unregister(token);
            }
        }
    }

    stats
}

async fn walk_inner<B: WatchBackend>(
    root: &Path,
    filter: &PathFilter,
    store: &MetricStore,
    registry: &mut WatchRegistry<B>,
    mut observed: Option<&mut Observed>,
) -> WalkStats {
    let mut stats = WalkStats::default();
    let mut entries = WalkDir::new(root).follow_links(false).into_iter();

    loop {
        let entry = match entries.next() {
            None => break,
            Some(Ok(entry)) => entry,
            Some(Err(err)) => {
                warn!("skipping unreadable entry under {}: {err}", root.display());
                stats.skipped += 1;
                continue;
            }
        };

        let path = entry.path();

        if entry.file_type().is_dir() {
            // A directory must be watched before its entries are read,
            // or children created in between would be lost.
            match registry.register(path) {
                Ok(_) => {
                    stats.registered += 1;
                    if let Some(observed) = observed.as_deref_mut() {
                        observed.dirs.insert(path.to_path_buf());
                    }
                }
                Err(err) => {
                    warn!("cannot watch {}: {err}; skipping subtree", path.display());
                    stats.skipped += 1;
                    entries.skip_current_dir();
                }
            }
            continue;
        }

        if !entry.file_type().is_file() || !filter.matches(path) {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) => {
                store.observe(path, &metadata).await;
                stats.recorded += 1;
                if let Some(observed) = observed.as_deref_mut() {
                    observed.files.insert(path.to_path_buf());
                }
            }
            Err(err) => {
                debug!("cannot stat {}: {err}", path.display());
                stats.skipped += 1;
            }
        }
    }

    stats
}
