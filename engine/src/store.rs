//! Per-path metric state.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Last-known state of one tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Last-known size in bytes.
    pub size: u64,

    /// Last-known modification time.
    pub modified: DateTime<Utc>,

    /// When the engine first observed the path.
    pub first_seen: DateTime<Utc>,

    /// Change events that have touched the path since it was first
    /// observed. Zero for records seeded by a walk.
    pub changes: u64,
}

impl MetricRecord {
    /// Build a record from stat results.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let now = Utc::now();
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(now);

        Self {
            size: metadata.len(),
            modified,
            first_seen: now,
            changes: 0,
        }
    }

    /// Refresh size and mtime in place, counting the change.
    pub fn refresh(&mut self, metadata: &Metadata) {
        self.size = metadata.len();
        if let Ok(modified) = metadata.modified() {
            self.modified = modified.into();
        }
        self.changes += 1;
    }
}

/// Read-only, sorted point-in-time copy of the store.
pub type Snapshot = BTreeMap<PathBuf, MetricRecord>;

/// The path → record mapping: the single source of truth for what the
/// engine currently knows. Mutated only by the engine's worker task;
/// snapshot readers on other tasks synchronize through the lock.
#[derive(Debug, Default)]
pub struct MetricStore {
    records: RwLock<HashMap<PathBuf, MetricRecord>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh record for `path`, or refresh size and mtime of
    /// an existing one without counting a change. Used by walks, where
    /// a re-visited file is not an observed event.
    pub async fn observe(&self, path: impl Into<PathBuf>, metadata: &Metadata) {
        let mut records = self.records.write().await;
        match records.entry(path.into()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.size = metadata.len();
                if let Ok(modified) = metadata.modified() {
                    record.modified = modified.into();
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(MetricRecord::from_metadata(metadata));
            }
        }
    }

    /// Apply `f` to the record for `path`, if present. Returns whether
    /// a record existed.
    pub async fn update(&self, path: &Path, f: impl FnOnce(&mut MetricRecord)) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(path) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    /// Drop every record at or under `root`. Returns how many were
    /// removed.
    pub async fn remove_subtree(&self, root: &Path) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|path, _| !path.starts_with(root));
        before - records.len()
    }

    /// Drop records under `root` that are not in `seen`. Used by the
    /// corrective re-walk after an overflow.
    pub async fn retain_seen(&self, root: &Path, seen: &HashSet<PathBuf>) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|path, _| !path.starts_with(root) || seen.contains(path));
        before - records.len()
    }

    /// Whether a record exists for `path`.
    pub async fn contains(&self, path: &Path) -> bool {
        self.records.read().await.contains_key(path)
    }

    /// Number of tracked paths.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store tracks no paths.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Sorted point-in-time copy for the reporter.
    pub async fn snapshot(&self) -> Snapshot {
        self.records
            .read()
            .await
            .iter()
            .map(|(path, record)| (path.clone(), record.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn metadata_for(dir: &TempDir, name: &str, contents: &[u8]) -> (PathBuf, Metadata) {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        let metadata = fs::metadata(&path).unwrap();
        (path, metadata)
    }

    #[tokio::test]
    async fn test_observe_inserts_and_refreshes() {
        let dir = TempDir::new().unwrap();
        let store = MetricStore::new();
        let (path, metadata) = metadata_for(&dir, "a.log", b"0123456789");

        store.observe(&path, &metadata).await;
        assert_eq!(store.len().await, 1);

        let snapshot = store.snapshot().await;
        let record = &snapshot[&path];
        assert_eq!(record.size, 10);
        assert_eq!(record.changes, 0);

        // growing the file and re-observing keeps the change counter
        fs::write(&path, b"0123456789ab").unwrap();
        let metadata = fs::metadata(&path).unwrap();
        store.observe(&path, &metadata).await;

        let snapshot = store.snapshot().await;
        let record = &snapshot[&path];
        assert_eq!(record.size, 12);
        assert_eq!(record.changes, 0);
    }

    #[tokio::test]
    async fn test_update_counts_changes() {
        let dir = TempDir::new().unwrap();
        let store = MetricStore::new();
        let (path, metadata) = metadata_for(&dir, "a.log", b"abc");

        store.observe(&path, &metadata).await;
        assert!(store.update(&path, |record| record.refresh(&metadata)).await);
        assert!(store.update(&path, |record| record.refresh(&metadata)).await);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot[&path].changes, 2);

        assert!(!store.update(Path::new("/nope"), |_| {}).await);
    }

    #[tokio::test]
    async fn test_remove_subtree() {
        let dir = TempDir::new().unwrap();
        let store = MetricStore::new();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let (kept, kept_meta) = metadata_for(&dir, "a.log", b"a");
        let (doomed, doomed_meta) = metadata_for(&dir, "sub/b.log", b"b");
        store.observe(&kept, &kept_meta).await;
        store.observe(&doomed, &doomed_meta).await;

        assert_eq!(store.remove_subtree(&dir.path().join("sub")).await, 1);
        assert!(store.contains(&kept).await);
        assert!(!store.contains(&doomed).await);
    }

    #[tokio::test]
    async fn test_retain_seen_sweeps_unseen_only_under_root() {
        let dir = TempDir::new().unwrap();
        let store = MetricStore::new();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let (outside, outside_meta) = metadata_for(&dir, "a.log", b"a");
        let (seen, seen_meta) = metadata_for(&dir, "sub/b.log", b"b");
        let (stale, stale_meta) = metadata_for(&dir, "sub/c.log", b"c");
        store.observe(&outside, &outside_meta).await;
        store.observe(&seen, &seen_meta).await;
        store.observe(&stale, &stale_meta).await;

        let mut seen_set = HashSet::new();
        seen_set.insert(seen.clone());

        let swept = store
            .retain_seen(&dir.path().join("sub"), &seen_set)
            .await;
        assert_eq!(swept, 1);
        assert!(store.contains(&outside).await);
        assert!(store.contains(&seen).await);
        assert!(!store.contains(&stale).await);
    }

    #[tokio::test]
    async fn test_snapshot_is_sorted() {
        let dir = TempDir::new().unwrap();
        let store = MetricStore::new();

        for name in ["c.log", "a.log", "b.log"] {
            let (path, metadata) = metadata_for(&dir, name, b"x");
            store.observe(&path, &metadata).await;
        }

        let keys: Vec<PathBuf> = store.snapshot().await.into_keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
