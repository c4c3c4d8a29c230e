//! Snapshot file
//!
//! The denormalized union of all bridges' static and live records. A single
//! process-wide writer mutex serializes writers (scraper tick and the
//! statistics recompute); HTTP readers may open the file concurrently because
//! the rename in `atomic_write` keeps it whole.

use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::warn;

use crate::types::Snapshot;

use super::{atomic_write, StoreError};

/// Writer for `data/bridges.json`.
pub struct SnapshotStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    /// Load the snapshot from disk. Missing or unparsable files are treated
    /// as empty and logged; recovery never fails startup.
    pub async fn load(&self) -> Option<Snapshot> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("failed to read snapshot {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(
                    "snapshot {} is unparsable, starting empty: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Persist the snapshot atomically under the writer mutex.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let _guard = self.write_lock.lock().await;
        atomic_write(&self.path, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn missing_snapshot_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("bridges.json"));
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn unparsable_snapshot_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridges.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let store = SnapshotStore::new(path);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("bridges.json"));

        let snapshot = Snapshot::empty(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        store.write(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, snapshot);
    }
}
