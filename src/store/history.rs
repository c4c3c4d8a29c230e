//! Per-bridge history files
//!
//! One JSON file per bridge under the history directory, entries
//! newest-first, capped at 300. Each file has exactly one writer path (the
//! scraper's transition append and the statistics trim), so no cross-file
//! locking is needed; writes still go through the atomic primitive.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::types::{BridgeStatus, HistoryEntry};

use super::{atomic_write, StoreError};

/// Hard cap on retained entries per bridge; newest wins.
pub const HISTORY_CAP: usize = 300;

/// Reader/writer for `data/history/{bridge_id}.json`.
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, bridge_id: &str) -> PathBuf {
        self.dir.join(format!("{bridge_id}.json"))
    }

    /// Load a bridge's history, newest-first. Missing files are empty.
    pub async fn load(&self, bridge_id: &str) -> Vec<HistoryEntry> {
        let path = self.path_for(bridge_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("failed to read history {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("history {} is unparsable, treating as empty: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Record a status transition at `at`: close the open entry (fill
    /// `end_time` and `duration`), prepend a new open entry for the new
    /// status, truncate to the cap, rewrite.
    pub async fn record_transition(
        &self,
        bridge_id: &str,
        new_status: BridgeStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut entries = self.load(bridge_id).await;

        if let Some(open) = entries.first_mut() {
            if open.end_time.is_none() {
                open.close(at);
            }
        }

        entries.insert(0, HistoryEntry::open(new_status, at));
        entries.truncate(HISTORY_CAP);

        self.replace(bridge_id, &entries).await
    }

    /// Rewrite a bridge's history wholesale (the statistics trim path).
    pub async fn replace(&self, bridge_id: &str, entries: &[HistoryEntry]) -> Result<(), StoreError> {
        let capped = if entries.len() > HISTORY_CAP {
            &entries[..HISTORY_CAP]
        } else {
            entries
        };
        let bytes = serde_json::to_vec_pretty(capped)?;
        atomic_write(&self.path_for(bridge_id), &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn missing_history_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        assert!(store.load("sct-carlton").await.is_empty());
    }

    #[tokio::test]
    async fn transition_closes_previous_and_prepends() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());

        store.record_transition("sct-carlton", BridgeStatus::Closed, ts(1_000)).await.unwrap();
        store.record_transition("sct-carlton", BridgeStatus::Opening, ts(1_900)).await.unwrap();
        store.record_transition("sct-carlton", BridgeStatus::Open, ts(2_000)).await.unwrap();

        let entries = store.load("sct-carlton").await;
        assert_eq!(entries.len(), 3);

        // Newest first.
        assert_eq!(entries[0].status, BridgeStatus::Open);
        assert_eq!(entries[1].status, BridgeStatus::Opening);
        assert_eq!(entries[2].status, BridgeStatus::Closed);

        // Open entry has no end; closed ones end where the successor starts.
        assert!(entries[0].end_time.is_none());
        assert_eq!(entries[1].end_time, Some(entries[0].start_time));
        assert_eq!(entries[2].end_time, Some(entries[1].start_time));
        assert_eq!(entries[2].duration, Some(900));
    }

    #[tokio::test]
    async fn history_caps_at_300_newest_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());

        for i in 0..310 {
            let status = if i % 2 == 0 { BridgeStatus::Closed } else { BridgeStatus::Open };
            store.record_transition("pc-main", status, ts(i * 60)).await.unwrap();
        }

        let entries = store.load("pc-main").await;
        assert_eq!(entries.len(), HISTORY_CAP);
        assert_eq!(entries[0].start_time, ts(309 * 60));
    }

    #[tokio::test]
    async fn start_times_are_non_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());

        for (i, status) in [BridgeStatus::ClosingSoon, BridgeStatus::Closing, BridgeStatus::Closed]
            .iter()
            .enumerate()
        {
            store.record_transition("k-stecatherine", *status, ts(i as i64 * 120)).await.unwrap();
        }

        let entries = store.load("k-stecatherine").await;
        for pair in entries.windows(2) {
            assert!(pair[0].start_time >= pair[1].start_time);
        }
    }

    #[tokio::test]
    async fn replace_truncates_over_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());

        let entries: Vec<HistoryEntry> = (0..320)
            .map(|i| HistoryEntry::open(BridgeStatus::Open, ts(i)))
            .collect();
        store.replace("sbs-larocque", &entries).await.unwrap();
        assert_eq!(store.load("sbs-larocque").await.len(), HISTORY_CAP);
    }
}
