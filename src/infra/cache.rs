//! Persistent on-disk snapshots of fetched datasets, with a 24h TTL.

use std::{
    fs, io,
    path::PathBuf,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::ImportRecord;

const SNAPSHOT_FILENAME: &str = "dataset_snapshot.json";

/// Snapshot TTL: 24 hours. Annual trade figures revise rarely.
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A fetched dataset written to disk, keyed by the request it answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    /// Canonical request key this snapshot answers.
    pub query: String,
    /// Unix timestamp (seconds) when this snapshot was created.
    pub cached_at: u64,
    /// The records as returned by the API.
    pub records: Vec<ImportRecord>,
}

impl DatasetSnapshot {
    /// Create a new snapshot with the current timestamp.
    pub fn new(query: String, records: Vec<ImportRecord>) -> Self {
        Self {
            query,
            cached_at: unix_now(),
            records,
        }
    }

    /// Check if the snapshot is older than [`SNAPSHOT_TTL`].
    pub fn is_expired(&self) -> bool {
        self.age() > SNAPSHOT_TTL
    }

    /// Get snapshot age as Duration.
    pub fn age(&self) -> Duration {
        Duration::from_secs(unix_now().saturating_sub(self.cached_at))
    }

    /// Human-readable age string.
    pub fn age_string(&self) -> String {
        let secs = self.age().as_secs();
        if secs < 60 {
            format!("{secs}s")
        } else if secs < 3600 {
            format!("{}m", secs / 60)
        } else if secs < 86400 {
            format!("{}h", secs / 3600)
        } else {
            format!("{}d", secs / 86400)
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// File-backed store for the most recent [`DatasetSnapshot`].
///
/// Loading returns the snapshot whether or not it has expired; the caller
/// decides what an expired snapshot is still good for.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store in the per-user data directory.
    pub fn open_default() -> Self {
        let dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("import-analytics");
        Self::new(dir)
    }

    fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILENAME)
    }

    /// Load the stored snapshot if it exists and answers `query`.
    pub fn load(&self, query: &str) -> Option<DatasetSnapshot> {
        let path = self.path();
        if !path.exists() {
            debug!("no dataset snapshot at {}", path.display());
            return None;
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) => {
                warn!("failed to read dataset snapshot: {error}");
                return None;
            }
        };
        let snapshot: DatasetSnapshot = match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!("failed to parse dataset snapshot: {error}");
                return None;
            }
        };

        if snapshot.query != query {
            debug!(
                "dataset snapshot answers a different query ({})",
                snapshot.query
            );
            return None;
        }
        Some(snapshot)
    }

    /// Save the snapshot, replacing whatever was stored before.
    pub fn save(&self, snapshot: &DatasetSnapshot) -> Result<(), io::Error> {
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(snapshot)?;
        let path = self.path();
        fs::write(&path, content)?;
        debug!(
            "saved dataset snapshot ({} records, query {}) to {}",
            snapshot.records.len(),
            snapshot.query,
            path.display()
        );
        Ok(())
    }

    /// Delete the stored snapshot, if any.
    pub fn clear(&self) -> Result<(), io::Error> {
        let path = self.path();
        if path.exists() {
            fs::remove_file(&path)?;
            debug!("cleared dataset snapshot at {}", path.display());
        }
        Ok(())
    }
}
