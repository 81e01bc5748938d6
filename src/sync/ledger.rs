//! Persisted per-playlist download progress

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Which tracks of a playlist are done and which failed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressLedger {
    #[serde(default)]
    pub completed: BTreeSet<String>,
    #[serde(default)]
    pub failed: BTreeSet<String>,
    /// Unix seconds of the last save
    #[serde(default)]
    pub saved_at: i64,
}

impl ProgressLedger {
    pub fn mark_completed(&mut self, track_id: &str) {
        self.failed.remove(track_id);
        self.completed.insert(track_id.to_string());
    }

    pub fn mark_failed(&mut self, track_id: &str) {
        if !self.completed.contains(track_id) {
            self.failed.insert(track_id.to_string());
        }
    }

    /// Time since the last save; zero if the timestamp lies in the future
    pub fn age(&self) -> Duration {
        let secs = Utc::now().timestamp().saturating_sub(self.saved_at);
        Duration::from_secs(secs.max(0) as u64)
    }
}

/// Directory of ledger files, one per playlist
#[derive(Debug, Clone)]
pub struct LedgerStore {
    dir: PathBuf,
    ttl: Duration,
}

impl LedgerStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn path_for(&self, playlist_id: &str) -> PathBuf {
        self.dir
            .join(format!("download_progress_{}.json", playlist_id))
    }

    /// Load a fresh ledger
    ///
    /// Missing, unreadable and malformed files count as no ledger. A stale
    /// ledger is deleted.
    pub fn load(&self, playlist_id: &str) -> Option<ProgressLedger> {
        let path = self.path_for(playlist_id);
        if !path.exists() {
            debug!("No progress ledger at {}", path.display());
            return None;
        }

        let ledger = match read_ledger(&path) {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!("Ignoring progress ledger {}: {:#}", path.display(), e);
                return None;
            }
        };

        if ledger.age() > self.ttl {
            debug!(
                "Progress ledger {} is {}h old, discarding",
                path.display(),
                ledger.age().as_secs() / 3600
            );
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to delete stale ledger {}: {}", path.display(), e);
            }
            return None;
        }

        debug!(
            "Loaded progress ledger: {} completed, {} failed",
            ledger.completed.len(),
            ledger.failed.len()
        );
        Some(ledger)
    }

    /// Stamp and persist `ledger`, replacing any previous file atomically
    pub fn save(&self, playlist_id: &str, ledger: &mut ProgressLedger) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create ledger directory {}", self.dir.display()))?;

        ledger.saved_at = Utc::now().timestamp();
        let content = serde_json::to_string_pretty(ledger).context("Failed to serialize ledger")?;

        let path = self.path_for(playlist_id);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content).context("Failed to write ledger file")?;
        std::fs::rename(&tmp_path, &path).context("Failed to replace ledger file")?;

        debug!("Saved progress ledger to {}", path.display());
        Ok(())
    }

    /// Delete the ledger; a missing file is not an error
    pub fn remove(&self, playlist_id: &str) -> Result<()> {
        let path = self.path_for(playlist_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed progress ledger {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove ledger file"),
        }
    }
}

fn read_ledger(path: &Path) -> Result<ProgressLedger> {
    let content = std::fs::read_to_string(path).context("Failed to read ledger file")?;
    serde_json::from_str(&content).context("Failed to parse ledger file")
}
