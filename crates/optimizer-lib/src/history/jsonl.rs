//! JSON-lines history file
//!
//! One serialized `HistoryEntry` per line. Lines are only ever appended;
//! the file is read once on open to warm the in-memory index.

use super::{HistoryEntry, HistoryStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Append-only history persisted to a JSON-lines file
pub struct JsonlHistoryStore {
    path: PathBuf,
    /// Guards both the file handle order and the cached entries
    entries: Mutex<Vec<HistoryEntry>>,
}

impl JsonlHistoryStore {
    /// Open (or create) the history file at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let entries = if path.exists() {
            Self::load_from_disk(&path)?
        } else {
            Vec::new()
        };

        info!(
            path = %path.display(),
            entries = entries.len(),
            "Opened history file"
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Result<Vec<HistoryEntry>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read history file {:?}", path))?;

        let mut entries = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    // A torn final write leaves a partial line; skip it
                    warn!(
                        path = %path.display(),
                        line = lineno + 1,
                        error = %e,
                        "Skipping unreadable history line"
                    );
                }
            }
        }

        if !content.is_empty() && !content.ends_with('\n') {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open history file {:?}", path))?;
            std::io::Write::write_all(&mut file, b"\n")
                .context("Failed to terminate torn history line")?;
        }

        Ok(entries)
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn append(&self, entry: HistoryEntry) -> Result<()> {
        let mut line = serde_json::to_vec(&entry).context("Failed to serialize history entry")?;
        line.push(b'\n');

        let mut entries = self.entries.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open history file {:?}", self.path))?;
        file.write_all(&line)
            .await
            .context("Failed to write history entry")?;
        file.sync_data()
            .await
            .context("Failed to sync history file")?;

        entries.push(entry);
        debug!(path = %self.path.display(), entries = entries.len(), "History entry appended");
        Ok(())
    }

    async fn query_by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|e| {
                let ts = e.timestamp();
                ts >= from && ts <= to
            })
            .cloned()
            .collect())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let entries = self.entries.lock().await;
        let skip = entries.len().saturating_sub(limit);
        Ok(entries[skip..].to_vec())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.lock().await.len())
    }
}
