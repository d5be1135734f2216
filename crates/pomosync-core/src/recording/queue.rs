//! Persistent queue of recordings that could not be delivered.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PomodoroRecord;
use crate::storage::data_dir;

/// A recording waiting for a retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEntry {
    pub record: PomodoroRecord,
    pub queued_at: DateTime<Utc>,
    pub reason: String,
}

/// Append-only from the completion path. Entries leave one at a time, once
/// a sync pass has delivered or dropped them.
///
/// The file is the source of truth: every mutation re-reads it first, so
/// several processes can share one queue without clobbering each other.
pub struct PendingQueue {
    entries: Vec<PendingEntry>,
    /// Persistent queue file path.
    queue_file: PathBuf,
}

impl PendingQueue {
    /// Queue stored at `~/.config/pomosync/pending_recordings.json`.
    pub fn new() -> Self {
        let data_dir = data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new_with_path(data_dir.join("pending_recordings.json"))
    }

    /// Create new queue with specific path (for testing).
    pub fn new_with_path(path: PathBuf) -> Self {
        Self {
            entries: Vec::new(),
            queue_file: path,
        }
    }

    /// Open the queue at `path`, loading anything already persisted there.
    pub fn open(path: PathBuf) -> Result<Self, std::io::Error> {
        let mut queue = Self::new_with_path(path);
        queue.load()?;
        Ok(queue)
    }

    /// Append an entry and persist immediately.
    pub fn push(&mut self, entry: PendingEntry) -> Result<(), std::io::Error> {
        self.load()?;
        self.entries.push(entry);
        self.persist()
    }

    /// Fresh copy of every entry on disk, oldest first. Nothing is removed.
    pub fn snapshot(&mut self) -> Result<Vec<PendingEntry>, std::io::Error> {
        self.load()?;
        Ok(self.entries.clone())
    }

    /// Remove the entry for `client_id`. Returns whether it was still queued.
    pub fn remove(&mut self, client_id: &str) -> Result<bool, std::io::Error> {
        self.load()?;
        let before = self.entries.len();
        self.entries.retain(|e| e.record.client_id != client_id);
        if self.entries.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Record why the latest retry of `client_id` failed.
    pub fn set_reason(&mut self, client_id: &str, reason: &str) -> Result<(), std::io::Error> {
        self.load()?;
        let Some(entry) = self.entries.iter_mut().find(|e| e.record.client_id == client_id) else {
            return Ok(());
        };
        entry.reason = reason.to_string();
        self.persist()
    }

    pub fn entries(&self) -> &[PendingEntry] {
        &self.entries
    }

    /// Get number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist queue to disk. Written to a sibling file and renamed into
    /// place, so readers never see a partial queue.
    pub fn persist(&self) -> Result<(), std::io::Error> {
        let data = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.queue_file.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.queue_file)?;
        Ok(())
    }

    /// Replace the in-memory entries with what is on disk.
    pub fn load(&mut self) -> Result<(), std::io::Error> {
        if !self.queue_file.exists() {
            self.entries.clear();
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.queue_file)?;
        self.entries = serde_json::from_str(&content)?;
        Ok(())
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}
