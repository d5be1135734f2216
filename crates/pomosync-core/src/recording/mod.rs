//! Recording of completed work sessions.
//!
//! The completion path never waits on the network: it dispatches a
//! [`PomodoroRecord`] into a channel, and a [`RecordingWorker`] drains it in
//! order. Failed attempts land in the [`PendingQueue`] for a later sync pass.

mod client;
mod queue;
mod worker;

pub use client::{HttpRecordingClient, RecordingClient};
pub(crate) use client::join_endpoint;
pub use queue::{PendingEntry, PendingQueue};
pub use worker::{record_channel, RecordHandle, RecordOutcome, RecordingWorker, SyncReport};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of the recording collaborator contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroRecord {
    /// Client-generated id so the backend can deduplicate retries.
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: u64,
    pub completed: bool,
    pub interrupted: bool,
    pub is_standalone: bool,
}

impl PomodoroRecord {
    pub fn completed_work(
        task_id: Option<String>,
        project_id: Option<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        is_standalone: bool,
    ) -> Self {
        let elapsed = (end_time - start_time).num_seconds().max(0) as u64;
        Self {
            client_id: uuid::Uuid::new_v4().to_string(),
            task_id,
            project_id,
            start_time,
            end_time,
            // Round to the nearest minute; a finished session is at least one.
            duration_minutes: ((elapsed + 30) / 60).max(1),
            completed: true,
            interrupted: false,
            is_standalone,
        }
    }
}
