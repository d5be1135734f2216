use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::recording::PendingEntry;
use crate::timer::SessionType;

const TOPIC_CAPACITY: usize = 64;

/// A new session was started or the engine moved to the next session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerUpdated {
    pub session: SessionType,
    /// Seconds.
    pub duration: u64,
}

/// A work session completed normally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroCompleted {
    pub date: DateTime<Utc>,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub is_standalone: bool,
    /// `Some(true)` when the recording went straight to the pending queue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_locally: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTaskChanged {
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub task_name: Option<String>,
    pub project_name: Option<String>,
}

/// A recording attempt failed and was parked in the pending queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingQueued {
    pub entry: PendingEntry,
}

/// One typed publish/subscribe channel.
#[derive(Debug, Clone)]
pub struct Topic<T: Clone> {
    name: &'static str,
    tx: broadcast::Sender<T>,
}

impl<T: Clone> Topic<T> {
    fn new(name: &'static str) -> Self {
        let (tx, _) = broadcast::channel(TOPIC_CAPACITY);
        Self { name, tx }
    }

    pub fn publish(&self, payload: T) {
        // No subscribers is a normal condition for a headless surface.
        if self.tx.send(payload).is_err() {
            tracing::trace!(topic = self.name, "no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// In-process event bus shared by the engine and its collaborators.
/// Cloning shares the underlying channels.
#[derive(Debug, Clone)]
pub struct EventBus {
    pub timer_updated: Topic<TimerUpdated>,
    pub pomodoro_completed: Topic<PomodoroCompleted>,
    pub active_task_changed: Topic<ActiveTaskChanged>,
    pub recording_queued: Topic<RecordingQueued>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            timer_updated: Topic::new("timerUpdated"),
            pomodoro_completed: Topic::new("pomodoroCompleted"),
            active_task_changed: Topic::new("activeTaskChanged"),
            recording_queued: Topic::new("recordingQueued"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
