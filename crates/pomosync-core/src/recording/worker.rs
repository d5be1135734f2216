use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{PendingEntry, PendingQueue, PomodoroRecord, RecordingClient};
use crate::auth::AuthSession;
use crate::error::RecordError;
use crate::events::{EventBus, RecordingQueued};
use crate::storage::Database;
use crate::timer::SessionType;

/// Sending half used by the completion handler. Never blocks.
#[derive(Debug, Clone)]
pub struct RecordHandle {
    tx: mpsc::UnboundedSender<PomodoroRecord>,
}

impl RecordHandle {
    pub fn dispatch(&self, record: PomodoroRecord) {
        if self.tx.send(record).is_err() {
            warn!("recording worker is gone; completed session not dispatched");
        }
    }
}

pub fn record_channel() -> (RecordHandle, mpsc::UnboundedReceiver<PomodoroRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RecordHandle { tx }, rx)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    Queued { reason: String },
    /// The backend refused the record outright; retrying would not help.
    Dropped { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub delivered: usize,
    pub requeued: usize,
    pub dropped: usize,
}

pub struct RecordingWorker {
    client: Arc<dyn RecordingClient>,
    queue: Arc<Mutex<PendingQueue>>,
    auth: AuthSession,
    bus: EventBus,
    history: Option<Arc<Mutex<Database>>>,
}

impl RecordingWorker {
    pub fn new(
        client: Arc<dyn RecordingClient>,
        queue: Arc<Mutex<PendingQueue>>,
        auth: AuthSession,
        bus: EventBus,
    ) -> Self {
        Self {
            client,
            queue,
            auth,
            bus,
            history: None,
        }
    }

    /// Also keep a local history row for every dispatched record.
    pub fn with_history(mut self, db: Arc<Mutex<Database>>) -> Self {
        self.history = Some(db);
        self
    }

    /// Drain dispatches in order until every [`RecordHandle`] is dropped.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<PomodoroRecord>) {
        while let Some(record) = rx.recv().await {
            self.process(record).await;
        }
        debug!("recording worker stopped");
    }

    /// One recording attempt for a freshly completed session.
    pub async fn process(&self, record: PomodoroRecord) -> RecordOutcome {
        self.write_history(&record);

        if !self.auth.is_authenticated() {
            return self.park(record, "not authenticated".into());
        }

        match self.client.create_pomodoro_record(&record).await {
            Ok(()) => {
                info!(client_id = %record.client_id, "pomodoro recorded");
                RecordOutcome::Recorded
            }
            Err(RecordError::Unauthorized) => {
                self.auth.clear();
                self.park(record, RecordError::Unauthorized.to_string())
            }
            Err(e) if e.is_retryable() => self.park(record, e.to_string()),
            Err(e) => {
                warn!(client_id = %record.client_id, error = %e, "pomodoro record rejected");
                RecordOutcome::Dropped { reason: e.to_string() }
            }
        }
    }

    /// Retry everything in the pending queue. An entry leaves the queue only
    /// once it is delivered or rejected outright; entries that still fail
    /// keep their original timestamp and take the latest reason. Cancelling
    /// the pass midway loses nothing.
    pub async fn sync_pending(&self) -> Result<SyncReport, std::io::Error> {
        let entries = self.lock_queue().snapshot()?;
        let mut report = SyncReport::default();

        for entry in entries {
            let client_id = entry.record.client_id.as_str();
            if !self.auth.is_authenticated() {
                report.requeued += 1;
                continue;
            }
            match self.client.create_pomodoro_record(&entry.record).await {
                Ok(()) => {
                    self.lock_queue().remove(client_id)?;
                    report.delivered += 1;
                }
                Err(e) => {
                    if e == RecordError::Unauthorized {
                        self.auth.clear();
                    }
                    if e.is_retryable() {
                        self.lock_queue().set_reason(client_id, &e.to_string())?;
                        report.requeued += 1;
                    } else {
                        warn!(%client_id, error = %e, "dropping pending record");
                        self.lock_queue().remove(client_id)?;
                        report.dropped += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    fn park(&self, record: PomodoroRecord, reason: String) -> RecordOutcome {
        warn!(client_id = %record.client_id, %reason, "recording queued for retry");
        let entry = PendingEntry {
            record,
            queued_at: Utc::now(),
            reason: reason.clone(),
        };
        if let Err(e) = self.lock_queue().push(entry.clone()) {
            warn!(error = %e, "failed to persist pending recording");
        }
        self.bus.recording_queued.publish(RecordingQueued { entry });
        RecordOutcome::Queued { reason }
    }

    fn write_history(&self, record: &PomodoroRecord) {
        let Some(db) = &self.history else {
            return;
        };
        let db = match db.lock() {
            Ok(db) => db,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = db.record_session(
            SessionType::Work,
            record.task_id.as_deref(),
            record.project_id.as_deref(),
            record.duration_minutes,
            record.start_time,
            record.end_time,
            record.interrupted,
        ) {
            warn!(error = %e, "failed to write local session history");
        }
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, PendingQueue> {
        match self.queue.lock() {
            Ok(q) => q,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
