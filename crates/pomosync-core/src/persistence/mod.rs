//! Timer persistence across the local device store and the remote store.
//!
//! Storage mechanics live behind [`PersistenceAdapter`]; the elapsed-time
//! reconciliation and the fallback policy live in [`reconcile`] and the
//! [`PersistenceSynchronizer`].

mod local;
mod remote;
mod synchronizer;

pub use local::{LocalNamespace, LocalStore};
pub use remote::RemoteStore;
pub use synchronizer::{
    persist_channel, LoadSource, PersistHandle, PersistRequest, PersistenceSynchronizer,
    WriteReport,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::timer::{ms_to_secs_ceil, SessionPolicy, SessionType, TimerState};

/// One persistence destination.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<TimerRecord>, StoreError>;

    async fn save(&self, record: &TimerRecord) -> Result<(), StoreError>;
}

/// Session lengths (minutes) in effect when a record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimes {
    pub work_time: u32,
    pub short_break_time: u32,
    pub long_break_time: u32,
}

impl SessionTimes {
    pub fn duration_ms_for(&self, session: SessionType) -> u64 {
        let minutes = match session {
            SessionType::Work => self.work_time,
            SessionType::ShortBreak => self.short_break_time,
            SessionType::LongBreak => self.long_break_time,
        };
        u64::from(minutes).saturating_mul(60_000)
    }
}

impl From<&SessionPolicy> for SessionTimes {
    fn from(policy: &SessionPolicy) -> Self {
        Self {
            work_time: policy.work_min,
            short_break_time: policy.short_break_min,
            long_break_time: policy.long_break_min,
        }
    }
}

/// Stored form of [`TimerState`]; also the remote wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRecord {
    pub is_running: bool,
    pub is_paused: bool,
    pub current_session: SessionType,
    /// Seconds remaining as of `last_updated_time`.
    pub time_remaining: u64,
    pub pomodoro_count: u32,
    pub project_id: Option<String>,
    pub task_id: Option<String>,
    /// Epoch milliseconds of the write.
    pub last_updated_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_times: Option<SessionTimes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_start_time: Option<u64>,
    #[serde(default)]
    pub is_standalone: bool,
}

impl TimerRecord {
    /// Snapshot `state` as of its own `last_updated_epoch_ms`, tagged with
    /// the session lengths from `policy`.
    pub fn from_state(state: &TimerState, policy: &SessionPolicy) -> Self {
        let at = state.last_updated_epoch_ms;
        Self {
            is_running: state.is_running,
            is_paused: state.is_paused,
            current_session: state.current_session,
            time_remaining: ms_to_secs_ceil(state.remaining_ms_at(at)),
            pomodoro_count: state.pomodoro_count,
            project_id: state.active_project_id.clone(),
            task_id: state.active_task_id.clone(),
            last_updated_time: at,
            session_times: Some(SessionTimes::from(policy)),
            duration_ms: Some(state.duration_ms),
            session_start_time: state.session_start_epoch_ms,
            is_standalone: state.is_standalone,
        }
    }
}

/// Rebuild a [`TimerState`] from a stored record at `now_ms`.
///
/// A running record loses the time that passed since it was written; paused
/// and idle records come back verbatim. Break sessions never carry task
/// bindings, whatever was stored.
pub fn reconcile(record: &TimerRecord, policy: &SessionPolicy, now_ms: u64) -> TimerState {
    let session = record.current_session;
    let stored_remaining_ms = record.time_remaining.saturating_mul(1000);
    let duration_ms = record
        .duration_ms
        .or_else(|| record.session_times.map(|t| t.duration_ms_for(session)))
        .unwrap_or_else(|| policy.duration_ms_for(session))
        .max(stored_remaining_ms);

    let mut state = TimerState {
        is_running: false,
        is_paused: false,
        start_epoch_ms: None,
        duration_ms,
        time_remaining_sec: record.time_remaining,
        current_session: session,
        pomodoro_count: record.pomodoro_count,
        active_project_id: record.project_id.clone(),
        active_task_id: record.task_id.clone(),
        is_standalone: record.is_standalone,
        session_start_epoch_ms: record.session_start_time,
        last_updated_epoch_ms: record.last_updated_time,
    };

    if record.is_running {
        let elapsed_ms = now_ms.saturating_sub(record.last_updated_time);
        let adjusted_remaining_ms = stored_remaining_ms.saturating_sub(elapsed_ms);
        state.is_running = true;
        state.start_epoch_ms = Some(now_ms.saturating_sub(duration_ms - adjusted_remaining_ms));
        state.time_remaining_sec = ms_to_secs_ceil(adjusted_remaining_ms);
    } else {
        state.is_paused = record.is_paused;
    }

    if session.is_break() {
        state.clear_bindings();
    }
    state.normalize();
    state
}
