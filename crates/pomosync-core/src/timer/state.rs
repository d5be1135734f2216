//! Timer state and the process-wide snapshot.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::policy::{SessionPolicy, SessionType};

/// Coarse lifecycle phase derived from the two flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
}

/// Authoritative timer state, owned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub is_running: bool,
    pub is_paused: bool,
    /// Wall-clock instant the current run began. `None` unless running.
    pub start_epoch_ms: Option<u64>,
    pub duration_ms: u64,
    pub time_remaining_sec: u64,
    pub current_session: SessionType,
    pub pomodoro_count: u32,
    pub active_project_id: Option<String>,
    pub active_task_id: Option<String>,
    #[serde(default)]
    pub is_standalone: bool,
    /// When the session (not the latest resume) began.
    pub session_start_epoch_ms: Option<u64>,
    pub last_updated_epoch_ms: u64,
}

impl TimerState {
    /// Idle work session sized by `policy`.
    pub fn initial(policy: &SessionPolicy) -> Self {
        let duration_ms = policy.duration_ms_for(SessionType::Work);
        Self {
            is_running: false,
            is_paused: false,
            start_epoch_ms: None,
            duration_ms,
            time_remaining_sec: duration_ms / 1000,
            current_session: SessionType::Work,
            pomodoro_count: 0,
            active_project_id: None,
            active_task_id: None,
            is_standalone: false,
            session_start_epoch_ms: None,
            last_updated_epoch_ms: 0,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        match (self.is_running, self.is_paused) {
            (true, _) => TimerPhase::Running,
            (false, true) => TimerPhase::Paused,
            (false, false) => TimerPhase::Idle,
        }
    }

    /// Running or paused.
    pub fn is_active(&self) -> bool {
        self.is_running || self.is_paused
    }

    /// Remaining milliseconds at `now`. Running timers are computed from the
    /// start instant, otherwise the cached value is returned.
    pub fn remaining_ms_at(&self, now_ms: u64) -> u64 {
        match (self.is_running, self.start_epoch_ms) {
            (true, Some(start)) => self.duration_ms.saturating_sub(now_ms.saturating_sub(start)),
            _ => self.time_remaining_sec.saturating_mul(1000),
        }
    }

    /// Drop project/task bindings; breaks never carry task context.
    pub fn clear_bindings(&mut self) {
        self.active_project_id = None;
        self.active_task_id = None;
        self.is_standalone = false;
    }

    /// Enforce cross-field invariants after an external load.
    pub fn normalize(&mut self) {
        if self.is_running && self.is_paused {
            self.is_paused = false;
        }
        if !self.is_running {
            self.start_epoch_ms = None;
        }
        if self.current_session.is_break() {
            self.clear_bindings();
        }
        let cap = self.duration_ms / 1000;
        if self.time_remaining_sec > cap {
            self.time_remaining_sec = cap;
        }
    }
}

/// Process-wide, read-only view of the engine's state.
///
/// Cloning shares the same snapshot. Only the engine publishes into it;
/// everyone else subscribes or reads.
#[derive(Debug, Clone)]
pub struct SharedTimerState {
    tx: watch::Sender<TimerState>,
}

impl SharedTimerState {
    pub fn new(initial: TimerState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> TimerState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, state: &TimerState) {
        self.tx.send_replace(state.clone());
    }
}

impl Default for SharedTimerState {
    fn default() -> Self {
        Self::new(TimerState::initial(&SessionPolicy::default()))
    }
}
