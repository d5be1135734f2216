//! Side effects of a finished session.
//!
//! The engine calls [`CompletionHandler::handle`] synchronously when a
//! session ends. Sound and notification go first, then the recording is
//! dispatched to the background worker, then `pomodoroCompleted` is
//! published. Nothing here waits on I/O.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::AuthSession;
use crate::events::{EventBus, PomodoroCompleted};
use crate::recording::{PomodoroRecord, RecordHandle};
use crate::timer::SessionType;

/// Minimum spacing between two recordings.
pub const RECORD_DEBOUNCE_MS: u64 = 5_000;

/// What a finished session looked like, as seen by completion callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub session: SessionType,
    /// Ended by `skip` rather than by running out.
    pub interrupted: bool,
    /// Count after this session was accounted for.
    pub pomodoro_count: u32,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub is_standalone: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl SessionOutcome {
    /// A work session that ran to zero.
    pub fn is_completed_pomodoro(&self) -> bool {
        self.session == SessionType::Work && !self.interrupted
    }
}

pub trait SoundPlayer: Send + Sync {
    fn play(&self, finished: SessionType);
}

pub trait Notifier: Send + Sync {
    /// Whether the platform lets us notify right now.
    fn permitted(&self) -> bool {
        true
    }

    fn notify(&self, title: &str, body: &str);
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn play(&self, _finished: SessionType) {
        let mut err = std::io::stderr();
        let _ = err.write_all(b"\x07");
        let _ = err.flush();
    }
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(%title, %body, "notification");
    }
}

fn notification_text(finished: SessionType) -> (&'static str, &'static str) {
    match finished {
        SessionType::Work => ("Pomodoro complete!", "Time for a break."),
        SessionType::ShortBreak | SessionType::LongBreak => ("Break over", "Ready to focus?"),
    }
}

pub struct CompletionHandler {
    auth: AuthSession,
    sound: Option<Box<dyn SoundPlayer>>,
    notifier: Option<Box<dyn Notifier>>,
    sound_enabled: bool,
    notifications_enabled: bool,
    recorder: Option<RecordHandle>,
    last_record_at_ms: Option<u64>,
}

impl CompletionHandler {
    /// No sound, no notifications, no recording.
    pub fn new(auth: AuthSession) -> Self {
        Self {
            auth,
            sound: None,
            notifier: None,
            sound_enabled: true,
            notifications_enabled: true,
            recorder: None,
            last_record_at_ms: None,
        }
    }

    pub fn with_sound(mut self, player: Box<dyn SoundPlayer>) -> Self {
        self.sound = Some(player);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_recorder(mut self, recorder: RecordHandle) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn set_preferences(&mut self, sound_enabled: bool, notifications_enabled: bool) {
        self.sound_enabled = sound_enabled;
        self.notifications_enabled = notifications_enabled;
    }

    /// Drop the recorder so the worker can drain and stop.
    pub(crate) fn detach_recorder(&mut self) {
        self.recorder = None;
    }

    /// Run the completion side effects for `outcome`.
    pub fn handle(&mut self, outcome: &SessionOutcome, bus: &EventBus, now_ms: u64) {
        if self.sound_enabled {
            if let Some(sound) = &self.sound {
                sound.play(outcome.session);
            }
        }
        if self.notifications_enabled {
            if let Some(notifier) = self.notifier.as_ref().filter(|n| n.permitted()) {
                let (title, body) = notification_text(outcome.session);
                notifier.notify(title, body);
            }
        }

        // Skipped sessions end with the alerts above; only pomodoros that
        // ran to zero are recorded and announced.
        if !outcome.is_completed_pomodoro() {
            return;
        }

        let saved_locally = self.dispatch_record(outcome, now_ms);
        bus.pomodoro_completed.publish(PomodoroCompleted {
            date: outcome.ended_at,
            task_id: outcome.task_id.clone(),
            project_id: outcome.project_id.clone(),
            is_standalone: outcome.is_standalone,
            saved_locally,
        });
    }

    /// Returns the `savedLocally` flag for the completion event.
    fn dispatch_record(&mut self, outcome: &SessionOutcome, now_ms: u64) -> Option<bool> {
        if let Some(last) = self.last_record_at_ms {
            if now_ms.saturating_sub(last) < RECORD_DEBOUNCE_MS {
                debug!("recording suppressed by debounce");
                return None;
            }
        }
        let Some(recorder) = &self.recorder else {
            debug!("no recorder attached; completion not recorded");
            return None;
        };
        self.last_record_at_ms = Some(now_ms);

        recorder.dispatch(PomodoroRecord::completed_work(
            outcome.task_id.clone(),
            outcome.project_id.clone(),
            outcome.started_at,
            outcome.ended_at,
            outcome.is_standalone,
        ));
        // Without credentials the worker parks the record straight away.
        (!self.auth.is_authenticated()).then_some(true)
    }
}
