//! Timer engine implementation.
//!
//! The engine is a wall-clock-based state machine. It owns no thread and no
//! timer: whoever drives it calls [`TimerEngine::tick`] when
//! [`TimerEngine::next_tick_delay`] says so (see [`super::TimerDriver`]).
//! Remaining time is always derived from the start instant, so a late tick
//! never loses time; it only delays the display.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused
//!   ^        |          |
//!   +--------+----------+   (completion, skip, reset, stop)
//! ```
//!
//! Every mutation is written through to persistence and published to the
//! [`SharedTimerState`]. Plain ticks only refresh the snapshot.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, info};

use super::policy::{SessionPolicy, SessionType};
use super::state::{SharedTimerState, TimerState};
use super::tick::TickSchedule;
use super::ms_to_secs_ceil;
use crate::auth::AuthSession;
use crate::clock::{to_datetime, Clock};
use crate::completion::{CompletionHandler, SessionOutcome};
use crate::events::{ActiveTaskChanged, EventBus, TimerUpdated};
use crate::persistence::PersistHandle;

/// Repeated identical task selections inside this window publish only once.
pub const TASK_CHANGE_DEBOUNCE_MS: u64 = 1_000;

pub type CompletionCallback = Box<dyn FnMut(&SessionOutcome) + Send>;

/// Arguments to [`TimerEngine::start`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Overrides the session's policy duration.
    pub duration_sec: Option<u64>,
    /// Defaults to the engine's current session.
    pub session: Option<SessionType>,
    pub project_id: Option<String>,
    pub task_id: Option<String>,
    /// Work without a project; a task is then optional.
    pub standalone: bool,
}

impl StartOptions {
    pub fn task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Self::default()
        }
    }

    pub fn standalone() -> Self {
        Self {
            standalone: true,
            ..Self::default()
        }
    }

    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn session(mut self, session: SessionType) -> Self {
        self.session = Some(session);
        self
    }

    pub fn duration_sec(mut self, secs: u64) -> Self {
        self.duration_sec = Some(secs);
        self
    }
}

/// A task selection coming from a surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSelection {
    pub task_id: String,
    pub project_id: Option<String>,
    pub task_name: Option<String>,
    pub project_name: Option<String>,
}

/// Core timer engine.
pub struct TimerEngine {
    state: TimerState,
    policy: SessionPolicy,
    clock: Arc<dyn Clock>,
    schedule: Option<TickSchedule>,
    persist: Option<PersistHandle>,
    shared: SharedTimerState,
    bus: EventBus,
    completion: CompletionHandler,
    callbacks: Vec<CompletionCallback>,
    wake: Arc<Notify>,
    /// Surface preference: auto-started work sessions run standalone.
    standalone_mode: bool,
    last_task_change: Option<(String, Option<String>, u64)>,
}

impl TimerEngine {
    /// Idle work session, no persistence, no side effects.
    pub fn new(policy: SessionPolicy, clock: Arc<dyn Clock>) -> Self {
        let mut state = TimerState::initial(&policy);
        state.last_updated_epoch_ms = clock.now_ms();
        Self {
            shared: SharedTimerState::new(state.clone()),
            state,
            policy,
            clock,
            schedule: None,
            persist: None,
            bus: EventBus::new(),
            completion: CompletionHandler::new(AuthSession::anonymous()),
            callbacks: Vec::new(),
            wake: Arc::new(Notify::new()),
            standalone_mode: false,
            last_task_change: None,
        }
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_shared(mut self, shared: SharedTimerState) -> Self {
        shared.publish(&self.state);
        self.shared = shared;
        self
    }

    pub fn with_persistence(mut self, handle: PersistHandle) -> Self {
        self.persist = Some(handle);
        self
    }

    pub fn with_completion(mut self, completion: CompletionHandler) -> Self {
        self.completion = completion;
        self
    }

    /// Adopt a reconciled state, e.g. from [`crate::persistence::PersistenceSynchronizer::load`].
    ///
    /// A running state resumes ticking immediately so an already expired
    /// session completes on the first tick, or on the first command if that
    /// comes sooner. Nothing is persisted.
    pub fn restore(&mut self, mut state: TimerState) {
        state.normalize();
        let now = self.clock.now_ms();
        self.schedule = state.is_running.then(|| TickSchedule::immediate(now));
        if state.is_running {
            state.time_remaining_sec = ms_to_secs_ceil(state.remaining_ms_at(now));
        }
        self.state = state;
        self.shared.publish(&self.state);
        self.wake.notify_one();
        debug!(phase = ?self.state.phase(), session = %self.state.current_session, "timer state restored");
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn shared(&self) -> &SharedTimerState {
        &self.shared
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Seconds left right now, computed from the clock.
    pub fn remaining_secs(&self) -> u64 {
        ms_to_secs_ceil(self.state.remaining_ms_at(self.clock.now_ms()))
    }

    /// Time until the next tick is due; `None` when nothing is scheduled.
    pub fn next_tick_delay(&self) -> Option<std::time::Duration> {
        self.schedule
            .map(|s| std::time::Duration::from_millis(s.delay_from(self.clock.now_ms())))
    }

    /// Signalled whenever the tick schedule changes.
    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Complete a running session whose time is already up. Every command
    /// calls this first, so a session that ran out while nothing was
    /// ticking still counts exactly once.
    pub fn catch_up(&mut self) -> Option<SessionOutcome> {
        if !self.state.is_running || self.state.remaining_ms_at(self.clock.now_ms()) > 0 {
            return None;
        }
        debug!(session = %self.state.current_session, "session ran out before the next command");
        Some(self.complete(false))
    }

    /// Start a session. Returns `false` without changing anything when a
    /// non-standalone work session has no task to bind.
    pub fn start(&mut self, opts: StartOptions) -> bool {
        self.catch_up();
        let session = opts.session.unwrap_or(self.state.current_session);
        let task_id = opts.task_id.or_else(|| {
            (session == SessionType::Work)
                .then(|| self.state.active_task_id.clone())
                .flatten()
        });
        if session == SessionType::Work && !opts.standalone && task_id.is_none() {
            debug!("start refused: work session needs a task or standalone mode");
            return false;
        }

        let now = self.clock.now_ms();
        let duration_sec = opts
            .duration_sec
            .unwrap_or_else(|| self.policy.duration_for(session));
        let before = (self.state.active_task_id.clone(), self.state.active_project_id.clone());

        self.state.current_session = session;
        if session == SessionType::Work {
            self.state.active_project_id = match (opts.project_id, opts.standalone) {
                (Some(project), _) => Some(project),
                (None, true) => None,
                (None, false) => self.state.active_project_id.take(),
            };
            self.state.active_task_id = task_id;
            self.state.is_standalone = opts.standalone;
        } else {
            self.state.clear_bindings();
        }
        self.state.duration_ms = duration_sec.saturating_mul(1000);
        self.state.time_remaining_sec = duration_sec;
        self.state.start_epoch_ms = Some(now);
        self.state.session_start_epoch_ms = Some(now);
        self.state.is_running = true;
        self.state.is_paused = false;
        self.schedule = Some(TickSchedule::starting_at(now));

        info!(
            session = %session,
            duration_sec,
            task_id = self.state.active_task_id.as_deref(),
            "session started"
        );
        self.bus.timer_updated.publish(TimerUpdated {
            session,
            duration: duration_sec,
        });
        if before != (self.state.active_task_id.clone(), self.state.active_project_id.clone()) {
            self.publish_task_change(None, None);
        }
        self.commit();
        true
    }

    /// Freeze the remaining time. No-op unless running.
    pub fn pause(&mut self) -> bool {
        self.catch_up();
        if !self.state.is_running {
            return false;
        }
        let now = self.clock.now_ms();
        self.state.time_remaining_sec = ms_to_secs_ceil(self.state.remaining_ms_at(now));
        self.state.is_running = false;
        self.state.is_paused = true;
        self.state.start_epoch_ms = None;
        self.schedule = None;
        debug!(remaining_sec = self.state.time_remaining_sec, "timer paused");
        self.commit();
        true
    }

    /// Continue from the frozen remaining time. No-op unless paused.
    pub fn resume(&mut self) -> bool {
        if !self.state.is_paused {
            return false;
        }
        let now = self.clock.now_ms();
        let elapsed_ms = self
            .state
            .duration_ms
            .saturating_sub(self.state.time_remaining_sec.saturating_mul(1000));
        self.state.start_epoch_ms = Some(now.saturating_sub(elapsed_ms));
        self.state.is_running = true;
        self.state.is_paused = false;
        self.schedule = Some(TickSchedule::starting_at(now));
        debug!(remaining_sec = self.state.time_remaining_sec, "timer resumed");
        self.commit();
        true
    }

    /// Back to idle with the full duration of the current session. The
    /// session, the count and the bindings are kept.
    pub fn reset(&mut self) {
        self.catch_up();
        self.schedule = None;
        self.state.is_running = false;
        self.state.is_paused = false;
        self.state.start_epoch_ms = None;
        self.state.session_start_epoch_ms = None;
        self.state.duration_ms = self.policy.duration_ms_for(self.state.current_session);
        self.state.time_remaining_sec = self.state.duration_ms / 1000;
        debug!(session = %self.state.current_session, "timer reset");
        self.commit();
    }

    /// End the current session now. Works from any phase; the session does
    /// not count and is not recorded. A session that already ran out
    /// completes normally instead.
    pub fn skip(&mut self) -> SessionOutcome {
        if let Some(outcome) = self.catch_up() {
            return outcome;
        }
        info!(session = %self.state.current_session, "session skipped");
        self.complete(true)
    }

    /// Advance the clock-derived display. Completes the session once the
    /// remaining time reaches zero.
    pub fn tick(&mut self) -> Option<SessionOutcome> {
        if !self.state.is_running {
            self.schedule = None;
            return None;
        }
        let now = self.clock.now_ms();
        if let Some(schedule) = self.schedule.as_mut() {
            schedule.advance(now);
        }
        let remaining_ms = self.state.remaining_ms_at(now);
        self.state.time_remaining_sec = ms_to_secs_ceil(remaining_ms);
        if remaining_ms == 0 {
            return Some(self.complete(false));
        }
        self.state.last_updated_epoch_ms = now;
        self.shared.publish(&self.state);
        None
    }

    /// Bind a task. Ignored during breaks.
    pub fn set_active_task(&mut self, selection: TaskSelection) -> bool {
        self.catch_up();
        if self.state.current_session.is_break() {
            debug!("task selection ignored during a break");
            return false;
        }
        let now = self.clock.now_ms();
        let duplicate = matches!(
            &self.last_task_change,
            Some((task, project, at))
                if *task == selection.task_id
                    && *project == selection.project_id
                    && now.saturating_sub(*at) < TASK_CHANGE_DEBOUNCE_MS
        );
        self.last_task_change = Some((selection.task_id.clone(), selection.project_id.clone(), now));

        self.state.is_standalone = selection.project_id.is_none();
        self.state.active_project_id = selection.project_id;
        self.state.active_task_id = Some(selection.task_id);
        if !duplicate {
            self.publish_task_change(selection.task_name, selection.project_name);
        }
        self.commit();
        true
    }

    pub fn clear_active_task(&mut self) {
        if self.state.active_task_id.is_none() && self.state.active_project_id.is_none() {
            return;
        }
        self.state.clear_bindings();
        self.last_task_change = None;
        self.publish_task_change(None, None);
        self.commit();
    }

    /// Abandon whatever is running and return to an idle, unbound work
    /// session. The pomodoro count is kept.
    pub fn stop_to_idle(&mut self) {
        self.catch_up();
        let had_binding = self.state.active_task_id.is_some() || self.state.active_project_id.is_some();
        self.schedule = None;
        self.state.is_running = false;
        self.state.is_paused = false;
        self.state.start_epoch_ms = None;
        self.state.session_start_epoch_ms = None;
        self.state.current_session = SessionType::Work;
        self.state.duration_ms = self.policy.duration_ms_for(SessionType::Work);
        self.state.time_remaining_sec = self.state.duration_ms / 1000;
        self.state.clear_bindings();
        info!("timer stopped");
        if had_binding {
            self.publish_task_change(None, None);
        }
        self.commit();
    }

    pub fn reset_count(&mut self) {
        self.state.pomodoro_count = 0;
        self.commit();
    }

    /// Swap in new durations and cycle settings. An idle timer is resized
    /// right away; a running or paused one keeps its current length.
    pub fn apply_config(&mut self, policy: SessionPolicy) {
        self.policy = policy;
        if !self.state.is_active() {
            self.state.duration_ms = policy.duration_ms_for(self.state.current_session);
            self.state.time_remaining_sec = self.state.duration_ms / 1000;
        }
        self.commit();
    }

    pub fn set_preferences(&mut self, sound_enabled: bool, notifications_enabled: bool) {
        self.completion.set_preferences(sound_enabled, notifications_enabled);
    }

    /// Auto-started work sessions run standalone when set.
    pub fn set_standalone_mode(&mut self, standalone: bool) {
        self.standalone_mode = standalone;
    }

    /// Called with every [`SessionOutcome`], after the completion side
    /// effects. Callbacks run under the engine's lock and must not call
    /// back into it.
    pub fn on_complete(&mut self, callback: impl FnMut(&SessionOutcome) + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Drop the persistence and recording senders so their workers drain
    /// and stop.
    pub fn detach_io(&mut self) {
        self.persist = None;
        self.completion.detach_recorder();
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn complete(&mut self, interrupted: bool) -> SessionOutcome {
        let now = self.clock.now_ms();
        let finished = self.state.current_session;

        self.schedule = None;
        self.state.is_running = false;
        self.state.is_paused = false;
        self.state.start_epoch_ms = None;
        self.state.time_remaining_sec = 0;
        if finished == SessionType::Work && !interrupted {
            self.state.pomodoro_count = self.state.pomodoro_count.saturating_add(1);
        }

        let started_ms = self
            .state
            .session_start_epoch_ms
            .unwrap_or_else(|| now.saturating_sub(self.state.duration_ms));
        let outcome = SessionOutcome {
            session: finished,
            interrupted,
            pomodoro_count: self.state.pomodoro_count,
            task_id: self.state.active_task_id.clone(),
            project_id: self.state.active_project_id.clone(),
            is_standalone: self.state.is_standalone,
            started_at: to_datetime(started_ms),
            ended_at: to_datetime(now),
        };
        info!(
            session = %finished,
            interrupted,
            pomodoro_count = outcome.pomodoro_count,
            "session finished"
        );

        self.completion.handle(&outcome, &self.bus, now);
        for callback in &mut self.callbacks {
            callback(&outcome);
        }

        let next = self.policy.next_session(finished, self.state.pomodoro_count);
        let had_binding = self.state.active_task_id.is_some() || self.state.active_project_id.is_some();
        self.state.current_session = next;
        self.state.duration_ms = self.policy.duration_ms_for(next);
        self.state.time_remaining_sec = self.state.duration_ms / 1000;
        self.state.session_start_epoch_ms = None;
        if next.is_break() {
            self.state.clear_bindings();
            if had_binding {
                self.publish_task_change(None, None);
            }
        }
        self.bus.timer_updated.publish(TimerUpdated {
            session: next,
            duration: self.state.time_remaining_sec,
        });
        self.commit();

        if self.policy.auto_start_next_session {
            let opts = if next.is_break() || self.state.active_task_id.is_some() {
                Some(StartOptions::default().session(next))
            } else if self.standalone_mode {
                Some(StartOptions::standalone().session(next))
            } else {
                None
            };
            match opts {
                Some(opts) => {
                    self.start(opts);
                }
                None => debug!("auto-start skipped: no task bound"),
            }
        }
        outcome
    }

    fn publish_task_change(&self, task_name: Option<String>, project_name: Option<String>) {
        self.bus.active_task_changed.publish(ActiveTaskChanged {
            task_id: self.state.active_task_id.clone(),
            project_id: self.state.active_project_id.clone(),
            task_name,
            project_name,
        });
    }

    fn commit(&mut self) {
        self.state.last_updated_epoch_ms = self.clock.now_ms();
        if let Some(persist) = &self.persist {
            persist.persist(&self.state, &self.policy);
        }
        self.shared.publish(&self.state);
        self.wake.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::persist_channel;
    use crate::timer::TimerPhase;
    use std::sync::Mutex;

    fn engine_at(start_ms: u64) -> (TimerEngine, ManualClock) {
        let clock = ManualClock::new(start_ms);
        (TimerEngine::new(SessionPolicy::default(), Arc::new(clock.clone())), clock)
    }

    /// Tick once per simulated second until the session ends.
    fn run_out(engine: &mut TimerEngine, clock: &ManualClock) -> SessionOutcome {
        for _ in 0..100_000 {
            clock.advance(1_000);
            if let Some(outcome) = engine.tick() {
                return outcome;
            }
        }
        panic!("session never completed");
    }

    #[test]
    fn work_start_requires_task_or_standalone() {
        let (mut engine, _clock) = engine_at(0);
        assert!(!engine.start(StartOptions::default()));
        assert_eq!(engine.state().phase(), TimerPhase::Idle);

        assert!(engine.start(StartOptions::task("t1").project("p1")));
        assert_eq!(engine.state().phase(), TimerPhase::Running);
        assert_eq!(engine.state().active_task_id.as_deref(), Some("t1"));
    }

    #[test]
    fn standalone_start_has_no_project() {
        let (mut engine, _clock) = engine_at(0);
        assert!(engine.start(StartOptions::standalone()));
        assert!(engine.state().is_standalone);
        assert!(engine.state().active_project_id.is_none());
    }

    #[test]
    fn break_start_needs_no_task() {
        let (mut engine, _clock) = engine_at(0);
        assert!(engine.start(StartOptions::default().session(SessionType::ShortBreak)));
        assert_eq!(engine.state().time_remaining_sec, 5 * 60);
    }

    #[test]
    fn remaining_follows_the_clock() {
        let (mut engine, clock) = engine_at(1_000);
        engine.start(StartOptions::standalone());
        clock.advance(61_500);
        engine.tick();
        assert_eq!(engine.state().time_remaining_sec, 25 * 60 - 61);
    }

    #[test]
    fn pause_resume_preserves_remaining() {
        let (mut engine, clock) = engine_at(0);
        engine.start(StartOptions::standalone());
        clock.advance(10_000);
        assert!(engine.pause());
        let frozen = engine.state().time_remaining_sec;
        assert_eq!(frozen, 25 * 60 - 10);

        clock.advance(3_600_000);
        assert_eq!(engine.remaining_secs(), frozen);
        assert!(engine.resume());
        assert_eq!(engine.remaining_secs(), frozen);

        clock.advance(1_000);
        engine.tick();
        assert_eq!(engine.state().time_remaining_sec, frozen - 1);
    }

    #[test]
    fn pause_and_resume_are_noops_in_wrong_phase() {
        let (mut engine, _clock) = engine_at(0);
        assert!(!engine.pause());
        assert!(!engine.resume());
        engine.start(StartOptions::standalone());
        assert!(!engine.resume());
    }

    #[test]
    fn four_completions_end_in_long_break() {
        let (mut engine, clock) = engine_at(0);
        let mut seen = Vec::new();
        for _ in 0..4 {
            assert!(engine.start(StartOptions::standalone().session(SessionType::Work)));
            run_out(&mut engine, &clock);
            seen.push(engine.state().current_session);
            engine.start(StartOptions::default());
            run_out(&mut engine, &clock);
        }
        assert_eq!(
            seen,
            vec![
                SessionType::ShortBreak,
                SessionType::ShortBreak,
                SessionType::ShortBreak,
                SessionType::LongBreak
            ]
        );
        assert_eq!(engine.state().pomodoro_count, 4);
    }

    #[test]
    fn completion_clears_bindings_for_break() {
        let (mut engine, clock) = engine_at(0);
        let mut rx = engine.bus().active_task_changed.subscribe();
        engine.start(StartOptions::task("t1").project("p1"));
        let _ = rx.try_recv();
        let outcome = run_out(&mut engine, &clock);

        assert!(outcome.is_completed_pomodoro());
        assert_eq!(outcome.task_id.as_deref(), Some("t1"));
        assert_eq!(engine.state().current_session, SessionType::ShortBreak);
        assert!(engine.state().active_task_id.is_none());
        assert_eq!(rx.try_recv().unwrap().task_id, None);
    }

    #[test]
    fn skip_never_counts() {
        let (mut engine, _clock) = engine_at(0);
        let mut completed = engine.bus().pomodoro_completed.subscribe();
        engine.start(StartOptions::task("t1"));
        let outcome = engine.skip();
        assert!(outcome.interrupted);
        assert_eq!(engine.state().pomodoro_count, 0);
        assert_eq!(engine.state().current_session, SessionType::ShortBreak);
        assert!(completed.try_recv().is_err());
    }

    #[test]
    fn reset_restores_full_duration() {
        let (mut engine, clock) = engine_at(0);
        engine.start(StartOptions::task("t1"));
        clock.advance(90_000);
        engine.tick();
        engine.reset();
        assert_eq!(engine.state().phase(), TimerPhase::Idle);
        assert_eq!(engine.state().time_remaining_sec, 25 * 60);
        assert_eq!(engine.state().active_task_id.as_deref(), Some("t1"));
        assert!(engine.next_tick_delay().is_none());
    }

    #[test]
    fn auto_start_runs_break_then_stops_at_unbound_work() {
        let clock = ManualClock::new(0);
        let policy = SessionPolicy {
            auto_start_next_session: true,
            ..SessionPolicy::default()
        };
        let mut engine = TimerEngine::new(policy, Arc::new(clock.clone()));
        engine.start(StartOptions::task("t1"));
        run_out(&mut engine, &clock);
        assert_eq!(engine.state().phase(), TimerPhase::Running);
        assert_eq!(engine.state().current_session, SessionType::ShortBreak);

        run_out(&mut engine, &clock);
        // The break dropped the task, so the work session waits for one.
        assert_eq!(engine.state().current_session, SessionType::Work);
        assert_eq!(engine.state().phase(), TimerPhase::Idle);

        engine.set_standalone_mode(true);
        engine.start(StartOptions::default().session(SessionType::ShortBreak));
        run_out(&mut engine, &clock);
        assert_eq!(engine.state().phase(), TimerPhase::Running);
        assert!(engine.state().is_standalone);
    }

    #[test]
    fn callbacks_see_each_outcome() {
        let (mut engine, clock) = engine_at(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine.on_complete(move |o| sink.lock().unwrap().push((o.session, o.interrupted)));

        engine.start(StartOptions::standalone());
        run_out(&mut engine, &clock);
        engine.skip();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(SessionType::Work, false), (SessionType::ShortBreak, true)]
        );
    }

    #[test]
    fn task_selection_is_debounced_and_ignored_in_breaks() {
        let (mut engine, clock) = engine_at(0);
        let mut rx = engine.bus().active_task_changed.subscribe();
        let pick = TaskSelection {
            task_id: "t1".into(),
            project_id: Some("p1".into()),
            task_name: Some("Write report".into()),
            project_name: None,
        };
        assert!(engine.set_active_task(pick.clone()));
        assert!(engine.set_active_task(pick.clone()));
        assert_eq!(rx.try_recv().unwrap().task_name.as_deref(), Some("Write report"));
        assert!(rx.try_recv().is_err());

        clock.advance(TASK_CHANGE_DEBOUNCE_MS);
        engine.set_active_task(pick.clone());
        assert!(rx.try_recv().is_ok());

        engine.start(StartOptions::default().session(SessionType::LongBreak));
        assert!(!engine.set_active_task(pick));
    }

    #[test]
    fn stop_to_idle_keeps_count() {
        let (mut engine, clock) = engine_at(0);
        engine.start(StartOptions::task("t1").project("p1"));
        run_out(&mut engine, &clock);
        engine.start(StartOptions::task("t2").project("p2"));
        engine.stop_to_idle();
        let s = engine.state();
        assert_eq!(s.phase(), TimerPhase::Idle);
        assert_eq!(s.current_session, SessionType::Work);
        assert_eq!(s.pomodoro_count, 1);
        assert!(s.active_project_id.is_none() && s.active_task_id.is_none());
    }

    #[test]
    fn apply_config_resizes_idle_timer_only() {
        let (mut engine, _clock) = engine_at(0);
        let longer = SessionPolicy {
            work_min: 50,
            ..SessionPolicy::default()
        };
        engine.apply_config(longer);
        assert_eq!(engine.state().time_remaining_sec, 50 * 60);

        engine.start(StartOptions::standalone());
        engine.apply_config(SessionPolicy::default());
        assert_eq!(engine.state().duration_ms, 50 * 60 * 1000);
    }

    #[test]
    fn mutations_are_persisted_and_published() {
        let (handle, mut rx) = persist_channel();
        let clock = ManualClock::new(0);
        let mut engine =
            TimerEngine::new(SessionPolicy::default(), Arc::new(clock.clone())).with_persistence(handle);
        let snapshot = engine.shared().subscribe();

        engine.start(StartOptions::standalone());
        clock.advance(5_000);
        engine.tick();
        engine.pause();

        let first = rx.try_recv().unwrap();
        assert!(first.state.is_running);
        let second = rx.try_recv().unwrap();
        assert!(second.state.is_paused);
        assert_eq!(second.state.last_updated_epoch_ms, 5_000);
        // The plain tick in between was not written.
        assert!(rx.try_recv().is_err());
        assert!(snapshot.borrow().is_paused);
    }

    #[test]
    fn restore_of_expired_session_completes_on_first_tick() {
        let (mut engine, _clock) = engine_at(10_000_000);
        let mut state = TimerState::initial(&SessionPolicy::default());
        state.is_running = true;
        state.start_epoch_ms = Some(0);
        state.is_standalone = true;
        engine.restore(state);
        assert_eq!(engine.next_tick_delay(), Some(std::time::Duration::ZERO));
        let outcome = engine.tick().unwrap();
        assert!(outcome.is_completed_pomodoro());
        assert_eq!(engine.state().pomodoro_count, 1);
    }

    fn expired_standalone_work() -> TimerState {
        let mut state = TimerState::initial(&SessionPolicy::default());
        state.is_running = true;
        state.start_epoch_ms = Some(0);
        state.is_standalone = true;
        state
    }

    #[test]
    fn skip_after_expiry_completes_normally() {
        let (mut engine, _clock) = engine_at(10_000_000);
        let mut completed = engine.bus().pomodoro_completed.subscribe();
        engine.restore(expired_standalone_work());

        let outcome = engine.skip();
        assert!(!outcome.interrupted);
        assert_eq!(outcome.session, SessionType::Work);
        assert_eq!(engine.state().pomodoro_count, 1);
        assert_eq!(engine.state().current_session, SessionType::ShortBreak);
        assert!(completed.try_recv().is_ok());
    }

    #[test]
    fn pause_after_expiry_completes_instead_of_freezing() {
        let (mut engine, _clock) = engine_at(10_000_000);
        engine.restore(expired_standalone_work());

        assert!(!engine.pause());
        assert_eq!(engine.state().phase(), TimerPhase::Idle);
        assert_eq!(engine.state().pomodoro_count, 1);
        assert!(engine.tick().is_none());
        assert_eq!(engine.state().pomodoro_count, 1);
    }

    #[test]
    fn start_after_expiry_counts_the_finished_session() {
        let (mut engine, _clock) = engine_at(10_000_000);
        engine.restore(expired_standalone_work());

        assert!(engine.start(StartOptions::task("t2").session(SessionType::Work)));
        assert_eq!(engine.state().pomodoro_count, 1);
        assert_eq!(engine.state().active_task_id.as_deref(), Some("t2"));
        assert!(engine.catch_up().is_none());
    }

    #[test]
    fn tick_schedule_survives_late_ticks() {
        let (mut engine, clock) = engine_at(0);
        engine.start(StartOptions::standalone());
        clock.advance(1_250);
        engine.tick();
        assert_eq!(engine.next_tick_delay(), Some(std::time::Duration::from_millis(750)));
    }
}
