//! Detection of a timer running for something other than what a surface shows.
//!
//! A surface (a project page, the standalone timer view, a CLI invocation)
//! declares which project it is bound to. The detector compares that binding
//! with the shared snapshot and reports a [`Conflict`] while a work session
//! for different work is running or paused.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::timer::{SessionType, SharedTimerState, TimerEngine, TimerState};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictKind {
    /// The surface shows one project, the timer runs for another.
    DifferentProject,
    /// The surface is unbound, the timer is bound to a project.
    UnboundSurface,
    /// The surface shows a project, the timer runs standalone.
    StandaloneTimer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub kind: ConflictKind,
    pub active_project_id: Option<String>,
    pub active_task_id: Option<String>,
    pub paused: bool,
    pub time_remaining_sec: u64,
}

/// Where to go to see the conflicting timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewTarget {
    /// `None` for the standalone timer view.
    pub project_id: Option<String>,
    pub task_id: Option<String>,
}

/// Compare a snapshot against a surface bound to `surface_project`.
pub fn detect(snapshot: &TimerState, surface_project: Option<&str>) -> Option<Conflict> {
    if snapshot.current_session != SessionType::Work || !snapshot.is_active() {
        return None;
    }
    let active = snapshot.active_project_id.as_deref();
    let kind = match (surface_project, active) {
        (Some(surface), Some(timer)) if surface != timer => ConflictKind::DifferentProject,
        (None, Some(_)) => ConflictKind::UnboundSurface,
        (Some(_), None) => ConflictKind::StandaloneTimer,
        _ => return None,
    };
    Some(Conflict {
        kind,
        active_project_id: snapshot.active_project_id.clone(),
        active_task_id: snapshot.active_task_id.clone(),
        paused: snapshot.is_paused,
        time_remaining_sec: snapshot.time_remaining_sec,
    })
}

pub struct ConflictDetector {
    shared: SharedTimerState,
    surface_project: Option<String>,
    poll_interval: Duration,
    current: watch::Sender<Option<Conflict>>,
}

impl ConflictDetector {
    pub fn new(shared: SharedTimerState, surface_project: Option<String>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            shared,
            surface_project,
            poll_interval: DEFAULT_POLL_INTERVAL,
            current,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Re-evaluate now and publish the result.
    pub fn check(&self) -> Option<Conflict> {
        let conflict = detect(&self.shared.get(), self.surface_project.as_deref());
        let changed = *self.current.borrow() != conflict;
        if changed {
            debug!(?conflict, "conflict state changed");
            self.current.send_replace(conflict.clone());
        }
        conflict
    }

    pub fn current(&self) -> Option<Conflict> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Conflict>> {
        self.current.subscribe()
    }

    /// Poll every interval until the returned handle is aborted.
    pub fn spawn_polling(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            loop {
                interval.tick().await;
                self.check();
            }
        })
    }

    /// First half of the Stop resolution. Nothing changes until the returned
    /// request is confirmed; dropping it declines.
    pub fn request_stop(&self) -> Option<StopRequest> {
        self.check().map(|conflict| StopRequest { conflict })
    }

    /// The View resolution. Never mutates the timer.
    pub fn view(&self) -> Option<ViewTarget> {
        self.check().map(|c| ViewTarget {
            project_id: c.active_project_id,
            task_id: c.active_task_id,
        })
    }
}

/// A pending Stop that needs the user's explicit confirmation.
#[derive(Debug)]
#[must_use = "a stop request does nothing until confirmed"]
pub struct StopRequest {
    conflict: Conflict,
}

impl StopRequest {
    pub fn conflict(&self) -> &Conflict {
        &self.conflict
    }

    /// Prompt text for the confirmation dialog.
    pub fn prompt(&self) -> String {
        match &self.conflict.active_project_id {
            Some(project) => format!("A timer is running for project {project}. Stop it?"),
            None => "A standalone timer is running. Stop it?".to_string(),
        }
    }

    pub fn confirm(self, engine: &mut TimerEngine) {
        info!(kind = ?self.conflict.kind, "conflicting timer stopped by user");
        engine.stop_to_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::timer::{SessionPolicy, StartOptions};

    fn running(project: Option<&str>) -> TimerState {
        let mut s = TimerState::initial(&SessionPolicy::default());
        s.is_running = true;
        s.start_epoch_ms = Some(0);
        s.active_project_id = project.map(str::to_string);
        s.active_task_id = Some("t1".into());
        s.is_standalone = project.is_none();
        s
    }

    #[test]
    fn detects_each_case() {
        assert_eq!(
            detect(&running(Some("p1")), Some("p2")).unwrap().kind,
            ConflictKind::DifferentProject
        );
        assert_eq!(detect(&running(Some("p1")), None).unwrap().kind, ConflictKind::UnboundSurface);
        assert_eq!(detect(&running(None), Some("p2")).unwrap().kind, ConflictKind::StandaloneTimer);
    }

    #[test]
    fn matching_surface_is_not_a_conflict() {
        assert!(detect(&running(Some("p1")), Some("p1")).is_none());
        assert!(detect(&running(None), None).is_none());
    }

    #[test]
    fn idle_or_break_is_never_a_conflict() {
        let idle = TimerState::initial(&SessionPolicy::default());
        assert!(detect(&idle, Some("p1")).is_none());

        let mut on_break = running(Some("p1"));
        on_break.current_session = SessionType::ShortBreak;
        assert!(detect(&on_break, Some("p2")).is_none());
    }

    #[test]
    fn paused_timer_still_conflicts() {
        let mut s = running(Some("p1"));
        s.is_running = false;
        s.is_paused = true;
        let c = detect(&s, Some("p2")).unwrap();
        assert!(c.paused);
    }

    #[test]
    fn stop_needs_confirmation_and_view_does_not_mutate() {
        let clock = ManualClock::new(0);
        let mut engine = TimerEngine::new(SessionPolicy::default(), Arc::new(clock));
        engine.start(StartOptions::task("t1").project("p1"));
        let detector = ConflictDetector::new(engine.shared().clone(), Some("p2".into()));

        let target = detector.view().unwrap();
        assert_eq!(target.project_id.as_deref(), Some("p1"));
        assert!(engine.state().is_running);

        let declined = detector.request_stop().unwrap();
        drop(declined);
        assert!(engine.state().is_running);

        let request = detector.request_stop().unwrap();
        assert!(request.prompt().contains("p1"));
        request.confirm(&mut engine);
        assert!(!engine.state().is_active());
        assert!(detector.check().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn polling_publishes_changes() {
        let clock = ManualClock::new(0);
        let mut engine = TimerEngine::new(SessionPolicy::default(), Arc::new(clock));
        let detector = Arc::new(ConflictDetector::new(engine.shared().clone(), None));
        let mut rx = detector.subscribe();
        let handle = detector.clone().spawn_polling();

        engine.start(StartOptions::task("t1").project("p1"));
        tokio::time::advance(DEFAULT_POLL_INTERVAL).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().kind, ConflictKind::UnboundSurface);
        handle.abort();
    }
}
