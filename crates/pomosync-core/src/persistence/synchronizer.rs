use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{reconcile, PersistenceAdapter, TimerRecord};
use crate::auth::AuthSession;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::timer::{SessionPolicy, TimerState};

/// Which backend a load was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    Local,
    /// Nothing stored anywhere; fresh defaults.
    Defaults,
}

/// Result of one write-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteReport {
    pub local_ok: bool,
    /// `None` when no remote write was attempted.
    pub remote_ok: Option<bool>,
}

/// A state to write, with the policy in effect when it was produced.
#[derive(Debug, Clone)]
pub struct PersistRequest {
    pub state: TimerState,
    pub policy: SessionPolicy,
}

/// Engine-side handle: enqueue and return immediately.
#[derive(Debug, Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<PersistRequest>,
}

impl PersistHandle {
    pub fn persist(&self, state: &TimerState, policy: &SessionPolicy) {
        let req = PersistRequest {
            state: state.clone(),
            policy: *policy,
        };
        if self.tx.send(req).is_err() {
            warn!("persistence writer is gone; timer state not saved");
        }
    }
}

pub fn persist_channel() -> (PersistHandle, mpsc::UnboundedReceiver<PersistRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PersistHandle { tx }, rx)
}

/// Owns the load fallback and the write-through policy.
///
/// The local store is the durability baseline and is always written. The
/// remote store is consulted and written only while authenticated, and its
/// failures never roll anything back.
pub struct PersistenceSynchronizer {
    local: Arc<dyn PersistenceAdapter>,
    remote: Option<Arc<dyn PersistenceAdapter>>,
    auth: AuthSession,
    clock: Arc<dyn Clock>,
}

impl PersistenceSynchronizer {
    pub fn new(
        local: Arc<dyn PersistenceAdapter>,
        remote: Option<Arc<dyn PersistenceAdapter>>,
        auth: AuthSession,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            local,
            remote,
            auth,
            clock,
        }
    }

    fn active_remote(&self) -> Option<&Arc<dyn PersistenceAdapter>> {
        self.remote.as_ref().filter(|_| self.auth.is_authenticated())
    }

    /// Load and reconcile. Never fails: the worst case is fresh defaults.
    pub async fn load(&self, policy: &SessionPolicy) -> (TimerState, LoadSource) {
        let now = self.clock.now_ms();

        if let Some(remote) = self.active_remote() {
            match remote.load().await {
                Ok(Some(record)) => {
                    debug!(source = remote.name(), "timer state loaded");
                    return (reconcile(&record, policy, now), LoadSource::Remote);
                }
                Ok(None) => debug!("remote store has no timer state"),
                Err(e) => self.note_failure(remote.name(), "load", &e),
            }
        }

        match self.local.load().await {
            Ok(Some(record)) => {
                debug!(source = self.local.name(), "timer state loaded");
                (reconcile(&record, policy, now), LoadSource::Local)
            }
            Ok(None) => (Self::defaults(policy, now), LoadSource::Defaults),
            Err(e) => {
                self.note_failure(self.local.name(), "load", &e);
                (Self::defaults(policy, now), LoadSource::Defaults)
            }
        }
    }

    fn defaults(policy: &SessionPolicy, now: u64) -> TimerState {
        let mut state = TimerState::initial(policy);
        state.last_updated_epoch_ms = now;
        state
    }

    /// Write `state` to the local store and, when signed in, the remote.
    pub async fn write_through(&self, state: &TimerState, policy: &SessionPolicy) -> WriteReport {
        let record = TimerRecord::from_state(state, policy);
        let mut report = WriteReport::default();

        match self.local.save(&record).await {
            Ok(()) => report.local_ok = true,
            Err(e) => self.note_failure(self.local.name(), "save", &e),
        }

        if let Some(remote) = self.active_remote() {
            match remote.save(&record).await {
                Ok(()) => report.remote_ok = Some(true),
                Err(e) => {
                    self.note_failure(remote.name(), "save", &e);
                    report.remote_ok = Some(false);
                }
            }
        }
        report
    }

    /// Apply queued writes in order until every [`PersistHandle`] is dropped.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<PersistRequest>) {
        while let Some(req) = rx.recv().await {
            self.write_through(&req.state, &req.policy).await;
        }
        debug!("persistence writer stopped");
    }

    fn note_failure(&self, backend: &str, op: &str, err: &StoreError) {
        if matches!(err, StoreError::Unauthorized) {
            self.auth.clear();
        }
        warn!(backend, op, error = %err, "timer persistence failed; continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::timer::SessionType;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory adapter with a switchable failure mode.
    #[derive(Default)]
    struct MemoryStore {
        record: Mutex<Option<TimerRecord>>,
        fail_with_401: Mutex<bool>,
        saves: Mutex<usize>,
    }

    #[async_trait]
    impl PersistenceAdapter for MemoryStore {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn load(&self) -> Result<Option<TimerRecord>, StoreError> {
            if *self.fail_with_401.lock().unwrap() {
                return Err(StoreError::Unauthorized);
            }
            Ok(self.record.lock().unwrap().clone())
        }

        async fn save(&self, record: &TimerRecord) -> Result<(), StoreError> {
            if *self.fail_with_401.lock().unwrap() {
                return Err(StoreError::Unauthorized);
            }
            *self.saves.lock().unwrap() += 1;
            *self.record.lock().unwrap() = Some(record.clone());
            Ok(())
        }
    }

    fn running_state(now: u64) -> TimerState {
        let mut s = TimerState::initial(&SessionPolicy::default());
        s.is_running = true;
        s.start_epoch_ms = Some(now);
        s.session_start_epoch_ms = Some(now);
        s.last_updated_epoch_ms = now;
        s.active_task_id = Some("t1".into());
        s
    }

    fn sync(
        local: &Arc<MemoryStore>,
        remote: &Arc<MemoryStore>,
        auth: &AuthSession,
        clock: &ManualClock,
    ) -> PersistenceSynchronizer {
        PersistenceSynchronizer::new(
            local.clone(),
            Some(remote.clone() as Arc<dyn PersistenceAdapter>),
            auth.clone(),
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    async fn anonymous_writes_local_only() {
        let (local, remote) = (Arc::new(MemoryStore::default()), Arc::new(MemoryStore::default()));
        let clock = ManualClock::new(1_000);
        let s = sync(&local, &remote, &AuthSession::anonymous(), &clock);
        let report = s.write_through(&running_state(1_000), &SessionPolicy::default()).await;
        assert_eq!(report, WriteReport { local_ok: true, remote_ok: None });
        assert_eq!(*remote.saves.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn remote_401_keeps_local_and_clears_credentials() {
        let (local, remote) = (Arc::new(MemoryStore::default()), Arc::new(MemoryStore::default()));
        *remote.fail_with_401.lock().unwrap() = true;
        let auth = AuthSession::with_credentials("alice", "tok");
        let clock = ManualClock::new(1_000);
        let s = sync(&local, &remote, &auth, &clock);

        let report = s.write_through(&running_state(1_000), &SessionPolicy::default()).await;
        assert!(report.local_ok);
        assert_eq!(report.remote_ok, Some(false));
        assert!(!auth.is_authenticated());
        assert!(local.record.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn load_prefers_remote_when_signed_in() {
        let (local, remote) = (Arc::new(MemoryStore::default()), Arc::new(MemoryStore::default()));
        let policy = SessionPolicy::default();
        let mut remote_state = running_state(0);
        remote_state.pomodoro_count = 7;
        *remote.record.lock().unwrap() = Some(TimerRecord::from_state(&remote_state, &policy));
        *local.record.lock().unwrap() = Some(TimerRecord::from_state(&running_state(0), &policy));

        let clock = ManualClock::new(30_000);
        let s = sync(&local, &remote, &AuthSession::with_credentials("alice", "tok"), &clock);
        let (state, source) = s.load(&policy).await;
        assert_eq!(source, LoadSource::Remote);
        assert_eq!(state.pomodoro_count, 7);
        assert_eq!(state.time_remaining_sec, 25 * 60 - 30);
    }

    #[tokio::test]
    async fn load_falls_back_to_local_on_remote_failure() {
        let (local, remote) = (Arc::new(MemoryStore::default()), Arc::new(MemoryStore::default()));
        *remote.fail_with_401.lock().unwrap() = true;
        let policy = SessionPolicy::default();
        *local.record.lock().unwrap() = Some(TimerRecord::from_state(&running_state(0), &policy));

        let clock = ManualClock::new(10_000);
        let auth = AuthSession::with_credentials("alice", "tok");
        let s = sync(&local, &remote, &auth, &clock);
        let (state, source) = s.load(&policy).await;
        assert_eq!(source, LoadSource::Local);
        assert!(state.is_running);
        assert!(!auth.is_authenticated());
    }

    #[tokio::test]
    async fn empty_stores_yield_defaults() {
        let (local, remote) = (Arc::new(MemoryStore::default()), Arc::new(MemoryStore::default()));
        let clock = ManualClock::new(5);
        let s = sync(&local, &remote, &AuthSession::anonymous(), &clock);
        let (state, source) = s.load(&SessionPolicy::default()).await;
        assert_eq!(source, LoadSource::Defaults);
        assert_eq!(state.current_session, SessionType::Work);
        assert!(!state.is_active());
    }

    #[tokio::test]
    async fn writer_applies_requests_in_order() {
        let (local, remote) = (Arc::new(MemoryStore::default()), Arc::new(MemoryStore::default()));
        let clock = ManualClock::new(0);
        let s = Arc::new(sync(&local, &remote, &AuthSession::anonymous(), &clock));
        let (handle, rx) = persist_channel();
        let policy = SessionPolicy::default();

        let mut state = running_state(0);
        for count in 1..=3 {
            state.pomodoro_count = count;
            handle.persist(&state, &policy);
        }
        drop(handle);
        s.run(rx).await;

        assert_eq!(*local.saves.lock().unwrap(), 3);
        assert_eq!(local.record.lock().unwrap().as_ref().unwrap().pomodoro_count, 3);
    }
}
