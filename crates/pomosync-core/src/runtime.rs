//! Assembly of a [`TimerEngine`] with its stores and background workers.
//!
//! ```ignore
//! let runtime = TimerRuntime::start(RuntimeOptions::new(config, auth, db, queue)).await?;
//! runtime.engine().lock().unwrap().start(StartOptions::standalone());
//! let _driver = runtime.spawn_driver();
//! // ...
//! runtime.shutdown().await;
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::auth::AuthSession;
use crate::clock::{Clock, SystemClock};
use crate::completion::{CompletionHandler, Notifier, SoundPlayer};
use crate::conflict::ConflictDetector;
use crate::error::{RecordError, Result, StoreError};
use crate::events::EventBus;
use crate::persistence::{
    persist_channel, LoadSource, LocalNamespace, LocalStore, PersistenceAdapter,
    PersistenceSynchronizer, RemoteStore,
};
use crate::recording::{
    record_channel, HttpRecordingClient, PendingQueue, PomodoroRecord, RecordingClient,
    RecordingWorker,
};
use crate::storage::{Config, Database};
use crate::timer::{SharedTimerState, TimerDriver, TimerEngine};

pub struct RuntimeOptions {
    pub config: Config,
    pub auth: AuthSession,
    pub db: Arc<Mutex<Database>>,
    pub queue: Arc<Mutex<PendingQueue>>,
    pub clock: Arc<dyn Clock>,
    pub sound: Option<Box<dyn SoundPlayer>>,
    pub notifier: Option<Box<dyn Notifier>>,
}

impl RuntimeOptions {
    pub fn new(
        config: Config,
        auth: AuthSession,
        db: Arc<Mutex<Database>>,
        queue: Arc<Mutex<PendingQueue>>,
    ) -> Self {
        Self {
            config,
            auth,
            db,
            queue,
            clock: Arc::new(SystemClock),
            sound: None,
            notifier: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sound(mut self, sound: Box<dyn SoundPlayer>) -> Self {
        self.sound = Some(sound);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

/// Stands in for the backend when no `remote.base_url` is configured, so
/// every recording lands in the pending queue.
struct NoRemote;

#[async_trait]
impl RecordingClient for NoRemote {
    async fn create_pomodoro_record(&self, _record: &PomodoroRecord) -> Result<(), RecordError> {
        Err(RecordError::Network("no remote configured".into()))
    }
}

fn remote_base(config: &Config) -> Result<Option<Url>> {
    config
        .remote
        .base_url
        .as_deref()
        .map(|raw| Url::parse(raw).map_err(StoreError::from))
        .transpose()
        .map_err(Into::into)
}

/// Recording client for `config`, shared by the runtime and the sync pass.
pub fn recording_client(config: &Config, auth: &AuthSession) -> Result<Arc<dyn RecordingClient>> {
    let timeout = Duration::from_secs(config.remote.timeout_secs);
    Ok(match remote_base(config)? {
        Some(base) => Arc::new(HttpRecordingClient::new(&base, auth.clone(), timeout)?),
        None => Arc::new(NoRemote),
    })
}

pub struct TimerRuntime {
    engine: Arc<Mutex<TimerEngine>>,
    bus: EventBus,
    shared: SharedTimerState,
    auth: AuthSession,
    source: LoadSource,
    poll_interval: Duration,
    writer: JoinHandle<()>,
    recorder: JoinHandle<()>,
}

impl TimerRuntime {
    /// Load the persisted timer, then spawn the persistence writer and the
    /// recording worker on the current tokio runtime.
    pub async fn start(opts: RuntimeOptions) -> Result<Self> {
        let RuntimeOptions {
            config,
            auth,
            db,
            queue,
            clock,
            sound,
            notifier,
        } = opts;
        config.validate()?;
        let policy = config.policy();
        let timeout = Duration::from_secs(config.remote.timeout_secs);

        let bus = EventBus::new();
        let shared = SharedTimerState::new(crate::timer::TimerState::initial(&policy));

        let local: Arc<dyn PersistenceAdapter> = Arc::new(LocalStore::new(
            db.clone(),
            LocalNamespace::for_session(&auth),
        ));
        let remote: Option<Arc<dyn PersistenceAdapter>> = match remote_base(&config)? {
            Some(base) => Some(Arc::new(RemoteStore::new(&base, auth.clone(), timeout)?)),
            None => None,
        };
        let synchronizer = Arc::new(PersistenceSynchronizer::new(
            local,
            remote,
            auth.clone(),
            clock.clone(),
        ));
        let (state, source) = synchronizer.load(&policy).await;
        info!(?source, phase = ?state.phase(), session = %state.current_session, "timer loaded");

        let (persist, persist_rx) = persist_channel();
        let writer = tokio::spawn(synchronizer.run(persist_rx));

        let worker = RecordingWorker::new(
            recording_client(&config, &auth)?,
            queue,
            auth.clone(),
            bus.clone(),
        )
        .with_history(db);
        let (record, record_rx) = record_channel();
        let recorder = tokio::spawn(worker.run(record_rx));

        let mut completion = CompletionHandler::new(auth.clone()).with_recorder(record);
        if let Some(sound) = sound {
            completion = completion.with_sound(sound);
        }
        if let Some(notifier) = notifier {
            completion = completion.with_notifier(notifier);
        }
        completion.set_preferences(
            config.notifications.sound_enabled,
            config.notifications.notifications_enabled,
        );

        let mut engine = TimerEngine::new(policy, clock)
            .with_bus(bus.clone())
            .with_shared(shared.clone())
            .with_persistence(persist)
            .with_completion(completion);
        engine.restore(state);

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            bus,
            shared,
            auth,
            source,
            poll_interval: Duration::from_millis(config.conflict.poll_interval_ms),
            writer,
            recorder,
        })
    }

    pub fn engine(&self) -> &Arc<Mutex<TimerEngine>> {
        &self.engine
    }

    /// Lock the engine, recovering from a poisoned lock.
    pub fn lock(&self) -> MutexGuard<'_, TimerEngine> {
        match self.engine.lock() {
            Ok(engine) => engine,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn shared(&self) -> &SharedTimerState {
        &self.shared
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn source(&self) -> LoadSource {
        self.source
    }

    pub fn spawn_driver(&self) -> TimerDriver {
        TimerDriver::spawn(self.engine.clone())
    }

    /// Detector for a surface bound to `surface_project`.
    pub fn conflict_detector(&self, surface_project: Option<String>) -> ConflictDetector {
        ConflictDetector::new(self.shared.clone(), surface_project).with_poll_interval(self.poll_interval)
    }

    /// Close the worker channels and wait for queued writes and recordings
    /// to finish.
    pub async fn shutdown(self) {
        self.lock().detach_io();
        let _ = self.writer.await;
        let _ = self.recorder.await;
        debug!("timer runtime stopped");
    }
}
