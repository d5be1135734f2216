//! # Pomosync Core Library
//!
//! Core logic for the pomosync timer: a countdown that moves through work
//! and break sessions, survives restarts, and stays consistent across a
//! local device store and an authenticated remote store.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A wall-clock-based state machine. The caller (or a
//!   [`TimerDriver`]) invokes `tick()`; remaining time is derived from the
//!   start instant so ticks may arrive late without losing time
//! - **Persistence**: Write-through to a SQLite-backed local store and,
//!   when signed in, a remote HTTP store; elapsed-time reconciliation on load
//! - **Completion**: Sound, notification, non-blocking recording with a
//!   pending queue for failed attempts
//! - **Conflicts**: Detection of a timer running for different work than a
//!   surface shows, with Stop and View resolutions
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`PersistenceSynchronizer`]: Load fallback and write-through policy
//! - [`CompletionHandler`]: Side effects of a finished session
//! - [`ConflictDetector`]: Cross-surface consistency check
//! - [`TimerRuntime`]: Everything wired together

pub mod auth;
pub mod clock;
pub mod completion;
pub mod conflict;
pub mod error;
pub mod events;
pub mod persistence;
pub mod recording;
pub mod runtime;
pub mod storage;
pub mod timer;

pub use auth::AuthSession;
pub use clock::{Clock, ManualClock, SystemClock};
pub use completion::{CompletionHandler, LogNotifier, Notifier, SessionOutcome, SoundPlayer, TerminalBell};
pub use conflict::{Conflict, ConflictDetector, ConflictKind, StopRequest, ViewTarget};
pub use error::{ConfigError, CoreError, RecordError, StoreError};
pub use events::EventBus;
pub use persistence::{LoadSource, PersistenceAdapter, PersistenceSynchronizer, TimerRecord};
pub use recording::{PendingEntry, PendingQueue, PomodoroRecord, RecordingClient, RecordingWorker};
pub use runtime::{RuntimeOptions, TimerRuntime};
pub use storage::{Config, Database};
pub use timer::{
    SessionPolicy, SessionType, SharedTimerState, StartOptions, TaskSelection, TimerDriver,
    TimerEngine, TimerPhase, TimerState,
};
