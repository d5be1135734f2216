//! Device-scoped timer store on top of the SQLite kv table.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{PersistenceAdapter, TimerRecord};
use crate::auth::AuthSession;
use crate::error::StoreError;
use crate::storage::Database;
use crate::timer::SessionType;

const KEY_START_TIME: &str = "start_time";
const KEY_DURATION: &str = "duration";
const KEY_RUNNING: &str = "is_running";
const KEY_PAUSED_REMAINING: &str = "paused_remaining";
const KEY_SESSION: &str = "current_session";
const KEY_COUNT: &str = "pomodoro_count";
const KEY_PROJECT: &str = "project_id";
const KEY_TASK: &str = "task_id";
const KEY_REMAINING: &str = "time_remaining";
const KEY_UPDATED_AT: &str = "updated_at";
const KEY_STANDALONE: &str = "is_standalone";
const KEY_SESSION_START: &str = "session_start_time";

/// Key prefix. Signed-in and anonymous state never share keys, and
/// different accounts never see each other's timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalNamespace {
    Guest,
    Account(String),
}

impl LocalNamespace {
    pub fn for_session(auth: &AuthSession) -> Self {
        match auth.account() {
            Some(account) => LocalNamespace::Account(account),
            None => LocalNamespace::Guest,
        }
    }

    fn prefix(&self) -> String {
        match self {
            LocalNamespace::Guest => "timer.guest.".to_string(),
            LocalNamespace::Account(account) => format!("timer.user.{account}."),
        }
    }
}

pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    namespace: LocalNamespace,
}

impl LocalStore {
    pub fn new(db: Arc<Mutex<Database>>, namespace: LocalNamespace) -> Self {
        Self { db, namespace }
    }

    pub fn namespace(&self) -> &LocalNamespace {
        &self.namespace
    }

    fn key(&self, name: &str) -> String {
        format!("{}{name}", self.namespace.prefix())
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        match self.db.lock() {
            Ok(db) => db,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_record(&self) -> Result<Option<TimerRecord>, StoreError> {
        let db = self.db();
        let get = |name: &str| db.kv_get(&self.key(name));

        let Some(session_raw) = get(KEY_SESSION)? else {
            return Ok(None);
        };
        let current_session = SessionType::parse(&session_raw).ok_or_else(|| StoreError::Corrupt {
            key: self.key(KEY_SESSION),
            value: session_raw.clone(),
        })?;

        let is_running = parse_or(&self.key(KEY_RUNNING), get(KEY_RUNNING)?, false)?;
        let paused_remaining: Option<u64> = parse_opt(&self.key(KEY_PAUSED_REMAINING), get(KEY_PAUSED_REMAINING)?)?;
        let time_remaining = match paused_remaining {
            Some(remaining) if !is_running => remaining,
            _ => parse_or(&self.key(KEY_REMAINING), get(KEY_REMAINING)?, 0)?,
        };

        Ok(Some(TimerRecord {
            is_running,
            is_paused: !is_running && paused_remaining.is_some(),
            current_session,
            time_remaining,
            pomodoro_count: parse_or(&self.key(KEY_COUNT), get(KEY_COUNT)?, 0)?,
            project_id: get(KEY_PROJECT)?,
            task_id: get(KEY_TASK)?,
            last_updated_time: parse_or(&self.key(KEY_UPDATED_AT), get(KEY_UPDATED_AT)?, 0)?,
            session_times: None,
            duration_ms: parse_opt(&self.key(KEY_DURATION), get(KEY_DURATION)?)?,
            session_start_time: parse_opt(&self.key(KEY_SESSION_START), get(KEY_SESSION_START)?)?,
            is_standalone: parse_or(&self.key(KEY_STANDALONE), get(KEY_STANDALONE)?, false)?,
        }))
    }

    fn write_record(&self, record: &TimerRecord) -> Result<(), StoreError> {
        // Start instant of the current run, derived from the write snapshot.
        let start_time = match (record.is_running, record.duration_ms) {
            (true, Some(duration)) => Some(
                record
                    .last_updated_time
                    .saturating_sub(duration.saturating_sub(record.time_remaining * 1000)),
            ),
            _ => None,
        };
        let paused_remaining = record.is_paused.then_some(record.time_remaining);

        let entries = vec![
            (self.key(KEY_START_TIME), start_time.map(|v| v.to_string())),
            (self.key(KEY_DURATION), record.duration_ms.map(|v| v.to_string())),
            (self.key(KEY_RUNNING), Some(record.is_running.to_string())),
            (self.key(KEY_PAUSED_REMAINING), paused_remaining.map(|v| v.to_string())),
            (self.key(KEY_SESSION), Some(record.current_session.as_str().to_string())),
            (self.key(KEY_COUNT), Some(record.pomodoro_count.to_string())),
            (self.key(KEY_PROJECT), record.project_id.clone()),
            (self.key(KEY_TASK), record.task_id.clone()),
            (self.key(KEY_REMAINING), Some(record.time_remaining.to_string())),
            (self.key(KEY_UPDATED_AT), Some(record.last_updated_time.to_string())),
            (self.key(KEY_STANDALONE), Some(record.is_standalone.to_string())),
            (self.key(KEY_SESSION_START), record.session_start_time.map(|v| v.to_string())),
        ];
        self.db().kv_set_many(&entries)?;
        Ok(())
    }
}

fn parse_opt<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>, StoreError> {
    raw.map(|value| {
        value.parse::<T>().map_err(|_| StoreError::Corrupt {
            key: key.to_string(),
            value,
        })
    })
    .transpose()
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, StoreError> {
    Ok(parse_opt(key, raw)?.unwrap_or(default))
}

#[async_trait]
impl PersistenceAdapter for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn load(&self) -> Result<Option<TimerRecord>, StoreError> {
        self.read_record()
    }

    async fn save(&self, record: &TimerRecord) -> Result<(), StoreError> {
        self.write_record(record)
    }
}
