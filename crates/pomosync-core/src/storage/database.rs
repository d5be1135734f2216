//! SQLite-based device storage.
//!
//! Provides persistent storage for:
//! - Completed work sessions (local history, independent of the remote)
//! - Session statistics (daily and all-time)
//! - Key-value store backing the local timer store

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::timer::SessionType;

use super::data_dir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub session_type: SessionType,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub duration_min: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub interrupted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Stats {
    pub completed_pomodoros: u64,
    pub total_focus_min: u64,
    pub today_pomodoros: u64,
    pub today_focus_min: u64,
}

/// SQLite database for device-local storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/pomosync/pomosync.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("pomosync.db");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and throwaway surfaces).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                session_type TEXT NOT NULL,
                task_id      TEXT,
                project_id   TEXT,
                duration_min INTEGER NOT NULL,
                started_at   TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                interrupted  INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_completed_at ON sessions(completed_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_type_completed_at ON sessions(session_type, completed_at);",
        )?;
        Ok(())
    }

    /// Record a finished session.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    #[allow(clippy::too_many_arguments)]
    pub fn record_session(
        &self,
        session_type: SessionType,
        task_id: Option<&str>,
        project_id: Option<&str>,
        duration_min: u64,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        interrupted: bool,
    ) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO sessions (session_type, task_id, project_id, duration_min, started_at, completed_at, interrupted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session_type.as_str(),
                task_id,
                project_id,
                duration_min,
                started_at.to_rfc3339(),
                completed_at.to_rfc3339(),
                interrupted,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent sessions first.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_type, task_id, project_id, duration_min, started_at, completed_at, interrupted
             FROM sessions
             ORDER BY completed_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let kind: String = row.get(1)?;
            let started: String = row.get(5)?;
            let completed: String = row.get(6)?;
            Ok(SessionRecord {
                id: row.get(0)?,
                session_type: SessionType::parse(&kind).unwrap_or_default(),
                task_id: row.get(2)?,
                project_id: row.get(3)?,
                duration_min: row.get(4)?,
                started_at: parse_ts(&started),
                completed_at: parse_ts(&completed),
                interrupted: row.get(7)?,
            })
        })?;
        rows.collect()
    }

    /// Statistics over uninterrupted work sessions.
    pub fn stats(&self) -> Result<Stats, rusqlite::Error> {
        let today = format!("{}T00:00:00+00:00", Utc::now().format("%Y-%m-%d"));
        let (completed_pomodoros, total_focus_min) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration_min), 0)
             FROM sessions
             WHERE session_type = 'work' AND interrupted = 0",
            [],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )?;
        let (today_pomodoros, today_focus_min) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration_min), 0)
             FROM sessions
             WHERE session_type = 'work' AND interrupted = 0 AND completed_at >= ?1",
            params![today],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )?;
        Ok(Stats {
            completed_pomodoros,
            total_focus_min,
            today_pomodoros,
            today_focus_min,
        })
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Write several keys atomically; `None` deletes the key.
    pub fn kv_set_many(&mut self, entries: &[(String, Option<String>)]) -> Result<(), rusqlite::Error> {
        let tx = self.conn.transaction()?;
        for (key, value) in entries {
            match value {
                Some(v) => {
                    tx.execute(
                        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                        params![key, v],
                    )?;
                }
                None => {
                    tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                }
            }
        }
        tx.commit()
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
