//! Session policy: durations and the work/break cycle.
//!
//! Pure functions only. The next session depends on the previous session,
//! the pomodoro count and the long-break interval, never on wall-clock time.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionType {
    #[default]
    Work,
    ShortBreak,
    LongBreak,
}

impl SessionType {
    pub fn is_break(self) -> bool {
        !matches!(self, SessionType::Work)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::Work => "work",
            SessionType::ShortBreak => "shortBreak",
            SessionType::LongBreak => "longBreak",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionType::Work => "Work",
            SessionType::ShortBreak => "Short Break",
            SessionType::LongBreak => "Long Break",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "work" => Some(SessionType::Work),
            "shortBreak" | "short_break" | "short" => Some(SessionType::ShortBreak),
            "longBreak" | "long_break" | "long" => Some(SessionType::LongBreak),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durations (minutes) and cycle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPolicy {
    pub work_min: u32,
    pub short_break_min: u32,
    pub long_break_min: u32,
    /// Completed pomodoros before a long break. Always >= 1.
    pub long_break_interval: u32,
    pub auto_start_next_session: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            work_min: 25,
            short_break_min: 5,
            long_break_min: 15,
            long_break_interval: 4,
            auto_start_next_session: false,
        }
    }
}

impl SessionPolicy {
    /// Session length in seconds.
    pub fn duration_for(&self, session: SessionType) -> u64 {
        let minutes = match session {
            SessionType::Work => self.work_min,
            SessionType::ShortBreak => self.short_break_min,
            SessionType::LongBreak => self.long_break_min,
        };
        u64::from(minutes).saturating_mul(60)
    }

    pub fn duration_ms_for(&self, session: SessionType) -> u64 {
        self.duration_for(session).saturating_mul(1000)
    }

    pub fn next_session(&self, current: SessionType, pomodoro_count: u32) -> SessionType {
        next_session(current, pomodoro_count, self.long_break_interval)
    }
}

/// Session following `current`.
///
/// `pomodoro_count` is the count *after* the increment for the work session
/// that just finished. A long break lands on every `long_break_interval`-th
/// completion, 1-indexed.
pub fn next_session(current: SessionType, pomodoro_count: u32, long_break_interval: u32) -> SessionType {
    match current {
        SessionType::Work => {
            let interval = long_break_interval.max(1);
            let count = pomodoro_count.max(1);
            let position_in_cycle = ((count - 1) % interval) + 1;
            if position_in_cycle == interval {
                SessionType::LongBreak
            } else {
                SessionType::ShortBreak
            }
        }
        SessionType::ShortBreak | SessionType::LongBreak => SessionType::Work,
    }
}
