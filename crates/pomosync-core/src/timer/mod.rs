mod driver;
mod engine;
mod policy;
mod state;
mod tick;

pub use driver::TimerDriver;
pub use engine::{CompletionCallback, StartOptions, TaskSelection, TimerEngine, TASK_CHANGE_DEBOUNCE_MS};
pub use policy::{next_session, SessionPolicy, SessionType};
pub use state::{SharedTimerState, TimerPhase, TimerState};
pub use tick::{TickSchedule, MAX_DRIFT_MS, TICK_INTERVAL_MS};

/// Whole seconds for display, rounded up so a timer never shows 0 while
/// time is left.
pub fn ms_to_secs_ceil(ms: u64) -> u64 {
    ms.div_ceil(1000)
}

/// `MM:SS`, or `H:MM:SS` past an hour.
pub fn format_clock(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
