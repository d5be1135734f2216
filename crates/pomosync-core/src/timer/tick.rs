//! Drift-compensated tick schedule.
//!
//! Each tick is scheduled one interval after the *previous scheduled*
//! instant, not after the instant it actually fired, so small delays do not
//! accumulate. A delay larger than [`MAX_DRIFT_MS`] (a throttled background
//! process, a suspended laptop) re-bases the schedule on the current time.

pub const TICK_INTERVAL_MS: u64 = 1_000;
pub const MAX_DRIFT_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSchedule {
    next_at_ms: u64,
}

impl TickSchedule {
    /// First tick one interval after `now_ms`.
    pub fn starting_at(now_ms: u64) -> Self {
        Self {
            next_at_ms: now_ms.saturating_add(TICK_INTERVAL_MS),
        }
    }

    /// First tick right away; used when picking up a restored running timer.
    pub fn immediate(now_ms: u64) -> Self {
        Self { next_at_ms: now_ms }
    }

    pub fn next_at_ms(&self) -> u64 {
        self.next_at_ms
    }

    pub fn delay_from(&self, now_ms: u64) -> u64 {
        self.next_at_ms.saturating_sub(now_ms)
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms >= self.next_at_ms
    }

    /// Record a tick firing at `now_ms` and schedule the next one.
    ///
    /// Returns the observed drift. A tick that fires before it is due leaves
    /// the schedule untouched.
    pub fn advance(&mut self, now_ms: u64) -> u64 {
        if !self.is_due(now_ms) {
            return 0;
        }
        let drift = now_ms - self.next_at_ms;
        if drift > MAX_DRIFT_MS {
            tracing::debug!(drift_ms = drift, "tick drift too large; re-basing schedule");
            self.next_at_ms = now_ms.saturating_add(TICK_INTERVAL_MS);
        } else {
            self.next_at_ms = self.next_at_ms.saturating_add(TICK_INTERVAL_MS);
        }
        drift
    }
}
