//! Workout and rest timers derived from absolute timestamps.
//!
//! Nothing here accumulates per tick: every value is recomputed from stored
//! instants and the current clock reading, so a suspended process that misses
//! ticks reports the correct value on its next read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::millis_between;

/// Rest countdown sub-state, present only while resting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestTimer {
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u32,
}

impl RestTimer {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, duration_seconds: u32) -> Self {
        Self {
            started_at,
            duration_seconds,
        }
    }

    /// `max(0, duration - whole seconds since start)`.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u32 {
        let elapsed = millis_between(self.started_at, now) / 1000;
        let remaining = u64::from(self.duration_seconds).saturating_sub(elapsed);
        u32::try_from(remaining).unwrap_or(0)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining_seconds(now) == 0
    }
}

/// Elapsed workout milliseconds.
///
/// `frozen_at` is the instant time stopped (start of the open pause, or the
/// end of a finished session); when set it replaces `now`.
#[must_use]
pub fn elapsed_millis(
    started_at: DateTime<Utc>,
    accumulated_pause_ms: u64,
    frozen_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> u64 {
    let reference = frozen_at.unwrap_or(now);
    millis_between(started_at, reference).saturating_sub(accumulated_pause_ms)
}

/// What one timer refresh observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub elapsed_seconds: u64,
    /// Seconds left on the rest timer, if one is running.
    pub rest_remaining: Option<u32>,
    /// True on the single tick that observed the rest timer reach zero.
    pub rest_finished: bool,
}

/// `m:ss` rendering used in logs and the command-line host.
#[must_use]
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
