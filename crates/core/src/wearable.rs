//! Wearable delta accounting.
//!
//! Wearables report cumulative daily counters. The activity attributable to a
//! workout is the growth between start and finish minus the growth that
//! happened during pauses:
//!
//! `attributable = max(0, max(0, end - start) - Σ max(0, resume_i - pause_i))`
//!
//! A pause term whose endpoints are not both known contributes 0. When the
//! session-level endpoints are unknown the result itself is unknown.

use crate::model::{PauseInterval, WearableMetrics};

/// A cumulative counter that supports clamped subtraction.
pub trait Counter: Copy {
    const ZERO: Self;

    /// `max(0, later - earlier)`.
    fn clamped_delta(earlier: Self, later: Self) -> Self;

    /// `max(0, self - other)`.
    fn clamped_sub(self, other: Self) -> Self;

    fn add(self, other: Self) -> Self;
}

impl Counter for f64 {
    const ZERO: Self = 0.0;

    fn clamped_delta(earlier: Self, later: Self) -> Self {
        let delta = later - earlier;
        if delta.is_finite() && delta > 0.0 { delta } else { 0.0 }
    }

    fn clamped_sub(self, other: Self) -> Self {
        Self::clamped_delta(other, self)
    }

    fn add(self, other: Self) -> Self {
        self + other
    }
}

impl Counter for u64 {
    const ZERO: Self = 0;

    fn clamped_delta(earlier: Self, later: Self) -> Self {
        later.saturating_sub(earlier)
    }

    fn clamped_sub(self, other: Self) -> Self {
        self.saturating_sub(other)
    }

    fn add(self, other: Self) -> Self {
        self.saturating_add(other)
    }
}

/// Net attributable value for one counter.
pub fn attributable<T, F>(
    start: Option<T>,
    end: Option<T>,
    pauses: &[PauseInterval],
    read: F,
) -> Option<T>
where
    T: Counter,
    F: Fn(&WearableMetrics) -> Option<T>,
{
    let total = T::clamped_delta(start?, end?);
    let paused = pauses
        .iter()
        .filter_map(|p| {
            let at_pause = read(&p.metrics_at_pause)?;
            let at_resume = read(p.metrics_at_resume.as_ref()?)?;
            Some(T::clamped_delta(at_pause, at_resume))
        })
        .fold(T::ZERO, T::add);
    Some(total.clamped_sub(paused))
}

/// Calories and steps attributable to active workout time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WearableDelta {
    pub calories: Option<f64>,
    pub steps: Option<u64>,
}

impl WearableDelta {
    /// Compute the delta between the start and end snapshots, excluding
    /// activity recorded during closed pause intervals.
    #[must_use]
    pub fn compute(start: WearableMetrics, end: WearableMetrics, pauses: &[PauseInterval]) -> Self {
        Self {
            calories: attributable(start.calories, end.calories, pauses, |m| m.calories),
            steps: attributable(start.steps, end.steps, pauses, |m| m.steps),
        }
    }

    /// Calories rounded to whole units for the workout record.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rounded_calories(&self) -> Option<u64> {
        self.calories.map(|c| c.round().max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Session, SessionId};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn metrics(calories: Option<f64>, steps: Option<u64>) -> WearableMetrics {
        WearableMetrics::new(calories, steps)
    }

    #[test]
    fn pause_excluded_from_session_delta() {
        let t0 = fixed_now();
        let mut session = Session::start(SessionId::new_v4(), t0, metrics(Some(80.0), Some(1_000)));

        session.pause(t0 + Duration::seconds(120), metrics(Some(100.0), Some(1_400)));
        session.resume(t0 + Duration::seconds(180), metrics(Some(105.0), Some(1_450)));
        let end = metrics(Some(250.0), Some(3_000));
        session.finish(t0 + Duration::seconds(600), end);

        assert_eq!(session.accumulated_pause_ms(), 60_000);
        let delta = WearableDelta::compute(session.wearable_at_start(), end, session.pause_intervals());
        assert_eq!(delta.calories, Some(165.0));
        assert_eq!(delta.steps, Some(1_950));
    }

    #[test]
    fn unknown_endpoints_yield_unknown_total() {
        let delta = WearableDelta::compute(metrics(None, Some(10)), metrics(Some(50.0), None), &[]);
        assert_eq!(delta.calories, None);
        assert_eq!(delta.steps, None);
    }

    #[test]
    fn pause_term_with_missing_endpoint_contributes_zero() {
        let mut pause = PauseInterval::open(fixed_now(), metrics(None, Some(100)));
        pause.close(fixed_now(), metrics(Some(40.0), None));
        let delta = WearableDelta::compute(
            metrics(Some(10.0), Some(0)),
            metrics(Some(60.0), Some(500)),
            &[pause],
        );
        assert_eq!(delta.calories, Some(50.0));
        assert_eq!(delta.steps, Some(500));
    }

    #[test]
    fn never_negative_with_out_of_order_snapshots() {
        let mut backwards = PauseInterval::open(fixed_now(), metrics(Some(90.0), Some(900)));
        backwards.close(fixed_now(), metrics(Some(70.0), Some(100)));
        let mut huge = PauseInterval::open(fixed_now(), metrics(Some(0.0), Some(0)));
        huge.close(fixed_now(), metrics(Some(1_000.0), Some(50_000)));

        let delta = WearableDelta::compute(
            metrics(Some(200.0), Some(5_000)),
            metrics(Some(150.0), Some(4_000)),
            &[backwards, huge],
        );
        assert_eq!(delta.calories, Some(0.0));
        assert_eq!(delta.steps, Some(0));
    }

    #[test]
    fn open_interval_is_ignored() {
        let open = PauseInterval::open(fixed_now(), metrics(Some(10.0), Some(10)));
        let delta = WearableDelta::compute(metrics(Some(0.0), Some(0)), metrics(Some(30.0), Some(30)), &[open]);
        assert_eq!(delta.calories, Some(30.0));
        assert_eq!(delta.steps, Some(30));
    }

    #[test]
    fn nan_readings_do_not_poison_the_result() {
        let delta = WearableDelta::compute(metrics(Some(f64::NAN), None), metrics(Some(20.0), None), &[]);
        assert_eq!(delta.calories, Some(0.0));
        assert_eq!(delta.rounded_calories(), Some(0));
    }
}
