use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time cumulative daily counters from a wearable.
///
/// Either value may be unknown when the device has not synced.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WearableMetrics {
    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(default)]
    pub steps: Option<u64>,
}

impl WearableMetrics {
    #[must_use]
    pub fn new(calories: Option<f64>, steps: Option<u64>) -> Self {
        Self { calories, steps }
    }

    /// Both counters unknown.
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.calories.is_none() && self.steps.is_none()
    }
}

/// One paused stretch of a session. `resumed_at == None` while still paused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseInterval {
    pub paused_at: DateTime<Utc>,
    #[serde(default)]
    pub resumed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics_at_pause: WearableMetrics,
    #[serde(default)]
    pub metrics_at_resume: Option<WearableMetrics>,
}

impl PauseInterval {
    #[must_use]
    pub fn open(paused_at: DateTime<Utc>, metrics_at_pause: WearableMetrics) -> Self {
        Self {
            paused_at,
            resumed_at: None,
            metrics_at_pause,
            metrics_at_resume: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.resumed_at.is_none()
    }

    pub fn close(&mut self, resumed_at: DateTime<Utc>, metrics_at_resume: WearableMetrics) {
        self.resumed_at = Some(resumed_at);
        self.metrics_at_resume = Some(metrics_at_resume);
    }
}
