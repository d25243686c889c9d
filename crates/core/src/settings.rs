use chrono::Duration;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("freshness threshold must be > 0")]
    InvalidFreshness,

    #[error("local cache max age must be >= the freshness threshold")]
    InvalidLocalMaxAge,

    #[error("autosave period must be > 0")]
    InvalidAutosavePeriod,

    #[error("debounce must be > 0 and shorter than the autosave period")]
    InvalidDebounce,

    #[error("tick cadence must be between 100ms and 60s")]
    InvalidTick,

    #[error("default rest must be between 1 and 3600 seconds")]
    InvalidDefaultRest,

    #[error("finalize attempts must be > 0")]
    InvalidFinalizeAttempts,

    #[error("finalize backoff must not be negative")]
    InvalidFinalizeBackoff,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Timing policy for the workout engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    freshness_threshold: Duration,
    local_max_age: Duration,
    autosave_period: Duration,
    debounce: Duration,
    tick: Duration,
    default_rest_seconds: u32,
    finalize_attempts: u32,
    finalize_backoff: Duration,
}

impl EngineSettings {
    /// Production defaults:
    /// - sessions saved within the last 2 hours resume without asking
    /// - local copies older than 24 hours are ignored
    /// - autosave every 30 seconds, 2 seconds after the last edit
    /// - three attempts to save a finished workout, one second apart
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            freshness_threshold: Duration::hours(2),
            local_max_age: Duration::hours(24),
            autosave_period: Duration::seconds(30),
            debounce: Duration::seconds(2),
            tick: Duration::seconds(1),
            default_rest_seconds: 90,
            finalize_attempts: 3,
            finalize_backoff: Duration::seconds(1),
        }
    }

    /// Creates custom engine settings.
    ///
    /// # Errors
    ///
    /// Returns a `SettingsError` naming the first out-of-range value.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        freshness_threshold: Duration,
        local_max_age: Duration,
        autosave_period: Duration,
        debounce: Duration,
        tick: Duration,
        default_rest_seconds: u32,
        finalize_attempts: u32,
        finalize_backoff: Duration,
    ) -> Result<Self, SettingsError> {
        if freshness_threshold <= Duration::zero() {
            return Err(SettingsError::InvalidFreshness);
        }
        if local_max_age < freshness_threshold {
            return Err(SettingsError::InvalidLocalMaxAge);
        }
        if autosave_period <= Duration::zero() {
            return Err(SettingsError::InvalidAutosavePeriod);
        }
        if debounce <= Duration::zero() || debounce >= autosave_period {
            return Err(SettingsError::InvalidDebounce);
        }
        if tick < Duration::milliseconds(100) || tick > Duration::seconds(60) {
            return Err(SettingsError::InvalidTick);
        }
        if !(1..=3_600).contains(&default_rest_seconds) {
            return Err(SettingsError::InvalidDefaultRest);
        }
        if finalize_attempts == 0 {
            return Err(SettingsError::InvalidFinalizeAttempts);
        }
        if finalize_backoff < Duration::zero() {
            return Err(SettingsError::InvalidFinalizeBackoff);
        }

        Ok(Self {
            freshness_threshold,
            local_max_age,
            autosave_period,
            debounce,
            tick,
            default_rest_seconds,
            finalize_attempts,
            finalize_backoff,
        })
    }

    /// Defaults with no wait between finalize attempts; keeps tests fast.
    #[must_use]
    pub fn without_backoff() -> Self {
        Self {
            finalize_backoff: Duration::zero(),
            ..Self::defaults()
        }
    }

    #[must_use]
    pub fn freshness_threshold(&self) -> Duration {
        self.freshness_threshold
    }

    #[must_use]
    pub fn local_max_age(&self) -> Duration {
        self.local_max_age
    }

    #[must_use]
    pub fn autosave_period(&self) -> Duration {
        self.autosave_period
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    #[must_use]
    pub fn tick(&self) -> Duration {
        self.tick
    }

    #[must_use]
    pub fn default_rest_seconds(&self) -> u32 {
        self.default_rest_seconds
    }

    #[must_use]
    pub fn finalize_attempts(&self) -> u32 {
        self.finalize_attempts
    }

    #[must_use]
    pub fn finalize_backoff(&self) -> Duration {
        self.finalize_backoff
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(debounce: Duration, attempts: u32) -> Result<EngineSettings, SettingsError> {
        EngineSettings::new(
            Duration::hours(2),
            Duration::hours(24),
            Duration::seconds(30),
            debounce,
            Duration::seconds(1),
            90,
            attempts,
            Duration::seconds(1),
        )
    }

    #[test]
    fn defaults_match_engine_policy() {
        let settings = EngineSettings::default();
        assert_eq!(settings.freshness_threshold(), Duration::hours(2));
        assert_eq!(settings.autosave_period(), Duration::seconds(30));
        assert_eq!(settings.debounce(), Duration::seconds(2));
        assert_eq!(settings.default_rest_seconds(), 90);
        assert_eq!(settings.finalize_attempts(), 3);
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(build(Duration::zero(), 3), Err(SettingsError::InvalidDebounce));
        assert_eq!(build(Duration::seconds(45), 3), Err(SettingsError::InvalidDebounce));
        assert_eq!(build(Duration::seconds(2), 0), Err(SettingsError::InvalidFinalizeAttempts));
        assert!(build(Duration::seconds(2), 3).is_ok());

        let err = EngineSettings::new(
            Duration::hours(2),
            Duration::hours(1),
            Duration::seconds(30),
            Duration::seconds(2),
            Duration::seconds(1),
            90,
            3,
            Duration::zero(),
        );
        assert_eq!(err, Err(SettingsError::InvalidLocalMaxAge));
    }
}
