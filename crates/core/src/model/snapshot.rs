use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::model::exercise::ExerciseEntry;
use crate::model::ids::SessionId;
use crate::model::metrics::{PauseInterval, WearableMetrics};
use crate::model::session::{Session, SessionError, SessionParts};
use crate::timer::{RestTimer, elapsed_millis};

/// Default rest length written when no rest timer is running.
pub const DEFAULT_REST_SECONDS: u32 = 90;

fn default_rest_seconds() -> u32 {
    DEFAULT_REST_SECONDS
}

/// Full-state wire form of a session, as stored remotely and locally.
///
/// Only the first six fields are required on read; the rest were added later
/// and default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub workout_start_time: DateTime<Utc>,
    #[serde(default)]
    pub paused_time_ms: u64,
    #[serde(default)]
    pub rest_start_time: Option<DateTime<Utc>>,
    #[serde(default = "default_rest_seconds", deserialize_with = "rest_or_default")]
    pub rest_duration_seconds: u32,
    #[serde(default)]
    pub is_resting: bool,
    #[serde(default)]
    pub exercises: Vec<ExerciseEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub wearable_at_start: WearableMetrics,
    #[serde(default)]
    pub pause_intervals: Vec<PauseInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub elapsed_seconds: u64,
}

/// `restDurationSeconds` may be stored as `null`.
fn rest_or_default<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(DEFAULT_REST_SECONDS))
}

impl SessionSnapshot {
    /// Capture the full state of `session` as of `now`.
    #[must_use]
    pub fn capture(session: &Session, now: DateTime<Utc>) -> Self {
        let rest = session.rest_timer();
        Self {
            workout_start_time: session.started_at(),
            paused_time_ms: session.accumulated_pause_ms(),
            rest_start_time: rest.map(|r| r.started_at),
            rest_duration_seconds: rest.map_or(DEFAULT_REST_SECONDS, |r| r.duration_seconds),
            is_resting: rest.is_some(),
            exercises: session.exercises().to_vec(),
            session_id: Some(session.id()),
            is_paused: session.is_paused(),
            wearable_at_start: session.wearable_at_start(),
            pause_intervals: session.pause_intervals().to_vec(),
            source_label: session.source_label().map(str::to_owned),
            saved_at: Some(now),
            elapsed_seconds: session.elapsed_seconds(now),
        }
    }

    /// Stored id, or one derived from the start time for snapshots written
    /// before ids were persisted.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id.unwrap_or_else(|| {
            SessionId::derived(
                &self
                    .workout_start_time
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            )
        })
    }

    /// Time of the last write, falling back to the session start.
    #[must_use]
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.saved_at.unwrap_or(self.workout_start_time)
    }

    /// How long ago this snapshot was written. Never negative.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.reference_time()).max(Duration::zero())
    }

    /// Time since the stored workout started. Never negative.
    #[must_use]
    pub fn time_since_start(&self, now: DateTime<Utc>) -> Duration {
        (now - self.workout_start_time).max(Duration::zero())
    }

    /// Copy without the fields that change on every write, for change detection.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            saved_at: None,
            elapsed_seconds: 0,
            ..self.clone()
        }
    }

    /// Elapsed workout time at the moment this snapshot was written.
    #[must_use]
    pub fn elapsed_at_save(&self) -> Duration {
        if self.elapsed_seconds > 0 {
            return Duration::seconds(i64::try_from(self.elapsed_seconds).unwrap_or(i64::MAX));
        }
        let frozen = self
            .pause_intervals
            .last()
            .filter(|p| self.is_paused && p.is_open())
            .map(|p| p.paused_at);
        let millis = elapsed_millis(
            self.workout_start_time,
            self.paused_time_ms,
            frozen,
            self.reference_time(),
        );
        Duration::milliseconds(i64::try_from(millis).unwrap_or(i64::MAX))
    }

    /// Rebuild a live session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidPersistedState` when the pause data is
    /// inconsistent.
    pub fn into_session(self) -> Result<Session, SessionError> {
        let id = self.session_id();
        let rest_timer = match (self.is_resting, self.rest_start_time) {
            (true, Some(started_at)) => Some(RestTimer::new(started_at, self.rest_duration_seconds)),
            _ => None,
        };
        Session::from_parts(SessionParts {
            id,
            started_at: self.workout_start_time,
            accumulated_pause_ms: self.paused_time_ms,
            exercises: self.exercises,
            rest_timer,
            is_paused: self.is_paused,
            wearable_at_start: self.wearable_at_start,
            pause_intervals: self.pause_intervals,
            source_label: self.source_label,
        })
    }
}

/// Local mirror payload: the snapshot plus the epoch-millisecond write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCacheEntry {
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    pub timestamp: i64,
}

impl LocalCacheEntry {
    #[must_use]
    pub fn new(snapshot: SessionSnapshot, written_at: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            timestamp: written_at.timestamp_millis(),
        }
    }

    #[must_use]
    pub fn written_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Age of the local write itself, independent of the snapshot's `savedAt`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.written_at()).max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::exercise::{CatalogExercise, ExerciseCategory, SetField};
    use crate::time::fixed_now;

    fn sample_session() -> Session {
        let mut session = Session::start(
            SessionId::new_v4(),
            fixed_now(),
            WearableMetrics::new(Some(80.0), Some(2_000)),
        )
        .with_source_label("Push Day");
        let id = session
            .add_exercise(&CatalogExercise::new("Squat", ExerciseCategory::Strength))
            .unwrap();
        session.update_set(id, 0, SetField::Reps, "5").unwrap();
        session
    }

    #[test]
    fn capture_then_restore_preserves_session() {
        let now = fixed_now() + Duration::seconds(200);
        let mut session = sample_session();
        session.start_rest(now, 120);

        let restored = SessionSnapshot::capture(&session, now).into_session().unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn serializes_with_camel_case_wire_names() {
        let snapshot = SessionSnapshot::capture(&sample_session(), fixed_now());
        let json = serde_json::to_value(&snapshot).unwrap();
        for key in [
            "workoutStartTime",
            "pausedTimeMs",
            "restStartTime",
            "restDurationSeconds",
            "isResting",
            "exercises",
            "sessionId",
            "pauseIntervals",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn legacy_payload_gets_stable_derived_id() {
        let raw = r#"{
            "workoutStartTime": "2023-11-14T22:13:20Z",
            "pausedTimeMs": 1500,
            "restStartTime": null,
            "restDurationSeconds": null,
            "isResting": false,
            "exercises": []
        }"#;
        let a: SessionSnapshot = serde_json::from_str(raw).unwrap();
        let b: SessionSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(a.rest_duration_seconds, DEFAULT_REST_SECONDS);
        assert_eq!(a.session_id(), b.session_id());
        assert_eq!(a.age(fixed_now() + Duration::minutes(5)), Duration::minutes(5));
    }

    #[test]
    fn recent_write_does_not_make_an_old_workout_young() {
        let session = sample_session();
        let later = fixed_now() + Duration::hours(3);
        let snapshot = SessionSnapshot::capture(&session, later);
        assert_eq!(snapshot.age(later), Duration::zero());
        assert_eq!(snapshot.time_since_start(later), Duration::hours(3));
    }

    #[test]
    fn normalized_ignores_write_time() {
        let session = sample_session();
        let a = SessionSnapshot::capture(&session, fixed_now());
        let b = SessionSnapshot::capture(&session, fixed_now() + Duration::seconds(30));
        assert_ne!(a, b);
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn elapsed_at_save_for_paused_snapshot_without_counter() {
        let t0 = fixed_now();
        let mut session = sample_session();
        session.pause(t0 + Duration::seconds(300), WearableMetrics::unknown());
        let mut snapshot = SessionSnapshot::capture(&session, t0 + Duration::seconds(900));
        assert_eq!(snapshot.elapsed_seconds, 300);
        snapshot.elapsed_seconds = 0;
        assert_eq!(snapshot.elapsed_at_save(), Duration::seconds(300));
    }

    #[test]
    fn local_entry_flattens_snapshot() {
        let snapshot = SessionSnapshot::capture(&sample_session(), fixed_now());
        let entry = LocalCacheEntry::new(snapshot, fixed_now());
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("workoutStartTime").is_some());
        assert_eq!(json["timestamp"], fixed_now().timestamp_millis());

        let back: LocalCacheEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
