use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::exercise::ExerciseEntry;
use crate::model::ids::SessionId;
use crate::model::session::Session;
use crate::wearable::WearableDelta;

/// Label used when a session was not built from a template or plan.
pub const FREESTYLE_LABEL: &str = "Freestyle";

/// Kind of finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Workout,
    Recovery,
}

impl SessionType {
    #[must_use]
    pub fn for_session(session: &Session) -> Self {
        if session.is_recovery_only() {
            Self::Recovery
        } else {
            Self::Workout
        }
    }
}

/// What the user reports when finishing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinishFeedback {
    pub perceived_effort: Option<u8>,
    pub mood_after: Option<String>,
    pub notes: Option<String>,
}

impl FinishFeedback {
    /// Effort on a 1-10 scale; out-of-range values are clamped.
    #[must_use]
    pub fn with_effort(mut self, effort: u8) -> Self {
        self.perceived_effort = Some(effort.clamp(1, 10));
        self
    }

    #[must_use]
    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.mood_after = Some(mood.into());
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        let notes = notes.into();
        self.notes = (!notes.trim().is_empty()).then_some(notes);
        self
    }
}

/// A finished workout as handed to the workout log.
///
/// Every exercise of the session is kept; only sets without weight, reps and
/// time are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutRecord {
    pub id: SessionId,
    pub date: DateTime<Utc>,
    pub duration_seconds: u64,
    pub template_name: String,
    pub session_type: SessionType,
    pub exercises: Vec<ExerciseEntry>,
    pub perceived_effort: Option<u8>,
    pub mood_after: Option<String>,
    pub notes: Option<String>,
    pub workout_calories_burned: Option<u64>,
    pub workout_steps: Option<u64>,
}

impl WorkoutRecord {
    #[must_use]
    pub fn from_session(
        session: &Session,
        ended_at: DateTime<Utc>,
        delta: WearableDelta,
        feedback: FinishFeedback,
    ) -> Self {
        let exercises = session
            .exercises()
            .iter()
            .map(|entry| ExerciseEntry {
                sets: entry.recorded_sets().cloned().collect(),
                ..entry.clone()
            })
            .collect();

        Self {
            id: session.id(),
            date: ended_at,
            duration_seconds: session.elapsed_seconds(ended_at),
            template_name: session.source_label().unwrap_or(FREESTYLE_LABEL).to_owned(),
            session_type: SessionType::for_session(session),
            exercises,
            perceived_effort: feedback.perceived_effort,
            mood_after: feedback.mood_after,
            notes: feedback.notes,
            workout_calories_burned: delta.rounded_calories(),
            workout_steps: delta.steps,
        }
    }

    #[must_use]
    pub fn recorded_set_count(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::exercise::{CatalogExercise, ExerciseCategory, SetField};
    use crate::model::metrics::WearableMetrics;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn keeps_exercises_without_valid_sets() {
        let t0 = fixed_now();
        let mut session = Session::start(SessionId::new_v4(), t0, WearableMetrics::unknown());
        let squat = session
            .add_exercise(&CatalogExercise::new("Squat", ExerciseCategory::Strength))
            .unwrap();
        session
            .add_exercise(&CatalogExercise::new("Row", ExerciseCategory::Cardio))
            .unwrap();
        session.update_set(squat, 1, SetField::Reps, "5").unwrap();
        session.update_set(squat, 2, SetField::Speed, "3").unwrap();

        let end = t0 + Duration::minutes(25);
        session.finish(end, WearableMetrics::unknown());
        let record = WorkoutRecord::from_session(&session, end, WearableDelta::default(), FinishFeedback::default());

        assert_eq!(record.exercises.len(), 2);
        assert_eq!(record.exercises[0].sets.len(), 1);
        assert_eq!(record.exercises[0].sets[0].reps, "5");
        assert!(record.exercises[1].sets.is_empty());
        assert_eq!(record.duration_seconds, 1_500);
        assert_eq!(record.template_name, FREESTYLE_LABEL);
        assert_eq!(record.session_type, SessionType::Workout);
        assert_eq!(record.workout_calories_burned, None);
    }

    #[test]
    fn recovery_only_sessions_are_typed_recovery() {
        let mut session = Session::start(SessionId::new_v4(), fixed_now(), WearableMetrics::unknown())
            .with_source_label("Mobility Flow");
        session
            .add_exercise(&CatalogExercise::new("Foam Roll", ExerciseCategory::Recovery))
            .unwrap();
        let record = WorkoutRecord::from_session(
            &session,
            fixed_now(),
            WearableDelta { calories: Some(12.4), steps: Some(40) },
            FinishFeedback::default().with_effort(14).with_notes("  "),
        );
        assert_eq!(record.session_type, SessionType::Recovery);
        assert_eq!(record.template_name, "Mobility Flow");
        assert_eq!(record.perceived_effort, Some(10));
        assert_eq!(record.notes, None);
        assert_eq!(record.workout_calories_burned, Some(12));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sessionType"], "recovery");
        assert_eq!(json["workoutSteps"], 40);
    }
}
