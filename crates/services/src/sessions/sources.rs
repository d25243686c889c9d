use rand::rng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::{Deserialize, Serialize};

use workout_core::model::{
    CatalogExercise, ExerciseCategory, ExerciseEntry, ExerciseId, SetEntry,
};

/// Most body parts a generated workout covers.
const RANDOM_BODY_PARTS: usize = 5;
/// Sets per generated strength exercise.
const RANDOM_STRENGTH_SETS: usize = 4;
/// Sets per planned exercise when the plan does not say.
const PLANNED_DEFAULT_SETS: usize = 3;

pub const RANDOM_LABEL: &str = "Random Workout";
pub const PLANNED_LABEL: &str = "AI Workout";

/// One exercise of a saved template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateExercise {
    #[serde(flatten)]
    pub exercise: CatalogExercise,
    #[serde(default)]
    pub sets: Option<usize>,
    #[serde(default)]
    pub reps: Option<String>,
    /// Target duration for timed work.
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutTemplate {
    pub name: String,
    pub exercises: Vec<TemplateExercise>,
}

/// One exercise of an externally generated plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedExercise {
    pub name: String,
    #[serde(default)]
    pub body_part: Option<String>,
    #[serde(default)]
    pub sets: Option<usize>,
    #[serde(default)]
    pub reps: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedWorkout {
    #[serde(default)]
    pub name: Option<String>,
    pub exercises: Vec<PlannedExercise>,
}

/// Inputs for a generated workout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RandomWorkoutRequest {
    pub catalog: Vec<CatalogExercise>,
    /// Body parts to cover; empty means pick from the catalog.
    pub body_parts: Vec<String>,
}

/// Where a brand-new session's exercises come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewWorkoutSource {
    Template(WorkoutTemplate),
    Random(RandomWorkoutRequest),
    Planned(PlannedWorkout),
}

impl NewWorkoutSource {
    /// Name copied into the finished workout.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Template(t) => t.name.clone(),
            Self::Random(_) => RANDOM_LABEL.to_owned(),
            Self::Planned(p) => p
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| PLANNED_LABEL.to_owned()),
        }
    }

    /// Materialize the exercise list, numbering entries from 1.
    #[must_use]
    pub fn build_exercises(&self) -> Vec<ExerciseEntry> {
        let exercises = match self {
            Self::Template(t) => t.exercises.iter().map(template_entry).collect(),
            Self::Random(req) => random_entries(req),
            Self::Planned(p) => p.exercises.iter().map(planned_entry).collect(),
        };
        exercises
            .into_iter()
            .zip(1_u64..)
            .map(|((exercise, sets), id)| ExerciseEntry::with_sets(ExerciseId::new(id), &exercise, sets))
            .collect()
    }
}

fn template_entry(item: &TemplateExercise) -> (CatalogExercise, Vec<SetEntry>) {
    let category = item.exercise.category;
    let count = item
        .sets
        .filter(|n| *n > 0)
        .unwrap_or_else(|| category.default_set_count());

    let set = match category {
        ExerciseCategory::Strength => item
            .reps
            .as_deref()
            .map(SetEntry::with_reps)
            .unwrap_or_default(),
        ExerciseCategory::Cardio | ExerciseCategory::Recovery => item
            .time
            .as_deref()
            .map(SetEntry::with_target_time)
            .unwrap_or_default(),
    };
    (item.exercise.clone(), vec![set; count])
}

fn planned_entry(item: &PlannedExercise) -> (CatalogExercise, Vec<SetEntry>) {
    let mut exercise = CatalogExercise::new(item.name.clone(), ExerciseCategory::Strength);
    if let Some(part) = item.body_part.as_deref().filter(|p| !p.trim().is_empty()) {
        exercise = exercise.with_body_part(part);
    }
    let count = item.sets.filter(|n| *n > 0).unwrap_or(PLANNED_DEFAULT_SETS);
    let set = item.reps.as_deref().map(SetEntry::with_reps).unwrap_or_default();
    (exercise, vec![set; count])
}

fn random_entries(req: &RandomWorkoutRequest) -> Vec<(CatalogExercise, Vec<SetEntry>)> {
    let mut rng = rng();
    let strength: Vec<&CatalogExercise> = req
        .catalog
        .iter()
        .filter(|e| e.category == ExerciseCategory::Strength)
        .collect();

    let mut parts: Vec<String> = if req.body_parts.is_empty() {
        let mut all: Vec<String> = strength.iter().map(|e| e.body_part.clone()).collect();
        all.sort();
        all.dedup();
        all
    } else {
        req.body_parts.clone()
    };
    parts.shuffle(&mut rng);
    parts.truncate(RANDOM_BODY_PARTS);

    let mut out = Vec::with_capacity(parts.len() + 1);
    for part in &parts {
        let candidates: Vec<&&CatalogExercise> = strength
            .iter()
            .filter(|e| e.body_part.eq_ignore_ascii_case(part))
            .collect();
        if let Some(pick) = candidates.choose(&mut rng) {
            out.push(((**pick).clone(), vec![SetEntry::default(); RANDOM_STRENGTH_SETS]));
        }
    }

    let cardio: Vec<&CatalogExercise> = req
        .catalog
        .iter()
        .filter(|e| e.category == ExerciseCategory::Cardio)
        .collect();
    if let Some(pick) = cardio.choose(&mut rng) {
        out.push(((*pick).clone(), vec![SetEntry::default()]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<CatalogExercise> {
        let mut list = Vec::new();
        for part in ["Chest", "Back", "Legs", "Shoulders", "Arms", "Core", "Glutes"] {
            list.push(CatalogExercise::new(format!("{part} A"), ExerciseCategory::Strength).with_body_part(part));
            list.push(CatalogExercise::new(format!("{part} B"), ExerciseCategory::Strength).with_body_part(part));
        }
        list.push(CatalogExercise::new("Treadmill", ExerciseCategory::Cardio).with_body_part("Cardio"));
        list
    }

    #[test]
    fn template_uses_category_defaults_and_targets() {
        let source = NewWorkoutSource::Template(WorkoutTemplate {
            name: "Push Day".into(),
            exercises: vec![
                TemplateExercise {
                    exercise: CatalogExercise::new("Bench", ExerciseCategory::Strength),
                    sets: None,
                    reps: Some("8".into()),
                    time: None,
                },
                TemplateExercise {
                    exercise: CatalogExercise::new("Bike", ExerciseCategory::Cardio),
                    sets: None,
                    reps: None,
                    time: Some("20:00".into()),
                },
            ],
        });
        let entries = source.build_exercises();
        assert_eq!(source.label(), "Push Day");
        assert_eq!(entries[0].sets.len(), 4);
        assert_eq!(entries[0].sets[0].reps, "8");
        assert_eq!(entries[1].sets.len(), 1);
        assert_eq!(entries[1].sets[0].target_time, "20:00");
        assert!(entries[1].sets[0].is_empty());
        assert_eq!(entries[1].id, ExerciseId::new(2));
    }

    #[test]
    fn random_workout_covers_at_most_five_parts_plus_cardio() {
        let source = NewWorkoutSource::Random(RandomWorkoutRequest {
            catalog: catalog(),
            body_parts: Vec::new(),
        });
        let entries = source.build_exercises();
        assert_eq!(entries.len(), RANDOM_BODY_PARTS + 1);
        let strength: Vec<_> = entries
            .iter()
            .filter(|e| e.category == ExerciseCategory::Strength)
            .collect();
        assert!(strength.iter().all(|e| e.sets.len() == RANDOM_STRENGTH_SETS));
        let mut parts: Vec<_> = strength.iter().map(|e| e.body_part.clone()).collect();
        parts.sort();
        parts.dedup();
        assert_eq!(parts.len(), RANDOM_BODY_PARTS);
        assert_eq!(entries.last().unwrap().name, "Treadmill");
    }

    #[test]
    fn random_workout_skips_parts_without_exercises() {
        let source = NewWorkoutSource::Random(RandomWorkoutRequest {
            catalog: catalog(),
            body_parts: vec!["Chest".into(), "Neck".into()],
        });
        let entries = source.build_exercises();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].body_part, "Chest");
    }

    #[test]
    fn planned_workout_defaults_to_three_strength_sets() {
        let source = NewWorkoutSource::Planned(PlannedWorkout {
            name: None,
            exercises: vec![PlannedExercise {
                name: "Goblet Squat".into(),
                body_part: Some("Legs".into()),
                sets: None,
                reps: Some("10".into()),
            }],
        });
        let entries = source.build_exercises();
        assert_eq!(source.label(), PLANNED_LABEL);
        assert_eq!(entries[0].category, ExerciseCategory::Strength);
        assert_eq!(entries[0].sets.len(), 3);
        assert_eq!(entries[0].body_part, "Legs");
    }
}
