use serde::{Deserialize, Serialize};

use crate::model::ids::{ExerciseId, StackGroupId};

//
// ─── CATEGORY ──────────────────────────────────────────────────────────────────
//

/// Kind of exercise; decides default set count and which set fields count as work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExerciseCategory {
    #[default]
    Strength,
    Cardio,
    Recovery,
}

impl ExerciseCategory {
    /// Parse a free-form catalog label. Unknown labels fall back to `Strength`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "cardio" => Self::Cardio,
            "recovery" => Self::Recovery,
            _ => Self::Strength,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strength => "Strength",
            Self::Cardio => "Cardio",
            Self::Recovery => "Recovery",
        }
    }

    /// Number of empty sets an exercise starts with when added to a session.
    #[must_use]
    pub fn default_set_count(self) -> usize {
        match self {
            Self::Strength => 4,
            Self::Cardio | Self::Recovery => 1,
        }
    }
}

//
// ─── SETS ──────────────────────────────────────────────────────────────────────
//

/// Editable field of a set entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetField {
    Weight,
    Reps,
    Time,
    Speed,
    Incline,
}

/// One set as typed by the user. Values are free-form text; blank means unset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetEntry {
    pub weight: String,
    pub reps: String,
    pub time: String,
    pub speed: String,
    pub incline: String,
    /// Template target for timed work. Never counts as a recorded value.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub target_time: String,
}

fn filled(value: &str) -> bool {
    !value.trim().is_empty()
}

impl SetEntry {
    /// A set pre-filled with a planned rep count.
    #[must_use]
    pub fn with_reps(reps: impl Into<String>) -> Self {
        Self {
            reps: reps.into(),
            ..Self::default()
        }
    }

    /// A set carrying a target time without a recorded time.
    #[must_use]
    pub fn with_target_time(target: impl Into<String>) -> Self {
        Self {
            target_time: target.into(),
            ..Self::default()
        }
    }

    /// True when weight, reps and time are all blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !filled(&self.weight) && !filled(&self.reps) && !filled(&self.time)
    }

    /// True when the fields required by `category` are present.
    #[must_use]
    pub fn is_complete_for(&self, category: ExerciseCategory) -> bool {
        match category {
            ExerciseCategory::Strength => filled(&self.reps),
            ExerciseCategory::Cardio | ExerciseCategory::Recovery => filled(&self.time),
        }
    }

    /// Number of non-blank recorded fields.
    #[must_use]
    pub fn filled_fields(&self) -> usize {
        [
            &self.weight,
            &self.reps,
            &self.time,
            &self.speed,
            &self.incline,
        ]
        .into_iter()
        .filter(|v| filled(v))
        .count()
    }

    pub fn set_field(&mut self, field: SetField, value: impl Into<String>) {
        let value = value.into();
        match field {
            SetField::Weight => self.weight = value,
            SetField::Reps => self.reps = value,
            SetField::Time => self.time = value,
            SetField::Speed => self.speed = value,
            SetField::Incline => self.incline = value,
        }
    }

    /// Copy of this set used when the user adds another set below it.
    #[must_use]
    pub fn carry_forward(&self) -> Self {
        Self {
            target_time: String::new(),
            ..self.clone()
        }
    }
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

/// An exercise as known to the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogExercise {
    pub name: String,
    #[serde(default)]
    pub category: ExerciseCategory,
    #[serde(default)]
    pub body_part: String,
    #[serde(default)]
    pub equipment: String,
}

impl CatalogExercise {
    #[must_use]
    pub fn new(name: impl Into<String>, category: ExerciseCategory) -> Self {
        Self {
            name: name.into(),
            category,
            body_part: "Other".into(),
            equipment: String::new(),
        }
    }

    #[must_use]
    pub fn with_body_part(mut self, body_part: impl Into<String>) -> Self {
        self.body_part = body_part.into();
        self
    }
}

//
// ─── EXERCISE ENTRY ────────────────────────────────────────────────────────────
//

/// Exercise as performed inside a session, with its ordered sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseEntry {
    pub id: ExerciseId,
    pub name: String,
    #[serde(default)]
    pub category: ExerciseCategory,
    #[serde(default)]
    pub body_part: String,
    #[serde(default)]
    pub equipment: String,
    #[serde(default)]
    pub stacked: bool,
    #[serde(default)]
    pub stack_group: Option<StackGroupId>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub sets: Vec<SetEntry>,
}

impl ExerciseEntry {
    /// New entry with the category's default number of empty sets.
    #[must_use]
    pub fn from_catalog(id: ExerciseId, exercise: &CatalogExercise) -> Self {
        let sets = vec![SetEntry::default(); exercise.category.default_set_count()];
        Self::with_sets(id, exercise, sets)
    }

    #[must_use]
    pub fn with_sets(id: ExerciseId, exercise: &CatalogExercise, sets: Vec<SetEntry>) -> Self {
        Self {
            id,
            name: exercise.name.clone(),
            category: exercise.category,
            body_part: exercise.body_part.clone(),
            equipment: exercise.equipment.clone(),
            stacked: false,
            stack_group: None,
            completed: false,
            sets,
        }
    }

    #[must_use]
    pub fn in_stack(mut self, group: StackGroupId) -> Self {
        self.stacked = true;
        self.stack_group = Some(group);
        self
    }

    /// Group this entry belongs to, if it is stacked.
    #[must_use]
    pub fn group(&self) -> Option<StackGroupId> {
        if self.stacked { self.stack_group } else { None }
    }

    /// Sets that carry at least one recorded value.
    pub fn recorded_sets(&self) -> impl Iterator<Item = &SetEntry> {
        self.sets.iter().filter(|s| !s.is_empty())
    }

    /// Number of sets complete for this entry's category.
    #[must_use]
    pub fn completed_sets(&self) -> usize {
        self.sets
            .iter()
            .filter(|s| s.is_complete_for(self.category))
            .count()
    }
}

/// Total number of filled fields across all sets.
///
/// Higher means more logged work; used to decide whether in-memory entries may
/// be replaced by a stored copy.
#[must_use]
pub fn entry_score(exercises: &[ExerciseEntry]) -> usize {
    exercises
        .iter()
        .flat_map(|e| e.sets.iter())
        .map(SetEntry::filled_fields)
        .sum()
}

//
// ─── STACKS ────────────────────────────────────────────────────────────────────
//

/// Shape of a stack group by member count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    Superset,
    Circuit,
}

impl StackKind {
    /// `None` for groups with fewer than two members.
    #[must_use]
    pub fn for_size(members: usize) -> Option<Self> {
        match members {
            0 | 1 => None,
            2 => Some(Self::Superset),
            _ => Some(Self::Circuit),
        }
    }
}

/// Indices of the members of `group`, in list order.
#[must_use]
pub fn stack_members(exercises: &[ExerciseEntry], group: StackGroupId) -> Vec<usize> {
    exercises
        .iter()
        .enumerate()
        .filter(|(_, e)| e.group() == Some(group))
        .map(|(i, _)| i)
        .collect()
}

/// Exercise that should receive focus after `current` finishes a set.
///
/// Inside a stack this cycles round-robin over the group, skipping completed
/// members. When every member is completed, focus moves to the first entry
/// after the group's last member. Outside a stack it is simply the next entry.
#[must_use]
pub fn next_focus(exercises: &[ExerciseEntry], current: ExerciseId) -> Option<ExerciseId> {
    let idx = exercises.iter().position(|e| e.id == current)?;
    let Some(group) = exercises[idx].group() else {
        return exercises.get(idx + 1).map(|e| e.id);
    };

    let members = stack_members(exercises, group);
    if members.len() <= 1 {
        return exercises.get(idx + 1).map(|e| e.id);
    }

    let pos = members.iter().position(|&m| m == idx).unwrap_or(0);
    for step in 1..=members.len() {
        let candidate = &exercises[members[(pos + step) % members.len()]];
        if !candidate.completed {
            return Some(candidate.id);
        }
    }

    let last = members.last().copied().unwrap_or(idx);
    exercises.get(last + 1).map(|e| e.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, category: ExerciseCategory) -> ExerciseEntry {
        ExerciseEntry::from_catalog(
            ExerciseId::new(id),
            &CatalogExercise::new(format!("Ex {id}"), category),
        )
    }

    #[test]
    fn default_set_counts_follow_category() {
        assert_eq!(entry(1, ExerciseCategory::Strength).sets.len(), 4);
        assert_eq!(entry(2, ExerciseCategory::Cardio).sets.len(), 1);
        assert_eq!(entry(3, ExerciseCategory::Recovery).sets.len(), 1);
    }

    #[test]
    fn empty_set_ignores_speed_and_target() {
        let mut set = SetEntry::with_target_time("10:00");
        set.speed = "6.5".into();
        assert!(set.is_empty());
        set.set_field(SetField::Time, "9:41");
        assert!(!set.is_empty());
        assert!(set.is_complete_for(ExerciseCategory::Cardio));
        assert!(!set.is_complete_for(ExerciseCategory::Strength));
    }

    #[test]
    fn zero_is_a_recorded_value() {
        let mut set = SetEntry::default();
        set.set_field(SetField::Weight, "0");
        assert!(!set.is_empty());
    }

    #[test]
    fn carry_forward_drops_target() {
        let mut set = SetEntry::with_target_time("5:00");
        set.reps = "8".into();
        let next = set.carry_forward();
        assert_eq!(next.reps, "8");
        assert!(next.target_time.is_empty());
    }

    #[test]
    fn category_labels_are_case_insensitive() {
        assert_eq!(ExerciseCategory::from_label("CARDIO"), ExerciseCategory::Cardio);
        assert_eq!(ExerciseCategory::from_label(" recovery "), ExerciseCategory::Recovery);
        assert_eq!(ExerciseCategory::from_label("plyo"), ExerciseCategory::Strength);
    }

    #[test]
    fn stack_kind_by_size() {
        assert_eq!(StackKind::for_size(1), None);
        assert_eq!(StackKind::for_size(2), Some(StackKind::Superset));
        assert_eq!(StackKind::for_size(4), Some(StackKind::Circuit));
    }

    #[test]
    fn next_focus_cycles_through_stack_skipping_completed() {
        let group = StackGroupId::new(7);
        let mut list = vec![
            entry(1, ExerciseCategory::Strength).in_stack(group),
            entry(2, ExerciseCategory::Strength).in_stack(group),
            entry(3, ExerciseCategory::Strength).in_stack(group),
            entry(4, ExerciseCategory::Cardio),
        ];
        assert_eq!(next_focus(&list, ExerciseId::new(1)), Some(ExerciseId::new(2)));
        assert_eq!(next_focus(&list, ExerciseId::new(3)), Some(ExerciseId::new(1)));

        list[1].completed = true;
        assert_eq!(next_focus(&list, ExerciseId::new(1)), Some(ExerciseId::new(3)));

        for e in list.iter_mut().take(3) {
            e.completed = true;
        }
        assert_eq!(next_focus(&list, ExerciseId::new(2)), Some(ExerciseId::new(4)));
    }

    #[test]
    fn next_focus_outside_stack_is_sequential() {
        let list = vec![
            entry(1, ExerciseCategory::Strength),
            entry(2, ExerciseCategory::Strength),
        ];
        assert_eq!(next_focus(&list, ExerciseId::new(1)), Some(ExerciseId::new(2)));
        assert_eq!(next_focus(&list, ExerciseId::new(2)), None);
        assert_eq!(next_focus(&list, ExerciseId::new(9)), None);
    }

    #[test]
    fn entry_score_counts_filled_fields() {
        let mut list = vec![entry(1, ExerciseCategory::Strength)];
        assert_eq!(entry_score(&list), 0);
        list[0].sets[0].weight = "60".into();
        list[0].sets[0].reps = "5".into();
        list[0].sets[2].reps = "5".into();
        assert_eq!(entry_score(&list), 3);
    }
}
