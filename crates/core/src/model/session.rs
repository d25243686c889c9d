use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::exercise::{
    CatalogExercise, ExerciseCategory, ExerciseEntry, SetField, StackKind, next_focus,
    stack_members,
};
use crate::model::ids::{ExerciseId, SessionId, StackGroupId};
use crate::model::metrics::{PauseInterval, WearableMetrics};
use crate::time::millis_between;
use crate::timer::{RestTimer, TickReport, elapsed_millis};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session is {0:?} and can no longer be edited")]
    Closed(SessionPhase),

    #[error("exercise {0} is not part of this session")]
    UnknownExercise(ExerciseId),

    #[error("exercise {exercise} has no set at index {index}")]
    SetOutOfRange { exercise: ExerciseId, index: usize },

    #[error("stack group {0} has no members")]
    UnknownStackGroup(StackGroupId),

    #[error("invalid persisted session: {0}")]
    InvalidPersistedState(String),
}

//
// ─── STATE MACHINE ─────────────────────────────────────────────────────────────
//

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Running,
    Paused,
    Finished,
    Cancelled,
}

impl SessionPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

/// Result of requesting a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The request is not a valid transition from the current phase.
    Ignored,
}

impl Transition {
    #[must_use]
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Counts shown next to the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    pub exercises: usize,
    pub total_sets: usize,
    pub recorded_sets: usize,
    pub completed_sets: usize,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Persisted fields needed to rebuild a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParts {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub accumulated_pause_ms: u64,
    pub exercises: Vec<ExerciseEntry>,
    pub rest_timer: Option<RestTimer>,
    pub is_paused: bool,
    pub wearable_at_start: WearableMetrics,
    pub pause_intervals: Vec<PauseInterval>,
    pub source_label: Option<String>,
}

/// One in-progress workout.
///
/// Elapsed time is always derived from `started_at` and
/// `accumulated_pause_ms`; nothing here counts ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: SessionId,
    started_at: DateTime<Utc>,
    accumulated_pause_ms: u64,
    exercises: Vec<ExerciseEntry>,
    rest_timer: Option<RestTimer>,
    phase: SessionPhase,
    wearable_at_start: WearableMetrics,
    pause_intervals: Vec<PauseInterval>,
    source_label: Option<String>,
    ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Brand-new running session with no exercises.
    #[must_use]
    pub fn start(id: SessionId, started_at: DateTime<Utc>, wearable_at_start: WearableMetrics) -> Self {
        Self {
            id,
            started_at,
            accumulated_pause_ms: 0,
            exercises: Vec::new(),
            rest_timer: None,
            phase: SessionPhase::Running,
            wearable_at_start,
            pause_intervals: Vec::new(),
            source_label: None,
            ended_at: None,
        }
    }

    #[must_use]
    pub fn with_exercises(mut self, exercises: Vec<ExerciseEntry>) -> Self {
        self.exercises = exercises;
        self
    }

    #[must_use]
    pub fn with_source_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = Some(label.into());
        self
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidPersistedState` when more than one pause
    /// interval is open, or when the paused flag disagrees with the intervals.
    pub fn from_parts(parts: SessionParts) -> Result<Self, SessionError> {
        let open = parts.pause_intervals.iter().filter(|p| p.is_open()).count();
        if open > 1 {
            return Err(SessionError::InvalidPersistedState(format!(
                "{open} open pause intervals"
            )));
        }
        if open == 1 && !parts.pause_intervals.last().is_some_and(PauseInterval::is_open) {
            return Err(SessionError::InvalidPersistedState(
                "open pause interval is not the most recent".into(),
            ));
        }
        if parts.is_paused != (open == 1) {
            return Err(SessionError::InvalidPersistedState(
                "paused flag does not match pause intervals".into(),
            ));
        }

        Ok(Self {
            id: parts.id,
            started_at: parts.started_at,
            accumulated_pause_ms: parts.accumulated_pause_ms,
            exercises: parts.exercises,
            rest_timer: parts.rest_timer,
            phase: if parts.is_paused {
                SessionPhase::Paused
            } else {
                SessionPhase::Running
            },
            wearable_at_start: parts.wearable_at_start,
            pause_intervals: parts.pause_intervals,
            source_label: parts.source_label,
            ended_at: None,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn accumulated_pause_ms(&self) -> u64 {
        self.accumulated_pause_ms
    }

    #[must_use]
    pub fn exercises(&self) -> &[ExerciseEntry] {
        &self.exercises
    }

    #[must_use]
    pub fn rest_timer(&self) -> Option<RestTimer> {
        self.rest_timer
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.phase == SessionPhase::Paused
    }

    #[must_use]
    pub fn is_resting(&self) -> bool {
        self.rest_timer.is_some()
    }

    #[must_use]
    pub fn wearable_at_start(&self) -> WearableMetrics {
        self.wearable_at_start
    }

    #[must_use]
    pub fn pause_intervals(&self) -> &[PauseInterval] {
        &self.pause_intervals
    }

    #[must_use]
    pub fn source_label(&self) -> Option<&str> {
        self.source_label.as_deref()
    }

    #[must_use]
    pub fn has_exercises(&self) -> bool {
        !self.exercises.is_empty()
    }

    /// True when any set carries a recorded value.
    #[must_use]
    pub fn has_progress(&self) -> bool {
        self.exercises.iter().any(|e| e.recorded_sets().next().is_some())
    }

    /// A session made only of recovery work is a recovery session.
    #[must_use]
    pub fn is_recovery_only(&self) -> bool {
        !self.exercises.is_empty()
            && self
                .exercises
                .iter()
                .all(|e| e.category == ExerciseCategory::Recovery)
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            exercises: self.exercises.len(),
            total_sets: self.exercises.iter().map(|e| e.sets.len()).sum(),
            recorded_sets: self.exercises.iter().map(|e| e.recorded_sets().count()).sum(),
            completed_sets: self.exercises.iter().map(ExerciseEntry::completed_sets).sum(),
        }
    }

    //
    // ─── TIMING ────────────────────────────────────────────────────────────────
    //

    fn open_interval(&self) -> Option<&PauseInterval> {
        self.pause_intervals.last().filter(|p| p.is_open())
    }

    /// Instant at which elapsed time stopped advancing, if it has.
    #[must_use]
    pub fn frozen_at(&self) -> Option<DateTime<Utc>> {
        match self.phase {
            SessionPhase::Running => None,
            SessionPhase::Paused => self.open_interval().map(|p| p.paused_at),
            SessionPhase::Finished | SessionPhase::Cancelled => self.ended_at,
        }
    }

    #[must_use]
    pub fn elapsed_millis(&self, now: DateTime<Utc>) -> u64 {
        elapsed_millis(self.started_at, self.accumulated_pause_ms, self.frozen_at(), now)
    }

    #[must_use]
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.elapsed_millis(now) / 1000
    }

    #[must_use]
    pub fn rest_remaining(&self, now: DateTime<Utc>) -> Option<u32> {
        self.rest_timer.map(|r| r.remaining_seconds(now))
    }

    /// Refresh both timers. Clears the rest timer on the tick that sees it
    /// reach zero and reports that exactly once.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut rest_finished = false;
        let rest_remaining = match self.rest_timer {
            Some(rest) if rest.is_expired(now) => {
                self.rest_timer = None;
                rest_finished = true;
                None
            }
            Some(rest) => Some(rest.remaining_seconds(now)),
            None => None,
        };
        TickReport {
            elapsed_seconds: self.elapsed_seconds(now),
            rest_remaining,
            rest_finished,
        }
    }

    /// Start (or restart) the rest countdown. Only a running session rests.
    pub fn start_rest(&mut self, now: DateTime<Utc>, duration_seconds: u32) -> Transition {
        if self.phase != SessionPhase::Running || duration_seconds == 0 {
            return Transition::Ignored;
        }
        self.rest_timer = Some(RestTimer::new(now, duration_seconds));
        Transition::Applied
    }

    /// Drop the rest countdown without signalling completion.
    pub fn skip_rest(&mut self) -> Transition {
        if self.rest_timer.take().is_some() {
            Transition::Applied
        } else {
            Transition::Ignored
        }
    }

    //
    // ─── TRANSITIONS ───────────────────────────────────────────────────────────
    //

    /// `Running → Paused`: opens a pause interval with the given metrics and
    /// drops any rest countdown.
    pub fn pause(&mut self, now: DateTime<Utc>, metrics: WearableMetrics) -> Transition {
        if self.phase != SessionPhase::Running {
            return Transition::Ignored;
        }
        self.rest_timer = None;
        self.pause_intervals.push(PauseInterval::open(now, metrics));
        self.phase = SessionPhase::Paused;
        Transition::Applied
    }

    /// `Paused → Running`: closes the open interval and adds its length to
    /// the accumulated pause time.
    pub fn resume(&mut self, now: DateTime<Utc>, metrics: WearableMetrics) -> Transition {
        if self.phase != SessionPhase::Paused {
            return Transition::Ignored;
        }
        if let Some(open) = self.pause_intervals.last_mut().filter(|p| p.is_open()) {
            let paused_for = millis_between(open.paused_at, now);
            open.close(now, metrics);
            self.accumulated_pause_ms = self.accumulated_pause_ms.saturating_add(paused_for);
        }
        self.phase = SessionPhase::Running;
        Transition::Applied
    }

    /// Finish the session.
    ///
    /// When finishing while paused the open interval is closed with the
    /// end-of-session metrics for accounting only: elapsed time stays frozen at
    /// the moment of the pause and the accumulated pause time is untouched.
    pub fn finish(&mut self, now: DateTime<Utc>, end_metrics: WearableMetrics) -> Transition {
        if self.phase.is_terminal() {
            return Transition::Ignored;
        }
        self.ended_at = Some(self.frozen_at().unwrap_or(now));
        if let Some(open) = self.pause_intervals.last_mut().filter(|p| p.is_open()) {
            open.close(now, end_metrics);
        }
        self.rest_timer = None;
        self.phase = SessionPhase::Finished;
        Transition::Applied
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Transition {
        if self.phase.is_terminal() {
            return Transition::Ignored;
        }
        self.ended_at = Some(self.frozen_at().unwrap_or(now));
        self.rest_timer = None;
        self.phase = SessionPhase::Cancelled;
        Transition::Applied
    }

    /// Continue a session that was parked in the paused store.
    ///
    /// The pause window ends here: the accumulated pause time is reset to zero
    /// and `started_at` is rebased so that elapsed time continues from
    /// `elapsed_at_pause`. The open pause interval, if any, is closed with the
    /// metrics read now so wearable accounting still excludes the break.
    pub fn resume_parked(
        &mut self,
        now: DateTime<Utc>,
        metrics: WearableMetrics,
        elapsed_at_pause: Duration,
    ) -> Transition {
        if self.phase.is_terminal() {
            return Transition::Ignored;
        }
        if let Some(open) = self.pause_intervals.last_mut().filter(|p| p.is_open()) {
            open.close(now, metrics);
        }
        self.started_at = now - elapsed_at_pause;
        self.accumulated_pause_ms = 0;
        self.phase = SessionPhase::Running;
        Transition::Applied
    }

    /// Take timing from an authoritative copy of this session.
    ///
    /// The accumulated pause time never decreases, so a stale copy cannot roll
    /// it back.
    pub fn adopt_timing(&mut self, started_at: DateTime<Utc>, accumulated_pause_ms: u64) {
        self.started_at = started_at;
        self.accumulated_pause_ms = self.accumulated_pause_ms.max(accumulated_pause_ms);
    }

    //
    // ─── EXERCISE EDITS ────────────────────────────────────────────────────────
    //

    fn ensure_editable(&self) -> Result<(), SessionError> {
        if self.phase.is_terminal() {
            Err(SessionError::Closed(self.phase))
        } else {
            Ok(())
        }
    }

    fn index_of(&self, id: ExerciseId) -> Result<usize, SessionError> {
        self.exercises
            .iter()
            .position(|e| e.id == id)
            .ok_or(SessionError::UnknownExercise(id))
    }

    fn entry_mut(&mut self, id: ExerciseId) -> Result<&mut ExerciseEntry, SessionError> {
        self.ensure_editable()?;
        let idx = self.index_of(id)?;
        Ok(&mut self.exercises[idx])
    }

    #[must_use]
    pub fn exercise(&self, id: ExerciseId) -> Option<&ExerciseEntry> {
        self.exercises.iter().find(|e| e.id == id)
    }

    fn next_exercise_id(&self) -> ExerciseId {
        let max = self.exercises.iter().map(|e| e.id.value()).max().unwrap_or(0);
        ExerciseId::new(max + 1)
    }

    fn next_stack_group(&self) -> StackGroupId {
        let max = self
            .exercises
            .iter()
            .filter_map(|e| e.stack_group)
            .map(|g| g.value())
            .max()
            .unwrap_or(0);
        StackGroupId::new(max + 1)
    }

    /// Append an exercise with its category's default sets.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` once the session has ended.
    pub fn add_exercise(&mut self, exercise: &CatalogExercise) -> Result<ExerciseId, SessionError> {
        self.ensure_editable()?;
        let id = self.next_exercise_id();
        self.exercises.push(ExerciseEntry::from_catalog(id, exercise));
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `SessionError::UnknownExercise` if `id` is not in the session.
    pub fn remove_exercise(&mut self, id: ExerciseId) -> Result<ExerciseEntry, SessionError> {
        self.ensure_editable()?;
        let idx = self.index_of(id)?;
        Ok(self.exercises.remove(idx))
    }

    /// Swap an exercise with its neighbour. Returns `false` at the list edges.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownExercise` if `id` is not in the session.
    pub fn move_exercise(&mut self, id: ExerciseId, direction: MoveDirection) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        let idx = self.index_of(id)?;
        let target = match direction {
            MoveDirection::Up if idx > 0 => idx - 1,
            MoveDirection::Down if idx + 1 < self.exercises.len() => idx + 1,
            _ => return Ok(false),
        };
        self.exercises.swap(idx, target);
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns `SessionError::SetOutOfRange` if the set index does not exist.
    pub fn update_set(
        &mut self,
        id: ExerciseId,
        index: usize,
        field: SetField,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        let entry = self.entry_mut(id)?;
        let set = entry
            .sets
            .get_mut(index)
            .ok_or(SessionError::SetOutOfRange { exercise: id, index })?;
        set.set_field(field, value);
        Ok(())
    }

    /// Append a set copying the previous set's values. Returns the new set count.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownExercise` if `id` is not in the session.
    pub fn add_set(&mut self, id: ExerciseId) -> Result<usize, SessionError> {
        let entry = self.entry_mut(id)?;
        let next = entry.sets.last().map(|s| s.carry_forward()).unwrap_or_default();
        entry.sets.push(next);
        Ok(entry.sets.len())
    }

    /// Drop the last set, keeping at least one. Returns whether a set was removed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownExercise` if `id` is not in the session.
    pub fn remove_last_set(&mut self, id: ExerciseId) -> Result<bool, SessionError> {
        let entry = self.entry_mut(id)?;
        if entry.sets.len() <= 1 {
            return Ok(false);
        }
        entry.sets.pop();
        Ok(true)
    }

    /// Mark an exercise done and return the exercise that should get focus next.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownExercise` if `id` is not in the session.
    pub fn complete_exercise(&mut self, id: ExerciseId) -> Result<Option<ExerciseId>, SessionError> {
        self.entry_mut(id)?.completed = true;
        Ok(next_focus(&self.exercises, id))
    }

    #[must_use]
    pub fn next_in_stack(&self, id: ExerciseId) -> Option<ExerciseId> {
        next_focus(&self.exercises, id)
    }

    /// Stack an unstacked exercise into a new group, or unstack a stacked one.
    /// Returns the new group when one was created.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownExercise` if `id` is not in the session.
    pub fn toggle_stack(&mut self, id: ExerciseId) -> Result<Option<StackGroupId>, SessionError> {
        let group = self.next_stack_group();
        let entry = self.entry_mut(id)?;
        if entry.stacked {
            entry.stacked = false;
            entry.stack_group = None;
            return Ok(None);
        }
        entry.stacked = true;
        entry.stack_group = Some(group);
        Ok(Some(group))
    }

    /// Join an existing group. Returns the group's shape after joining.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownStackGroup` if the group has no members.
    pub fn add_to_stack(
        &mut self,
        id: ExerciseId,
        group: StackGroupId,
    ) -> Result<Option<StackKind>, SessionError> {
        if stack_members(&self.exercises, group).is_empty() {
            return Err(SessionError::UnknownStackGroup(group));
        }
        let entry = self.entry_mut(id)?;
        entry.stacked = true;
        entry.stack_group = Some(group);
        Ok(StackKind::for_size(stack_members(&self.exercises, group).len()))
    }

    /// # Errors
    ///
    /// Returns `SessionError::UnknownExercise` if `id` is not in the session.
    pub fn remove_from_stack(&mut self, id: ExerciseId) -> Result<(), SessionError> {
        let entry = self.entry_mut(id)?;
        entry.stacked = false;
        entry.stack_group = None;
        Ok(())
    }

    /// Dissolve a group. Returns how many exercises were released.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownStackGroup` if the group has no members.
    pub fn unstack_group(&mut self, group: StackGroupId) -> Result<usize, SessionError> {
        self.ensure_editable()?;
        let members = stack_members(&self.exercises, group);
        if members.is_empty() {
            return Err(SessionError::UnknownStackGroup(group));
        }
        for idx in &members {
            let entry = &mut self.exercises[*idx];
            entry.stacked = false;
            entry.stack_group = None;
        }
        Ok(members.len())
    }

    /// Replace the exercise list with a stored copy.
    pub fn replace_exercises(&mut self, exercises: Vec<ExerciseEntry>) {
        if !self.phase.is_terminal() {
            self.exercises = exercises;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn bench() -> CatalogExercise {
        CatalogExercise::new("Bench Press", ExerciseCategory::Strength).with_body_part("Chest")
    }

    fn new_session() -> Session {
        Session::start(SessionId::new_v4(), fixed_now(), WearableMetrics::new(Some(80.0), Some(1_000)))
    }

    #[test]
    fn pause_and_resume_accumulate_pause_time() {
        let t0 = fixed_now();
        let mut session = new_session();

        assert!(session.pause(t0 + Duration::seconds(120), WearableMetrics::unknown()).is_applied());
        assert_eq!(session.elapsed_seconds(t0 + Duration::seconds(170)), 120);
        assert!(session.resume(t0 + Duration::seconds(180), WearableMetrics::unknown()).is_applied());

        assert_eq!(session.accumulated_pause_ms(), 60_000);
        assert_eq!(session.elapsed_seconds(t0 + Duration::seconds(180)), 120);
        assert_eq!(session.elapsed_seconds(t0 + Duration::seconds(600)), 540);
    }

    #[test]
    fn invalid_transitions_are_ignored() {
        let t0 = fixed_now();
        let mut session = new_session();
        assert_eq!(session.resume(t0, WearableMetrics::unknown()), Transition::Ignored);
        session.pause(t0, WearableMetrics::unknown());
        assert_eq!(session.pause(t0, WearableMetrics::unknown()), Transition::Ignored);
        assert_eq!(session.pause_intervals().len(), 1);
    }

    #[test]
    fn terminal_phases_reject_everything() {
        let t0 = fixed_now();
        let mut session = new_session();
        session.add_exercise(&bench()).unwrap();
        assert!(session.cancel(t0).is_applied());

        assert_eq!(session.pause(t0, WearableMetrics::unknown()), Transition::Ignored);
        assert_eq!(session.finish(t0, WearableMetrics::unknown()), Transition::Ignored);
        assert_eq!(session.start_rest(t0, 60), Transition::Ignored);
        assert_eq!(
            session.add_exercise(&bench()).unwrap_err(),
            SessionError::Closed(SessionPhase::Cancelled)
        );
    }

    #[test]
    fn finish_while_paused_closes_interval_without_moving_time() {
        let t0 = fixed_now();
        let mut session = new_session();
        session.pause(t0 + Duration::seconds(300), WearableMetrics::new(Some(150.0), None));
        let end = WearableMetrics::new(Some(200.0), None);
        session.finish(t0 + Duration::seconds(900), end);

        assert_eq!(session.phase(), SessionPhase::Finished);
        assert_eq!(session.accumulated_pause_ms(), 0);
        assert_eq!(session.elapsed_seconds(t0 + Duration::hours(2)), 300);
        let last = session.pause_intervals().last().unwrap();
        assert_eq!(last.resumed_at, Some(t0 + Duration::seconds(900)));
        assert_eq!(last.metrics_at_resume, Some(end));
    }

    #[test]
    fn rest_timer_fires_once() {
        let t0 = fixed_now();
        let mut session = new_session();
        session.start_rest(t0, 30);

        let first = session.tick(t0 + Duration::seconds(10));
        assert_eq!(first.rest_remaining, Some(20));
        assert!(!first.rest_finished);

        let done = session.tick(t0 + Duration::seconds(45));
        assert!(done.rest_finished);
        assert!(!session.is_resting());

        let after = session.tick(t0 + Duration::seconds(46));
        assert!(!after.rest_finished);
        assert_eq!(after.rest_remaining, None);
    }

    #[test]
    fn pausing_stops_the_rest_timer() {
        let t0 = fixed_now();
        let mut session = new_session();
        session.start_rest(t0, 30);
        session.pause(t0 + Duration::seconds(10), WearableMetrics::unknown());
        assert!(!session.is_resting());

        let report = session.tick(t0 + Duration::seconds(60));
        assert!(!report.rest_finished);
        assert_eq!(report.rest_remaining, None);
        assert_eq!(session.start_rest(t0 + Duration::seconds(61), 30), Transition::Ignored);

        session.resume(t0 + Duration::seconds(70), WearableMetrics::unknown());
        assert!(session.start_rest(t0 + Duration::seconds(71), 30).is_applied());
    }

    #[test]
    fn resume_parked_keeps_elapsed_continuous() {
        let t0 = fixed_now();
        let mut session = new_session();
        session.pause(t0 + Duration::seconds(400), WearableMetrics::unknown());

        let later = t0 + Duration::hours(1);
        session.resume_parked(later, WearableMetrics::unknown(), Duration::seconds(400));
        assert_eq!(session.accumulated_pause_ms(), 0);
        assert_eq!(session.elapsed_seconds(later), 400);
        assert!(session.pause_intervals().iter().all(|p| !p.is_open()));
    }

    #[test]
    fn adopt_timing_never_lowers_pause_time() {
        let t0 = fixed_now();
        let mut session = new_session();
        session.pause(t0, WearableMetrics::unknown());
        session.resume(t0 + Duration::seconds(30), WearableMetrics::unknown());
        session.adopt_timing(t0, 10_000);
        assert_eq!(session.accumulated_pause_ms(), 30_000);
        session.adopt_timing(t0, 45_000);
        assert_eq!(session.accumulated_pause_ms(), 45_000);
    }

    #[test]
    fn set_edits_and_bounds() {
        let mut session = new_session();
        let id = session.add_exercise(&bench()).unwrap();
        session.update_set(id, 0, SetField::Weight, "60").unwrap();
        session.update_set(id, 0, SetField::Reps, "8").unwrap();
        assert_eq!(session.add_set(id).unwrap(), 5);
        assert_eq!(session.exercise(id).unwrap().sets[4].reps, "8");

        let err = session.update_set(id, 9, SetField::Reps, "1").unwrap_err();
        assert_eq!(err, SessionError::SetOutOfRange { exercise: id, index: 9 });

        for _ in 0..10 {
            session.remove_last_set(id).unwrap();
        }
        assert_eq!(session.exercise(id).unwrap().sets.len(), 1);
    }

    #[test]
    fn move_exercise_respects_edges() {
        let mut session = new_session();
        let a = session.add_exercise(&bench()).unwrap();
        let b = session.add_exercise(&bench()).unwrap();
        assert!(!session.move_exercise(a, MoveDirection::Up).unwrap());
        assert!(session.move_exercise(a, MoveDirection::Down).unwrap());
        assert_eq!(session.exercises()[0].id, b);
    }

    #[test]
    fn stacking_builds_supersets_and_circuits() {
        let mut session = new_session();
        let a = session.add_exercise(&bench()).unwrap();
        let b = session.add_exercise(&bench()).unwrap();
        let c = session.add_exercise(&bench()).unwrap();

        let group = session.toggle_stack(a).unwrap().unwrap();
        assert_eq!(session.add_to_stack(b, group).unwrap(), Some(StackKind::Superset));
        assert_eq!(session.add_to_stack(c, group).unwrap(), Some(StackKind::Circuit));
        assert_eq!(session.next_in_stack(c), Some(a));

        assert_eq!(session.complete_exercise(a).unwrap(), Some(b));
        assert_eq!(session.unstack_group(group).unwrap(), 3);
        assert!(session.exercises().iter().all(|e| !e.stacked));
        assert_eq!(
            session.add_to_stack(a, group).unwrap_err(),
            SessionError::UnknownStackGroup(group)
        );
    }

    #[test]
    fn from_parts_rejects_inconsistent_pause_state() {
        let t0 = fixed_now();
        let parts = SessionParts {
            id: SessionId::new_v4(),
            started_at: t0,
            accumulated_pause_ms: 0,
            exercises: Vec::new(),
            rest_timer: None,
            is_paused: false,
            wearable_at_start: WearableMetrics::unknown(),
            pause_intervals: vec![PauseInterval::open(t0, WearableMetrics::unknown())],
            source_label: None,
        };
        assert!(matches!(
            Session::from_parts(parts.clone()),
            Err(SessionError::InvalidPersistedState(_))
        ));

        let paused = Session::from_parts(SessionParts { is_paused: true, ..parts }).unwrap();
        assert!(paused.is_paused());
    }
}
