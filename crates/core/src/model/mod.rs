mod exercise;
mod ids;
mod metrics;
mod session;
mod snapshot;
mod workout;

pub use ids::{ExerciseId, ParseIdError, SessionId, StackGroupId, UserId};

pub use exercise::{
    CatalogExercise, ExerciseCategory, ExerciseEntry, SetEntry, SetField, StackKind, entry_score,
    next_focus, stack_members,
};
pub use metrics::{PauseInterval, WearableMetrics};
pub use session::{
    MoveDirection, Session, SessionError, SessionParts, SessionPhase, SessionProgress, Transition,
};
pub use snapshot::{DEFAULT_REST_SECONDS, LocalCacheEntry, SessionSnapshot};
pub use workout::{FREESTYLE_LABEL, FinishFeedback, SessionType, WorkoutRecord};
