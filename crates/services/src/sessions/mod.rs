mod engine;
mod finalize;
mod persistence;
mod recovery;
mod sources;

use storage::repository::StorageError;
use tracing::{debug, warn};
use workout_core::model::UserId;

// Public API of the session subsystem.
pub use engine::{StoredSessions, WorkoutEngine, WorkoutServices};
pub use finalize::{FinishReport, WorkoutFeed};
pub use persistence::{
    ClearReport, FlushReport, FlushTrigger, ForegroundSync, PersistenceCoordinator, TierOutcome,
};
pub use recovery::{
    FixedChoice, RecoveryChoice, RecoveryOrigin, RecoveryOutcome, RecoveryPrompt, RecoveryPrompter,
    RecoveryRequest, StoredTier,
};
pub use sources::{
    NewWorkoutSource, PLANNED_LABEL, PlannedExercise, PlannedWorkout, RANDOM_LABEL,
    RandomWorkoutRequest, TemplateExercise, WorkoutTemplate,
};

/// Log a failed store call. A missing table or column means the backend is
/// not migrated for that feature yet and is only worth a debug line.
pub(crate) fn report_store_error(operation: &str, user: &UserId, err: &StorageError) {
    if err.is_missing_schema() {
        debug!(user_id = %user, operation, reason = %err, "store not provisioned");
    } else {
        warn!(user_id = %user, operation, reason = %err, "store call failed");
    }
}
