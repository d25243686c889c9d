use async_trait::async_trait;
use tracing::{error, info, warn};

use workout_core::model::{FinishFeedback, UserId, WorkoutRecord};
use workout_core::wearable::WearableDelta;

use super::engine::{WorkoutEngine, clear_paused};
use super::persistence::FlushTrigger;
use super::report_store_error;
use crate::error::FeedError;

/// Receives finished workouts for sharing once they are safely stored.
#[async_trait]
pub trait WorkoutFeed: Send + Sync {
    /// # Errors
    ///
    /// Returns `FeedError` if the workout could not be shared.
    async fn share(&self, user: &UserId, record: &WorkoutRecord) -> Result<(), FeedError>;
}

/// What happened to a finished workout.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishReport {
    pub record: WorkoutRecord,
    pub saved_remotely: bool,
    /// Attempts made against the workout log.
    pub attempts: u32,
    /// The record was kept in the outbox for a later retry.
    pub preserved_locally: bool,
    pub shared: bool,
    /// Message for the user when the workout was not saved normally.
    pub warning: Option<String>,
}

const OUTBOX_WARNING: &str =
    "Your workout could not be saved to your account. It is kept on this device and will be retried.";
const LOST_WARNING: &str =
    "Your workout could not be saved to your account or kept on this device.";

impl WorkoutEngine {
    /// Finish the workout and hand the record to the workout log.
    ///
    /// The final state is written once, every stored copy of the session is
    /// removed, then the record is saved with a bounded number of attempts.
    /// A record that cannot be saved is kept in the outbox.
    pub async fn finish(mut self, feedback: FinishFeedback) -> FinishReport {
        let end_metrics = self.services.wearable.current_metrics(&self.user).await;
        let now = self.now();
        self.session.finish(now, end_metrics);

        let delta = WearableDelta::compute(
            self.session.wearable_at_start(),
            end_metrics,
            self.session.pause_intervals(),
        );
        let record = WorkoutRecord::from_session(&self.session, now, delta, feedback);

        self.flush(FlushTrigger::Finalize, true).await;
        self.persistence.clear().await;
        clear_paused(&self.services.storage, &self.services.session_cache(), &self.user).await;

        if let Some(log) = &self.services.local_log {
            if let Err(e) = log.append_workout(&self.user, &record).await {
                warn!(user_id = %self.user, session_id = %record.id, reason = %e, "local history not updated");
            }
        }

        let (saved_remotely, attempts) = self.deliver(&record).await;
        let mut report = FinishReport {
            record,
            saved_remotely,
            attempts,
            preserved_locally: false,
            shared: false,
            warning: None,
        };

        if saved_remotely {
            info!(
                user_id = %self.user,
                session_id = %report.record.id,
                duration_secs = report.record.duration_seconds,
                sets = report.record.recorded_set_count(),
                "workout saved"
            );
            report.shared = self.share(&report.record).await;
            return report;
        }

        match self.services.outbox.push(&self.user, &report.record) {
            Ok(()) => {
                warn!(user_id = %self.user, session_id = %report.record.id, "workout kept in outbox");
                report.preserved_locally = true;
                report.warning = Some(OUTBOX_WARNING.to_owned());
            }
            Err(e) => {
                error!(user_id = %self.user, session_id = %report.record.id, reason = %e, "finished workout lost");
                report.warning = Some(LOST_WARNING.to_owned());
            }
        }
        report
    }

    async fn deliver(&self, record: &WorkoutRecord) -> (bool, u32) {
        let max_attempts = self.services.settings.finalize_attempts();
        let backoff = self.services.settings.finalize_backoff();
        for attempt in 1..=max_attempts {
            match self.services.storage.workouts.append_workout(&self.user, record).await {
                Ok(()) => return (true, attempt),
                Err(e) => {
                    report_store_error("save finished workout", &self.user, &e);
                    if attempt < max_attempts {
                        let wait = (backoff * i32::try_from(attempt).unwrap_or(i32::MAX))
                            .to_std()
                            .unwrap_or_default();
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }
        (false, max_attempts)
    }

    async fn share(&self, record: &WorkoutRecord) -> bool {
        let Some(feed) = &self.services.feed else {
            return false;
        };
        match feed.share(&self.user, record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = %self.user, session_id = %record.id, reason = %e, "workout not shared");
                false
            }
        }
    }
}
