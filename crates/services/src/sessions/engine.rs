use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use storage::local_cache::{CacheOutbox, CachedSession, RecoveryOutbox, SessionCache};
use storage::repository::{Storage, StorageError, WorkoutLogRepository};
use workout_core::model::{
    CatalogExercise, ExerciseId, LocalCacheEntry, MoveDirection, Session, SessionProgress,
    SessionSnapshot, SetField, StackGroupId, StackKind, Transition, UserId,
};
use workout_core::settings::EngineSettings;
use workout_core::timer::TickReport;

use super::finalize::WorkoutFeed;
use super::persistence::{ClearReport, FlushReport, FlushTrigger, ForegroundSync, PersistenceCoordinator};
use super::recovery::{Recovery, RecoveryOrigin, RecoveryPrompter, RecoveryRequest};
use super::report_store_error;
use crate::Clock;
use crate::error::EngineError;
use crate::wearables::{NoWearable, WearableSource};

//
// ─── SERVICES ──────────────────────────────────────────────────────────────────
//

/// Shared collaborators for workout sessions.
///
/// Cheap to clone; every engine opened from it keeps a clone.
#[derive(Clone)]
pub struct WorkoutServices {
    pub(crate) clock: Clock,
    pub(crate) settings: EngineSettings,
    pub(crate) storage: Storage,
    pub(crate) wearable: Arc<dyn WearableSource>,
    pub(crate) outbox: Arc<dyn RecoveryOutbox>,
    pub(crate) local_log: Option<Arc<dyn WorkoutLogRepository>>,
    pub(crate) feed: Option<Arc<dyn WorkoutFeed>>,
}

/// What is currently stored for a user, without touching any of it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSessions {
    pub remote_active: Option<SessionSnapshot>,
    pub remote_paused: Option<SessionSnapshot>,
    pub local_active: Option<LocalCacheEntry>,
    pub local_paused: Option<LocalCacheEntry>,
    /// Finished workouts waiting in the outbox.
    pub pending_workouts: usize,
}

impl WorkoutServices {
    #[must_use]
    pub fn new(clock: Clock, storage: Storage) -> Self {
        let outbox: Arc<dyn RecoveryOutbox> = Arc::new(CacheOutbox::new(Arc::clone(&storage.local)));
        Self {
            clock,
            settings: EngineSettings::defaults(),
            storage,
            wearable: Arc::new(NoWearable),
            outbox,
            local_log: None,
            feed: None,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_wearable(mut self, wearable: Arc<dyn WearableSource>) -> Self {
        self.wearable = wearable;
        self
    }

    #[must_use]
    pub fn with_outbox(mut self, outbox: Arc<dyn RecoveryOutbox>) -> Self {
        self.outbox = outbox;
        self
    }

    /// Also record finished workouts in a device-local history.
    #[must_use]
    pub fn with_local_log(mut self, log: Arc<dyn WorkoutLogRepository>) -> Self {
        self.local_log = Some(log);
        self
    }

    #[must_use]
    pub fn with_feed(mut self, feed: Arc<dyn WorkoutFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) fn session_cache(&self) -> SessionCache {
        SessionCache::new(Arc::clone(&self.storage.local))
    }

    /// Run recovery and return an engine owning the starting session.
    ///
    /// The starting session is written to both tiers before returning, so
    /// opening twice in a row resumes the same session.
    pub async fn open_session(
        &self,
        user: UserId,
        request: RecoveryRequest,
        prompter: &dyn RecoveryPrompter,
    ) -> WorkoutEngine {
        let now = self.clock.now();
        let cache = self.session_cache();
        let outcome = Recovery {
            user: &user,
            storage: &self.storage,
            cache: &cache,
            wearable: self.wearable.as_ref(),
            settings: &self.settings,
            now,
        }
        .run(request, prompter)
        .await;

        let persistence = PersistenceCoordinator::new(
            user.clone(),
            Arc::clone(&self.storage.active),
            cache,
            self.settings.clone(),
            now,
        );
        let mut engine = WorkoutEngine {
            user,
            session: outcome.session,
            origin: outcome.origin,
            persistence,
            services: self.clone(),
        };
        engine.flush(FlushTrigger::Recovery, true).await;
        engine
    }

    /// Inspect every tier for `user`.
    ///
    /// Unreadable tiers are logged and reported as empty.
    pub async fn peek(&self, user: &UserId) -> StoredSessions {
        let remote_active = self.storage.active.get_active(user).await.unwrap_or_else(|e| {
            report_store_error("read active session", user, &e);
            None
        });
        let remote_paused = self.storage.paused.get_paused(user).await.unwrap_or_else(|e| {
            report_store_error("read paused session", user, &e);
            None
        });
        let cache = self.session_cache();
        let pending_workouts = self.outbox.pending(user).map(|list| list.len()).unwrap_or_else(|e| {
            warn!(user_id = %user, reason = %e, "outbox unreadable");
            0
        });
        StoredSessions {
            remote_active,
            remote_paused,
            local_active: found_entry(cache.read_active(user)),
            local_paused: found_entry(cache.read_paused(user)),
            pending_workouts,
        }
    }

    /// Remove active and paused records for `user` from every tier.
    pub async fn discard_all(&self, user: &UserId) -> ClearReport {
        let mut persistence = PersistenceCoordinator::new(
            user.clone(),
            Arc::clone(&self.storage.active),
            self.session_cache(),
            self.settings.clone(),
            self.clock.now(),
        );
        let active = persistence.clear().await;
        let paused = clear_paused(&self.storage, &self.session_cache(), user).await;
        info!(user_id = %user, "discarded stored workouts");
        active.and(paused)
    }

    /// Try to deliver workouts left in the outbox by earlier failed finishes.
    ///
    /// Returns how many were delivered.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if the outbox cannot be read or updated.
    pub async fn retry_outbox(&self, user: &UserId) -> Result<usize, EngineError> {
        let mut delivered = 0;
        for record in self.outbox.pending(user)? {
            match self.storage.workouts.append_workout(user, &record).await {
                Ok(()) => {
                    self.outbox.remove(user, record.id)?;
                    delivered += 1;
                }
                Err(e) => {
                    report_store_error("deliver pending workout", user, &e);
                    break;
                }
            }
        }
        if delivered > 0 {
            info!(user_id = %user, delivered, "delivered pending workouts");
        }
        Ok(delivered)
    }
}

fn found_entry(read: Result<CachedSession, StorageError>) -> Option<LocalCacheEntry> {
    match read {
        Ok(CachedSession::Found(entry)) => Some(entry),
        Ok(CachedSession::Missing | CachedSession::Corrupt(_)) | Err(_) => None,
    }
}

pub(crate) async fn clear_paused(storage: &Storage, cache: &SessionCache, user: &UserId) -> ClearReport {
    let remote_cleared = match storage.paused.delete_paused(user).await {
        Ok(()) => true,
        Err(e) => {
            report_store_error("delete paused session", user, &e);
            false
        }
    };
    let local_cleared = match cache.remove_paused(user) {
        Ok(()) => true,
        Err(e) => {
            warn!(user_id = %user, reason = %e, "could not remove local paused workout");
            false
        }
    };
    ClearReport {
        remote_cleared,
        local_cleared,
    }
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Owns one in-progress workout for a user.
///
/// Every operation reads the clock once; store failures are logged and never
/// returned from routine operations.
pub struct WorkoutEngine {
    pub(crate) user: UserId,
    pub(crate) session: Session,
    pub(crate) origin: RecoveryOrigin,
    pub(crate) persistence: PersistenceCoordinator,
    pub(crate) services: WorkoutServices,
}

impl WorkoutEngine {
    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn origin(&self) -> RecoveryOrigin {
        self.origin
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        self.session.progress()
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> u64 {
        self.session.elapsed_seconds(self.now())
    }

    #[must_use]
    pub fn rest_remaining(&self) -> Option<u32> {
        self.session.rest_remaining(self.now())
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.services.clock.now()
    }

    pub(crate) async fn flush(&mut self, trigger: FlushTrigger, force: bool) -> FlushReport {
        let now = self.now();
        self.persistence.flush(&self.session, now, trigger, force).await
    }

    fn touched<T>(&mut self, result: T) -> T {
        let now = self.now();
        self.persistence.mark_dirty(now);
        result
    }

    //
    // ─── TIMERS ────────────────────────────────────────────────────────────────
    //

    /// Advance both timers and run any write that has come due.
    pub async fn tick(&mut self) -> TickReport {
        let now = self.now();
        let report = self.session.tick(now);
        if report.rest_finished {
            self.flush(FlushTrigger::Immediate, false).await;
        } else if let Some(trigger) = self.persistence.due(&self.session, now) {
            self.flush(trigger, false).await;
        }
        report
    }

    /// Start a rest countdown; `None` uses the configured default.
    pub async fn start_rest(&mut self, seconds: Option<u32>) -> Transition {
        let now = self.now();
        let seconds = seconds.unwrap_or_else(|| self.services.settings.default_rest_seconds());
        let transition = self.session.start_rest(now, seconds);
        if transition.is_applied() {
            self.flush(FlushTrigger::Immediate, false).await;
        }
        transition
    }

    pub async fn skip_rest(&mut self) -> Transition {
        let transition = self.session.skip_rest();
        if transition.is_applied() {
            self.flush(FlushTrigger::Immediate, false).await;
        }
        transition
    }

    //
    // ─── PAUSE / RESUME ────────────────────────────────────────────────────────
    //

    /// Pause the workout and park it in the paused store.
    ///
    /// When the paused store cannot be written the record goes to the local
    /// paused mirror instead.
    pub async fn pause(&mut self) -> Transition {
        let metrics = self.services.wearable.current_metrics(&self.user).await;
        let now = self.now();
        let transition = self.session.pause(now, metrics);
        if !transition.is_applied() {
            return transition;
        }

        let snapshot = SessionSnapshot::capture(&self.session, now);
        if let Err(e) = self.services.storage.paused.upsert_paused(&self.user, &snapshot).await {
            report_store_error("save paused session", &self.user, &e);
            let cache = self.services.session_cache();
            if let Err(e) = cache.write_paused(&self.user, &LocalCacheEntry::new(snapshot, now)) {
                warn!(user_id = %self.user, reason = %e, "could not keep paused workout on device");
            }
        }
        info!(user_id = %self.user, session_id = %self.session.id(), "workout paused");
        self.flush(FlushTrigger::Immediate, false).await;
        transition
    }

    pub async fn resume(&mut self) -> Transition {
        let metrics = self.services.wearable.current_metrics(&self.user).await;
        let now = self.now();
        let transition = self.session.resume(now, metrics);
        if !transition.is_applied() {
            return transition;
        }

        clear_paused(&self.services.storage, &self.services.session_cache(), &self.user).await;
        info!(
            user_id = %self.user,
            session_id = %self.session.id(),
            paused_ms = self.session.accumulated_pause_ms(),
            "workout resumed"
        );
        self.flush(FlushTrigger::Immediate, false).await;
        transition
    }

    //
    // ─── HOST LIFECYCLE ────────────────────────────────────────────────────────
    //

    /// The host is being hidden or suspended: write everything now.
    pub async fn on_background(&mut self) -> FlushReport {
        self.flush(FlushTrigger::Background, true).await
    }

    /// The host is visible again: take authoritative timing from the remote
    /// copy, or push the in-memory state when the remote copy is behind it.
    pub async fn on_foreground(&mut self) -> ForegroundSync {
        let sync = self.persistence.reconcile_foreground(&mut self.session).await;
        if sync == ForegroundSync::RemoteBehind {
            self.flush(FlushTrigger::Immediate, false).await;
        }
        sync
    }

    /// Abandon the workout and remove it from every tier.
    pub async fn cancel(mut self) -> ClearReport {
        let now = self.now();
        self.session.cancel(now);
        let active = self.persistence.clear().await;
        let paused = clear_paused(&self.services.storage, &self.services.session_cache(), &self.user).await;
        info!(user_id = %self.user, session_id = %self.session.id(), "workout cancelled");
        active.and(paused)
    }

    //
    // ─── EDITS ─────────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `EngineError::Session` if the session is closed.
    pub fn add_exercise(&mut self, exercise: &CatalogExercise) -> Result<ExerciseId, EngineError> {
        let id = self.session.add_exercise(exercise)?;
        Ok(self.touched(id))
    }

    /// # Errors
    ///
    /// Returns `EngineError::Session` if the exercise does not exist or the
    /// session is closed.
    pub fn remove_exercise(&mut self, id: ExerciseId) -> Result<(), EngineError> {
        self.session.remove_exercise(id)?;
        self.touched(());
        Ok(())
    }

    /// Returns whether the exercise moved.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Session` if the exercise does not exist or the
    /// session is closed.
    pub fn move_exercise(&mut self, id: ExerciseId, direction: MoveDirection) -> Result<bool, EngineError> {
        let moved = self.session.move_exercise(id, direction)?;
        if moved {
            self.touched(());
        }
        Ok(moved)
    }

    /// # Errors
    ///
    /// Returns `EngineError::Session` if the exercise or set does not exist or
    /// the session is closed.
    pub fn update_set(
        &mut self,
        id: ExerciseId,
        index: usize,
        field: SetField,
        value: impl Into<String>,
    ) -> Result<(), EngineError> {
        self.session.update_set(id, index, field, value)?;
        self.touched(());
        Ok(())
    }

    /// Append a set prefilled from the previous one; returns the new set count.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Session` if the exercise does not exist or the
    /// session is closed.
    pub fn add_set(&mut self, id: ExerciseId) -> Result<usize, EngineError> {
        let count = self.session.add_set(id)?;
        Ok(self.touched(count))
    }

    /// # Errors
    ///
    /// Returns `EngineError::Session` if the exercise does not exist or the
    /// session is closed.
    pub fn remove_last_set(&mut self, id: ExerciseId) -> Result<bool, EngineError> {
        let removed = self.session.remove_last_set(id)?;
        if removed {
            self.touched(());
        }
        Ok(removed)
    }

    /// Mark an exercise done; returns the exercise that should get focus next.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Session` if the exercise does not exist or the
    /// session is closed.
    pub fn complete_exercise(&mut self, id: ExerciseId) -> Result<Option<ExerciseId>, EngineError> {
        let next = self.session.complete_exercise(id)?;
        Ok(self.touched(next))
    }

    #[must_use]
    pub fn next_in_stack(&self, id: ExerciseId) -> Option<ExerciseId> {
        self.session.next_in_stack(id)
    }

    /// # Errors
    ///
    /// Returns `EngineError::Session` if the exercise does not exist or the
    /// session is closed.
    pub fn toggle_stack(&mut self, id: ExerciseId) -> Result<Option<StackGroupId>, EngineError> {
        let group = self.session.toggle_stack(id)?;
        Ok(self.touched(group))
    }

    /// # Errors
    ///
    /// Returns `EngineError::Session` if the exercise or group does not exist
    /// or the session is closed.
    pub fn add_to_stack(&mut self, id: ExerciseId, group: StackGroupId) -> Result<Option<StackKind>, EngineError> {
        let kind = self.session.add_to_stack(id, group)?;
        Ok(self.touched(kind))
    }

    /// # Errors
    ///
    /// Returns `EngineError::Session` if the exercise does not exist or the
    /// session is closed.
    pub fn remove_from_stack(&mut self, id: ExerciseId) -> Result<(), EngineError> {
        self.session.remove_from_stack(id)?;
        self.touched(());
        Ok(())
    }

    /// Dissolve a stack group; returns how many exercises were released.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Session` if the group does not exist or the
    /// session is closed.
    pub fn unstack_group(&mut self, group: StackGroupId) -> Result<usize, EngineError> {
        let released = self.session.unstack_group(group)?;
        Ok(self.touched(released))
    }
}
