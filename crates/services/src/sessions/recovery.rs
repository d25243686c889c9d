use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use storage::local_cache::{CachedSession, SessionCache};
use storage::repository::Storage;
use workout_core::model::{LocalCacheEntry, Session, SessionId, SessionSnapshot, UserId};
use workout_core::settings::EngineSettings;

use super::report_store_error;
use super::sources::NewWorkoutSource;
use crate::error::RecoveryError;
use crate::wearables::WearableSource;

//
// ─── PROMPTS ───────────────────────────────────────────────────────────────────
//

/// Which store a recoverable session was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredTier {
    Remote,
    Local,
}

/// A question recovery needs the user to answer.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryPrompt {
    /// The user explicitly paused a workout earlier.
    PausedSession {
        session_id: SessionId,
        elapsed: Duration,
        exercises: usize,
        paused_at: DateTime<Utc>,
    },
    /// An in-progress workout was last saved longer ago than the freshness
    /// threshold.
    StaleSession {
        session_id: SessionId,
        age: Duration,
        exercises: usize,
        tier: StoredTier,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    Resume,
    Discard,
}

/// Asks the user what to do with a recoverable session.
#[async_trait]
pub trait RecoveryPrompter: Send + Sync {
    async fn choose(&self, prompt: &RecoveryPrompt) -> RecoveryChoice;
}

/// Answers every prompt the same way and remembers what it was asked.
#[derive(Debug, Clone)]
pub struct FixedChoice {
    choice: RecoveryChoice,
    asked: Arc<Mutex<Vec<RecoveryPrompt>>>,
}

impl FixedChoice {
    #[must_use]
    pub fn new(choice: RecoveryChoice) -> Self {
        Self {
            choice,
            asked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn resume() -> Self {
        Self::new(RecoveryChoice::Resume)
    }

    #[must_use]
    pub fn discard() -> Self {
        Self::new(RecoveryChoice::Discard)
    }

    /// Prompts seen so far, oldest first.
    #[must_use]
    pub fn asked(&self) -> Vec<RecoveryPrompt> {
        self.asked.lock().map(|list| list.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RecoveryPrompter for FixedChoice {
    async fn choose(&self, prompt: &RecoveryPrompt) -> RecoveryChoice {
        if let Ok(mut list) = self.asked.lock() {
            list.push(prompt.clone());
        }
        self.choice
    }
}

//
// ─── REQUEST / OUTCOME ─────────────────────────────────────────────────────────
//

/// What the caller asked for when opening the workout screen.
#[derive(Debug, Clone, Default)]
pub struct RecoveryRequest {
    pub source: Option<NewWorkoutSource>,
    /// Resume a paused workout without asking.
    pub resume_paused: bool,
}

impl RecoveryRequest {
    #[must_use]
    pub fn from_source(source: NewWorkoutSource) -> Self {
        Self {
            source: Some(source),
            resume_paused: false,
        }
    }

    #[must_use]
    pub fn resuming_paused() -> Self {
        Self {
            source: None,
            resume_paused: true,
        }
    }
}

/// How the starting session was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOrigin {
    Fresh,
    FromSource,
    ResumedPaused,
    AdoptedRemote,
    AdoptedLocal,
}

impl RecoveryOrigin {
    #[must_use]
    pub fn is_recovered(self) -> bool {
        matches!(self, Self::ResumedPaused | Self::AdoptedRemote | Self::AdoptedLocal)
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub session: Session,
    pub origin: RecoveryOrigin,
}

//
// ─── PROTOCOL ──────────────────────────────────────────────────────────────────
//

/// Reconciles the paused record, a requested source, the remote active
/// session and the local mirror into one starting session.
pub(crate) struct Recovery<'a> {
    pub user: &'a UserId,
    pub storage: &'a Storage,
    pub cache: &'a SessionCache,
    pub wearable: &'a dyn WearableSource,
    pub settings: &'a EngineSettings,
    pub now: DateTime<Utc>,
}

impl Recovery<'_> {
    pub async fn run(&self, request: RecoveryRequest, prompter: &dyn RecoveryPrompter) -> RecoveryOutcome {
        if let Some(outcome) = self.try_paused(request.resume_paused, prompter).await {
            return outcome;
        }

        if let Some(source) = request.source {
            let metrics = self.wearable.current_metrics(self.user).await;
            let session = Session::start(SessionId::new_v4(), self.now, metrics)
                .with_exercises(source.build_exercises())
                .with_source_label(source.label());
            info!(user_id = %self.user, session_id = %session.id(), source = %source.label(), "starting workout from source");
            return RecoveryOutcome {
                session,
                origin: RecoveryOrigin::FromSource,
            };
        }

        if let Some(outcome) = self.try_active(prompter).await {
            return outcome;
        }

        let metrics = self.wearable.current_metrics(self.user).await;
        let session = Session::start(SessionId::new_v4(), self.now, metrics);
        info!(user_id = %self.user, session_id = %session.id(), "starting fresh workout");
        RecoveryOutcome {
            session,
            origin: RecoveryOrigin::Fresh,
        }
    }

    //
    // ─── PAUSED RECORD ─────────────────────────────────────────────────────────
    //

    async fn load_paused(&self) -> Option<SessionSnapshot> {
        match self.storage.paused.get_paused(self.user).await {
            Ok(Some(snapshot)) => return Some(snapshot),
            Ok(None) => {}
            Err(e) => report_store_error("read paused session", self.user, &e),
        }
        match self.cache.read_paused(self.user) {
            Ok(CachedSession::Found(entry)) => Some(entry.snapshot),
            Ok(CachedSession::Missing) => None,
            Ok(CachedSession::Corrupt(reason)) => {
                warn!(user_id = %self.user, %reason, "dropping unreadable local paused workout");
                self.drop_local_paused();
                None
            }
            Err(e) => {
                warn!(user_id = %self.user, reason = %e, "local paused workout unavailable");
                None
            }
        }
    }

    async fn try_paused(&self, resume_requested: bool, prompter: &dyn RecoveryPrompter) -> Option<RecoveryOutcome> {
        let snapshot = self.load_paused().await?;
        let session_id = snapshot.session_id();

        let choice = if resume_requested {
            RecoveryChoice::Resume
        } else {
            prompter
                .choose(&RecoveryPrompt::PausedSession {
                    session_id,
                    elapsed: snapshot.elapsed_at_save(),
                    exercises: snapshot.exercises.len(),
                    paused_at: snapshot.reference_time(),
                })
                .await
        };

        self.drop_paused().await;

        if choice == RecoveryChoice::Discard {
            info!(user_id = %self.user, session_id = %session_id, "discarded paused workout");
            self.drop_active_if(session_id).await;
            return None;
        }

        let elapsed = snapshot.elapsed_at_save();
        let mut session = match snapshot.into_session().map_err(RecoveryError::from) {
            Ok(session) => session,
            Err(e) => {
                warn!(user_id = %self.user, session_id = %session_id, reason = %e, "paused workout cannot be resumed");
                return None;
            }
        };
        let metrics = self.wearable.current_metrics(self.user).await;
        session.resume_parked(self.now, metrics, elapsed);
        info!(
            user_id = %self.user,
            session_id = %session_id,
            elapsed_secs = elapsed.num_seconds(),
            "resumed paused workout"
        );
        Some(RecoveryOutcome {
            session,
            origin: RecoveryOrigin::ResumedPaused,
        })
    }

    async fn drop_paused(&self) {
        if let Err(e) = self.storage.paused.delete_paused(self.user).await {
            report_store_error("delete paused session", self.user, &e);
        }
        self.drop_local_paused();
    }

    fn drop_local_paused(&self) {
        if let Err(e) = self.cache.remove_paused(self.user) {
            warn!(user_id = %self.user, reason = %e, "could not remove local paused workout");
        }
    }

    /// A discarded paused workout must not come back through the active record.
    async fn drop_active_if(&self, session_id: SessionId) {
        let remote_matches = matches!(
            self.storage.active.get_active(self.user).await,
            Ok(Some(ref active)) if active.session_id() == session_id
        );
        if remote_matches {
            self.drop_active(StoredTier::Remote).await;
        }
        let local_matches = matches!(
            self.cache.read_active(self.user),
            Ok(CachedSession::Found(ref entry)) if entry.snapshot.session_id() == session_id
        );
        if local_matches {
            self.drop_active(StoredTier::Local).await;
        }
    }

    //
    // ─── ACTIVE RECORD ─────────────────────────────────────────────────────────
    //

    async fn load_remote_active(&self) -> Option<SessionSnapshot> {
        match self.storage.active.get_active(self.user).await {
            Ok(found) => found,
            Err(e) => {
                report_store_error("read active session", self.user, &e);
                None
            }
        }
    }

    fn load_local_active(&self) -> Option<LocalCacheEntry> {
        match self.cache.read_active(self.user) {
            Ok(CachedSession::Found(entry)) => {
                if entry.age(self.now) > self.settings.local_max_age() {
                    debug!(user_id = %self.user, "ignoring expired local workout");
                    self.remove_local_active();
                    None
                } else {
                    Some(entry)
                }
            }
            Ok(CachedSession::Missing) => None,
            Ok(CachedSession::Corrupt(reason)) => {
                warn!(user_id = %self.user, %reason, "dropping unreadable local workout");
                self.remove_local_active();
                None
            }
            Err(e) => {
                warn!(user_id = %self.user, reason = %e, "local workout unavailable");
                None
            }
        }
    }

    /// The more recently saved of the remote and local copies, with its age.
    ///
    /// A remote copy ages from the workout start; a local copy ages from the
    /// moment it was written to the device.
    async fn candidate(&self) -> Option<(SessionSnapshot, StoredTier, Duration)> {
        let remote = self.load_remote_active().await;
        let local = self.load_local_active();
        match (remote, local) {
            (Some(r), Some(l)) if l.snapshot.reference_time() > r.reference_time() => {
                let age = l.age(self.now);
                Some((l.snapshot, StoredTier::Local, age))
            }
            (Some(r), _) => {
                let age = r.time_since_start(self.now);
                Some((r, StoredTier::Remote, age))
            }
            (None, Some(l)) => {
                let age = l.age(self.now);
                Some((l.snapshot, StoredTier::Local, age))
            }
            (None, None) => None,
        }
    }

    async fn try_active(&self, prompter: &dyn RecoveryPrompter) -> Option<RecoveryOutcome> {
        let (snapshot, tier, age) = self.candidate().await?;
        let session_id = snapshot.session_id();

        if age > self.settings.freshness_threshold() {
            let choice = prompter
                .choose(&RecoveryPrompt::StaleSession {
                    session_id,
                    age,
                    exercises: snapshot.exercises.len(),
                    tier,
                })
                .await;
            if choice == RecoveryChoice::Discard {
                info!(user_id = %self.user, session_id = %session_id, "discarded stale workout");
                self.drop_active(StoredTier::Remote).await;
                self.drop_active(StoredTier::Local).await;
                return None;
            }
        }

        match snapshot.into_session() {
            Ok(session) => {
                let origin = match tier {
                    StoredTier::Remote => RecoveryOrigin::AdoptedRemote,
                    StoredTier::Local => RecoveryOrigin::AdoptedLocal,
                };
                info!(
                    user_id = %self.user,
                    session_id = %session_id,
                    age_secs = age.num_seconds(),
                    ?origin,
                    "recovered workout"
                );
                Some(RecoveryOutcome { session, origin })
            }
            Err(e) => {
                let e = RecoveryError::from(e);
                warn!(user_id = %self.user, session_id = %session_id, reason = %e, "stored workout cannot be restored");
                self.drop_active(tier).await;
                None
            }
        }
    }

    async fn drop_active(&self, tier: StoredTier) {
        match tier {
            StoredTier::Remote => {
                if let Err(e) = self.storage.active.delete_active(self.user).await {
                    report_store_error("delete active session", self.user, &e);
                }
            }
            StoredTier::Local => self.remove_local_active(),
        }
    }

    fn remove_local_active(&self) {
        if let Err(e) = self.cache.remove_active(self.user) {
            warn!(user_id = %self.user, reason = %e, "could not remove local workout");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::{
        ActiveSessionRepository, FailureMode, InMemoryCache, InMemoryRepository, LocalCache,
        PausedSessionRepository,
    };
    use workout_core::model::{
        CatalogExercise, ExerciseCategory, LocalCacheEntry, SetField, WearableMetrics,
    };
    use workout_core::time::fixed_now;

    use crate::wearables::ManualWearable;

    struct Fixture {
        repo: InMemoryRepository,
        storage: Storage,
        cache: SessionCache,
        wearable: ManualWearable,
        settings: EngineSettings,
        user: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            let repo = InMemoryRepository::new();
            let raw = InMemoryCache::new();
            let storage = Storage::from_memory(&repo, &raw);
            let cache = SessionCache::new(storage.local.clone());
            Self {
                repo,
                storage,
                cache,
                wearable: ManualWearable::new(WearableMetrics::new(Some(50.0), Some(500))),
                settings: EngineSettings::defaults(),
                user: UserId::new("athlete"),
            }
        }

        fn recovery(&self, now: DateTime<Utc>) -> Recovery<'_> {
            Recovery {
                user: &self.user,
                storage: &self.storage,
                cache: &self.cache,
                wearable: &self.wearable,
                settings: &self.settings,
                now,
            }
        }
    }

    fn saved_session(at: DateTime<Utc>) -> SessionSnapshot {
        let mut session = Session::start(SessionId::new_v4(), at, WearableMetrics::unknown());
        let id = session
            .add_exercise(&CatalogExercise::new("Squat", ExerciseCategory::Strength))
            .unwrap();
        session.update_set(id, 0, SetField::Reps, "5").unwrap();
        SessionSnapshot::capture(&session, at)
    }

    #[tokio::test]
    async fn nothing_stored_starts_fresh_with_wearable_baseline() {
        let fx = Fixture::new();
        let prompter = FixedChoice::resume();
        let outcome = fx.recovery(fixed_now()).run(RecoveryRequest::default(), &prompter).await;

        assert_eq!(outcome.origin, RecoveryOrigin::Fresh);
        assert_eq!(outcome.session.wearable_at_start(), WearableMetrics::new(Some(50.0), Some(500)));
        assert!(prompter.asked().is_empty());
    }

    #[tokio::test]
    async fn stale_remote_discard_clears_both_tiers() {
        let fx = Fixture::new();
        let snapshot = saved_session(fixed_now());
        fx.repo.upsert_active(&fx.user, &snapshot).await.unwrap();
        fx.cache
            .write_active(&fx.user, &LocalCacheEntry::new(snapshot.clone(), fixed_now()))
            .unwrap();

        let prompter = FixedChoice::discard();
        let now = fixed_now() + Duration::hours(3);
        let outcome = fx.recovery(now).run(RecoveryRequest::default(), &prompter).await;

        assert_eq!(outcome.origin, RecoveryOrigin::Fresh);
        assert_ne!(outcome.session.id(), snapshot.session_id());
        assert!(matches!(prompter.asked()[0], RecoveryPrompt::StaleSession { tier: StoredTier::Remote, .. }));
        assert!(fx.repo.get_active(&fx.user).await.unwrap().is_none());
        assert_eq!(fx.cache.read_active(&fx.user).unwrap(), CachedSession::Missing);
    }

    #[tokio::test]
    async fn remote_age_counts_from_workout_start() {
        let fx = Fixture::new();
        let mut snapshot = saved_session(fixed_now());
        snapshot.saved_at = Some(fixed_now() + Duration::hours(3));
        fx.repo.upsert_active(&fx.user, &snapshot).await.unwrap();

        let prompter = FixedChoice::resume();
        let now = fixed_now() + Duration::hours(3) + Duration::minutes(1);
        let outcome = fx.recovery(now).run(RecoveryRequest::default(), &prompter).await;

        assert_eq!(outcome.origin, RecoveryOrigin::AdoptedRemote);
        let asked = prompter.asked();
        assert_eq!(asked.len(), 1);
        assert!(matches!(
            &asked[0],
            RecoveryPrompt::StaleSession { tier: StoredTier::Remote, age, .. } if *age > Duration::hours(3)
        ));
    }

    #[tokio::test]
    async fn fresher_local_copy_beats_remote() {
        let fx = Fixture::new();
        let remote = saved_session(fixed_now());
        let mut local = remote.clone();
        local.saved_at = Some(fixed_now() + Duration::minutes(5));
        local.exercises[0].sets[0].weight = "80".into();
        fx.repo.upsert_active(&fx.user, &remote).await.unwrap();
        fx.cache
            .write_active(&fx.user, &LocalCacheEntry::new(local, fixed_now() + Duration::minutes(5)))
            .unwrap();

        let outcome = fx
            .recovery(fixed_now() + Duration::minutes(10))
            .run(RecoveryRequest::default(), &FixedChoice::discard())
            .await;

        assert_eq!(outcome.origin, RecoveryOrigin::AdoptedLocal);
        assert_eq!(outcome.session.exercises()[0].sets[0].weight, "80");
    }

    #[tokio::test]
    async fn expired_local_copy_is_dropped_without_prompt() {
        let fx = Fixture::new();
        let old = fixed_now() - Duration::hours(30);
        fx.cache
            .write_active(&fx.user, &LocalCacheEntry::new(saved_session(old), old))
            .unwrap();

        let prompter = FixedChoice::resume();
        let outcome = fx.recovery(fixed_now()).run(RecoveryRequest::default(), &prompter).await;

        assert_eq!(outcome.origin, RecoveryOrigin::Fresh);
        assert!(prompter.asked().is_empty());
        assert_eq!(fx.cache.read_active(&fx.user).unwrap(), CachedSession::Missing);
    }

    #[tokio::test]
    async fn corrupt_local_copy_is_removed() {
        let fx = Fixture::new();
        fx.storage
            .local
            .set(&storage::local_cache::active_key(&fx.user), "{oops")
            .unwrap();

        let outcome = fx
            .recovery(fixed_now())
            .run(RecoveryRequest::default(), &FixedChoice::resume())
            .await;

        assert_eq!(outcome.origin, RecoveryOrigin::Fresh);
        assert_eq!(fx.cache.read_active(&fx.user).unwrap(), CachedSession::Missing);
    }

    #[tokio::test]
    async fn local_paused_mirror_is_used_when_remote_paused_store_is_missing() {
        let fx = Fixture::new();
        let mut session = saved_session(fixed_now()).into_session().unwrap();
        session.pause(fixed_now() + Duration::minutes(20), WearableMetrics::unknown());
        let parked = SessionSnapshot::capture(&session, fixed_now() + Duration::minutes(20));
        fx.cache
            .write_paused(&fx.user, &LocalCacheEntry::new(parked, fixed_now() + Duration::minutes(20)))
            .unwrap();
        fx.repo.set_failure_mode(FailureMode::MissingSchema).unwrap();

        let prompter = FixedChoice::resume();
        let now = fixed_now() + Duration::hours(5);
        let outcome = fx.recovery(now).run(RecoveryRequest::default(), &prompter).await;

        assert_eq!(outcome.origin, RecoveryOrigin::ResumedPaused);
        assert_eq!(outcome.session.id(), session.id());
        assert_eq!(outcome.session.elapsed_seconds(now), 20 * 60);
        assert!(matches!(prompter.asked()[0], RecoveryPrompt::PausedSession { .. }));
        assert_eq!(fx.cache.read_paused(&fx.user).unwrap(), CachedSession::Missing);
    }

    #[tokio::test]
    async fn discarding_paused_workout_also_drops_its_active_copy() {
        let fx = Fixture::new();
        let mut session = saved_session(fixed_now()).into_session().unwrap();
        session.pause(fixed_now() + Duration::minutes(10), WearableMetrics::unknown());
        let parked = SessionSnapshot::capture(&session, fixed_now() + Duration::minutes(10));
        fx.repo.upsert_paused(&fx.user, &parked).await.unwrap();
        fx.repo.upsert_active(&fx.user, &parked).await.unwrap();

        let outcome = fx
            .recovery(fixed_now() + Duration::minutes(30))
            .run(RecoveryRequest::default(), &FixedChoice::discard())
            .await;

        assert_eq!(outcome.origin, RecoveryOrigin::Fresh);
        assert!(fx.repo.get_paused(&fx.user).await.unwrap().is_none());
        assert!(fx.repo.get_active(&fx.user).await.unwrap().is_none());
    }
}
