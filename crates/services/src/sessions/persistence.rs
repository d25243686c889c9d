use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use storage::local_cache::SessionCache;
use storage::repository::ActiveSessionRepository;
use workout_core::model::{LocalCacheEntry, Session, SessionSnapshot, UserId, entry_score};
use workout_core::settings::EngineSettings;

use super::report_store_error;

/// Why a write was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Quiet period after the last edit elapsed.
    Debounce,
    /// Regular autosave while the session has exercises.
    Periodic,
    /// Pause, resume or a rest timer boundary.
    Immediate,
    /// The host is going to the background.
    Background,
    /// Right after recovery produced the starting session.
    Recovery,
    /// Final state before the session is removed.
    Finalize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierOutcome {
    Written,
    /// Same state as the last successful write; nothing sent.
    Unchanged,
    /// Write failed and will be retried on the next trigger.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub trigger: FlushTrigger,
    pub remote: TierOutcome,
    pub local: TierOutcome,
}

impl FlushReport {
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.remote != TierOutcome::Failed || self.local != TierOutcome::Failed
    }
}

/// Result of re-reading the remote record when the host regains focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundSync {
    /// Timing (and possibly exercises) taken from the remote record.
    Applied { exercises_replaced: bool },
    /// The remote record was saved before the last write from this engine;
    /// the in-memory timing is kept.
    RemoteBehind,
    /// The remote record is absent or belongs to another session.
    NoRemoteCopy,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearReport {
    pub remote_cleared: bool,
    pub local_cleared: bool,
}

impl ClearReport {
    /// Combined report: a tier counts as cleared only if both clears succeeded.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self {
            remote_cleared: self.remote_cleared && other.remote_cleared,
            local_cleared: self.local_cleared && other.local_cleared,
        }
    }
}

/// Decides when the session is written and mirrors it to the remote store
/// and the local cache.
///
/// The two tiers are written independently; a failure on one never blocks
/// the other and is never surfaced to the caller.
pub struct PersistenceCoordinator {
    user: UserId,
    remote: Arc<dyn ActiveSessionRepository>,
    cache: SessionCache,
    settings: EngineSettings,
    last_remote: Option<SessionSnapshot>,
    last_local: Option<SessionSnapshot>,
    last_written_at: Option<DateTime<Utc>>,
    dirty_since: Option<DateTime<Utc>>,
    next_periodic: DateTime<Utc>,
}

impl PersistenceCoordinator {
    #[must_use]
    pub fn new(
        user: UserId,
        remote: Arc<dyn ActiveSessionRepository>,
        cache: SessionCache,
        settings: EngineSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let next_periodic = now + settings.autosave_period();
        Self {
            user,
            remote,
            cache,
            settings,
            last_remote: None,
            last_local: None,
            last_written_at: None,
            dirty_since: None,
            next_periodic,
        }
    }

    /// Record an edit; the debounce window restarts from `now`.
    pub fn mark_dirty(&mut self, now: DateTime<Utc>) {
        self.dirty_since = Some(now);
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty_since.is_some()
    }

    /// The trigger that is due at `now`, if any.
    #[must_use]
    pub fn due(&self, session: &Session, now: DateTime<Utc>) -> Option<FlushTrigger> {
        if self
            .dirty_since
            .is_some_and(|since| now - since >= self.settings.debounce())
        {
            return Some(FlushTrigger::Debounce);
        }
        if session.has_exercises() && now >= self.next_periodic {
            return Some(FlushTrigger::Periodic);
        }
        None
    }

    /// Write the full state of `session` to both tiers.
    ///
    /// Unless `force` is set, a tier whose last accepted state equals the
    /// current one is skipped.
    pub async fn flush(&mut self, session: &Session, now: DateTime<Utc>, trigger: FlushTrigger, force: bool) -> FlushReport {
        let snapshot = SessionSnapshot::capture(session, now);
        let normalized = snapshot.normalized();

        let remote = if !force && self.last_remote.as_ref() == Some(&normalized) {
            TierOutcome::Unchanged
        } else {
            match self.remote.upsert_active(&self.user, &snapshot).await {
                Ok(()) => {
                    self.last_remote = Some(normalized.clone());
                    TierOutcome::Written
                }
                Err(e) => {
                    report_store_error("save active session", &self.user, &e);
                    TierOutcome::Failed
                }
            }
        };

        let local = if !force && self.last_local.as_ref() == Some(&normalized) {
            TierOutcome::Unchanged
        } else {
            match self.cache.write_active(&self.user, &LocalCacheEntry::new(snapshot, now)) {
                Ok(()) => {
                    self.last_local = Some(normalized);
                    TierOutcome::Written
                }
                Err(e) => {
                    warn!(user_id = %self.user, reason = %e, "local save failed");
                    TierOutcome::Failed
                }
            }
        };

        if remote == TierOutcome::Written || local == TierOutcome::Written {
            self.last_written_at = Some(now);
        }
        self.dirty_since = None;
        self.next_periodic = now + self.settings.autosave_period();
        debug!(
            user_id = %self.user,
            session_id = %session.id(),
            ?trigger,
            ?remote,
            ?local,
            "session flushed"
        );
        FlushReport { trigger, remote, local }
    }

    /// Re-read the remote record and take authoritative timing from it.
    ///
    /// A remote record saved before this engine's last write is older than
    /// the in-memory state and is left alone. Remote exercises replace the in-memory list only when there are no
    /// unsaved edits and nothing has been logged yet.
    pub async fn reconcile_foreground(&mut self, session: &mut Session) -> ForegroundSync {
        let remote = match self.remote.get_active(&self.user).await {
            Ok(Some(snapshot)) if snapshot.session_id() == session.id() => snapshot,
            Ok(_) => return ForegroundSync::NoRemoteCopy,
            Err(e) => {
                report_store_error("refresh active session", &self.user, &e);
                return ForegroundSync::Unavailable;
            }
        };

        let behind = matches!(
            (remote.saved_at, self.last_written_at),
            (Some(saved), Some(written)) if saved < written
        );
        if behind {
            debug!(user_id = %self.user, session_id = %session.id(), "remote copy is older than local state");
            return ForegroundSync::RemoteBehind;
        }

        session.adopt_timing(remote.workout_start_time, remote.paused_time_ms);
        let replace = !self.is_dirty()
            && entry_score(session.exercises()) == 0
            && remote.exercises.as_slice() != session.exercises();
        if replace {
            session.replace_exercises(remote.exercises);
            debug!(user_id = %self.user, session_id = %session.id(), "took exercises from remote copy");
        }
        ForegroundSync::Applied {
            exercises_replaced: replace,
        }
    }

    /// Remove the active record from both tiers and forget what was written.
    pub async fn clear(&mut self) -> ClearReport {
        let remote_cleared = match self.remote.delete_active(&self.user).await {
            Ok(()) => true,
            Err(e) => {
                report_store_error("delete active session", &self.user, &e);
                false
            }
        };
        let local_cleared = match self.cache.remove_active(&self.user) {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = %self.user, reason = %e, "could not remove local workout");
                false
            }
        };
        self.last_remote = None;
        self.last_local = None;
        self.last_written_at = None;
        self.dirty_since = None;
        ClearReport {
            remote_cleared,
            local_cleared,
        }
    }
}
