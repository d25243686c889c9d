use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use workout_core::model::{SessionSnapshot, UserId, WorkoutRecord};

/// Backend error codes meaning "this table or column does not exist yet".
const MISSING_SCHEMA_CODES: [&str; 3] = ["PGRST205", "42P01", "42703"];

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend does not have the table or column yet. Treated as the
    /// feature being unavailable rather than as an outage.
    #[error("missing schema: {0}")]
    MissingSchema(String),
}

impl StorageError {
    /// Classify a backend failure by its error code and message.
    #[must_use]
    pub fn from_backend(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        let missing_code = code.is_some_and(|c| MISSING_SCHEMA_CODES.contains(&c));
        let lowered = message.to_ascii_lowercase();
        if missing_code || lowered.contains("no such table") || lowered.contains("no such column") {
            Self::MissingSchema(message)
        } else {
            Self::Connection(message)
        }
    }

    #[must_use]
    pub fn is_missing_schema(&self) -> bool {
        matches!(self, Self::MissingSchema(_))
    }
}

impl<T> From<PoisonError<T>> for StorageError {
    fn from(e: PoisonError<T>) -> Self {
        Self::Connection(e.to_string())
    }
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Remote store of the in-progress session; one record per user.
#[async_trait]
pub trait ActiveSessionRepository: Send + Sync {
    /// Replace the user's active session with `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn upsert_active(&self, user: &UserId, snapshot: &SessionSnapshot) -> Result<(), StorageError>;

    /// Fetch the user's active session, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend or decoding failures.
    async fn get_active(&self, user: &UserId) -> Result<Option<SessionSnapshot>, StorageError>;

    /// Remove the user's active session. Removing a missing record succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_active(&self, user: &UserId) -> Result<(), StorageError>;
}

/// Remote store of a session the user explicitly paused; one record per user.
#[async_trait]
pub trait PausedSessionRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn upsert_paused(&self, user: &UserId, snapshot: &SessionSnapshot) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend or decoding failures.
    async fn get_paused(&self, user: &UserId) -> Result<Option<SessionSnapshot>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_paused(&self, user: &UserId) -> Result<(), StorageError>;
}

/// Destination of finished workouts.
#[async_trait]
pub trait WorkoutLogRepository: Send + Sync {
    /// Store a finished workout. Saving the same record id twice keeps one copy.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn append_workout(&self, user: &UserId, record: &WorkoutRecord) -> Result<(), StorageError>;

    /// Most recent workouts first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend or decoding failures.
    async fn list_workouts(&self, user: &UserId, limit: u32) -> Result<Vec<WorkoutRecord>, StorageError>;
}

/// Device-local string key/value store.
///
/// Synchronous and best-effort: callers log failures and carry on.
pub trait LocalCache: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the key cannot be removed.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// How the in-memory repository should misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    Healthy,
    /// Every call fails with `StorageError::Connection`.
    Offline,
    /// Every call fails with `StorageError::MissingSchema`.
    MissingSchema,
}

#[derive(Default)]
struct MemoryState {
    active: HashMap<UserId, SessionSnapshot>,
    paused: HashMap<UserId, SessionSnapshot>,
    workouts: HashMap<UserId, Vec<WorkoutRecord>>,
    failure: FailureMode,
    writes: usize,
}

impl MemoryState {
    fn check(&self) -> Result<(), StorageError> {
        match self.failure {
            FailureMode::Healthy => Ok(()),
            FailureMode::Offline => Err(StorageError::Connection("remote store offline".into())),
            FailureMode::MissingSchema => Err(StorageError::from_backend(
                Some("PGRST205"),
                "relation does not exist",
            )),
        }
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Clones share state, so a test can keep a handle and flip the failure mode
/// while the engine holds another.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change how subsequent calls behave.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the state lock is poisoned.
    pub fn set_failure_mode(&self, mode: FailureMode) -> Result<(), StorageError> {
        self.state.lock()?.failure = mode;
        Ok(())
    }

    /// Number of successful writes so far (upserts and appends).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the state lock is poisoned.
    pub fn write_count(&self) -> Result<usize, StorageError> {
        Ok(self.state.lock()?.writes)
    }
}

#[async_trait]
impl ActiveSessionRepository for InMemoryRepository {
    async fn upsert_active(&self, user: &UserId, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let mut guard = self.state.lock()?;
        guard.check()?;
        guard.active.insert(user.clone(), snapshot.clone());
        guard.writes += 1;
        Ok(())
    }

    async fn get_active(&self, user: &UserId) -> Result<Option<SessionSnapshot>, StorageError> {
        let guard = self.state.lock()?;
        guard.check()?;
        Ok(guard.active.get(user).cloned())
    }

    async fn delete_active(&self, user: &UserId) -> Result<(), StorageError> {
        let mut guard = self.state.lock()?;
        guard.check()?;
        guard.active.remove(user);
        Ok(())
    }
}

#[async_trait]
impl PausedSessionRepository for InMemoryRepository {
    async fn upsert_paused(&self, user: &UserId, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let mut guard = self.state.lock()?;
        guard.check()?;
        guard.paused.insert(user.clone(), snapshot.clone());
        guard.writes += 1;
        Ok(())
    }

    async fn get_paused(&self, user: &UserId) -> Result<Option<SessionSnapshot>, StorageError> {
        let guard = self.state.lock()?;
        guard.check()?;
        Ok(guard.paused.get(user).cloned())
    }

    async fn delete_paused(&self, user: &UserId) -> Result<(), StorageError> {
        let mut guard = self.state.lock()?;
        guard.check()?;
        guard.paused.remove(user);
        Ok(())
    }
}

#[async_trait]
impl WorkoutLogRepository for InMemoryRepository {
    async fn append_workout(&self, user: &UserId, record: &WorkoutRecord) -> Result<(), StorageError> {
        let mut guard = self.state.lock()?;
        guard.check()?;
        let list = guard.workouts.entry(user.clone()).or_default();
        list.retain(|existing| existing.id != record.id);
        list.push(record.clone());
        guard.writes += 1;
        Ok(())
    }

    async fn list_workouts(&self, user: &UserId, limit: u32) -> Result<Vec<WorkoutRecord>, StorageError> {
        let guard = self.state.lock()?;
        guard.check()?;
        let mut list = guard.workouts.get(user).cloned().unwrap_or_default();
        list.sort_by(|a, b| b.date.cmp(&a.date));
        list.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(list)
    }
}

/// `HashMap`-backed local cache.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
    broken: Arc<Mutex<bool>>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail, as a full or disabled device store would.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the flag lock is poisoned.
    pub fn set_broken(&self, broken: bool) -> Result<(), StorageError> {
        *self.broken.lock()? = broken;
        Ok(())
    }

    fn check(&self) -> Result<(), StorageError> {
        if *self.broken.lock()? {
            Err(StorageError::Connection("local cache unavailable".into()))
        } else {
            Ok(())
        }
    }
}

impl LocalCache for InMemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        Ok(self.entries.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.entries.lock()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.entries.lock()?.remove(key);
        Ok(())
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the session stores behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub active: Arc<dyn ActiveSessionRepository>,
    pub paused: Arc<dyn PausedSessionRepository>,
    pub workouts: Arc<dyn WorkoutLogRepository>,
    pub local: Arc<dyn LocalCache>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_memory(&InMemoryRepository::new(), &InMemoryCache::new())
    }

    /// Build a `Storage` over existing in-memory handles, so tests can keep
    /// their own clones for inspection and failure injection.
    #[must_use]
    pub fn from_memory(repo: &InMemoryRepository, cache: &InMemoryCache) -> Self {
        let active: Arc<dyn ActiveSessionRepository> = Arc::new(repo.clone());
        let paused: Arc<dyn PausedSessionRepository> = Arc::new(repo.clone());
        let workouts: Arc<dyn WorkoutLogRepository> = Arc::new(repo.clone());
        let local: Arc<dyn LocalCache> = Arc::new(cache.clone());
        Self {
            active,
            paused,
            workouts,
            local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workout_core::model::{Session, SessionId, WearableMetrics};
    use workout_core::time::fixed_now;

    fn snapshot() -> SessionSnapshot {
        let session = Session::start(SessionId::new_v4(), fixed_now(), WearableMetrics::unknown());
        SessionSnapshot::capture(&session, fixed_now())
    }

    #[tokio::test]
    async fn upsert_replaces_per_user() {
        let repo = InMemoryRepository::new();
        let user = UserId::new("u1");
        let first = snapshot();
        let second = snapshot();

        repo.upsert_active(&user, &first).await.unwrap();
        repo.upsert_active(&user, &second).await.unwrap();
        assert_eq!(repo.get_active(&user).await.unwrap(), Some(second));
        assert_eq!(repo.get_active(&UserId::new("u2")).await.unwrap(), None);

        repo.delete_active(&user).await.unwrap();
        repo.delete_active(&user).await.unwrap();
        assert_eq!(repo.get_active(&user).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failure_modes_are_shared_between_clones() {
        let repo = InMemoryRepository::new();
        let handle = repo.clone();
        let user = UserId::new("u1");

        handle.set_failure_mode(FailureMode::Offline).unwrap();
        let err = repo.get_paused(&user).await.unwrap_err();
        assert!(matches!(err, StorageError::Connection(_)));

        handle.set_failure_mode(FailureMode::MissingSchema).unwrap();
        assert!(repo.upsert_active(&user, &snapshot()).await.unwrap_err().is_missing_schema());

        handle.set_failure_mode(FailureMode::Healthy).unwrap();
        assert!(repo.get_paused(&user).await.unwrap().is_none());
    }

    #[test]
    fn backend_codes_classify_missing_schema() {
        assert!(StorageError::from_backend(Some("42P01"), "x").is_missing_schema());
        assert!(StorageError::from_backend(Some("42703"), "x").is_missing_schema());
        assert!(StorageError::from_backend(None, "no such table: paused_sessions").is_missing_schema());
        assert!(!StorageError::from_backend(Some("08006"), "connection reset").is_missing_schema());
    }

    #[test]
    fn cache_can_be_broken() {
        let cache = InMemoryCache::new();
        cache.set("k", "v").unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v"));
        cache.set_broken(true).unwrap();
        assert!(cache.get("k").is_err());
        cache.set_broken(false).unwrap();
        cache.remove("k").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }
}
