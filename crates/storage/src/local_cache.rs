//! Device-local persistence: the file-backed cache, typed session mirrors on
//! top of any `LocalCache`, the recovery outbox and the local workout history.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;
use workout_core::model::{LocalCacheEntry, SessionId, UserId, WorkoutRecord};

use crate::repository::{LocalCache, StorageError, WorkoutLogRepository};

#[must_use]
pub fn active_key(user: &UserId) -> String {
    format!("activeWorkout_{user}")
}

#[must_use]
pub fn paused_key(user: &UserId) -> String {
    format!("pausedWorkout_{user}")
}

#[must_use]
pub fn outbox_key(user: &UserId) -> String {
    format!("pendingWorkouts_{user}")
}

#[must_use]
pub fn history_key(user: &UserId) -> String {
    format!("workoutHistory_{user}")
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn io_err(e: &std::io::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn read_json<T: DeserializeOwned>(cache: &dyn LocalCache, key: &str) -> Result<Option<T>, StorageError> {
    cache
        .get(key)?
        .map(|raw| serde_json::from_str(&raw).map_err(ser))
        .transpose()
}

fn write_json<T: Serialize>(cache: &dyn LocalCache, key: &str, value: &T) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(ser)?;
    cache.set(key, &raw)
}

//
// ─── FILE CACHE ────────────────────────────────────────────────────────────────
//

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Use `dir` for cache files, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| io_err(&e))?;
        Ok(Self { dir })
    }

    /// Keys are hex-encoded so distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(key)))
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| io_err(&e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(&e))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&e)),
        }
    }
}

//
// ─── SESSION MIRRORS ───────────────────────────────────────────────────────────
//

/// Result of reading a local session mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedSession {
    Missing,
    /// The stored payload could not be decoded.
    Corrupt(String),
    Found(LocalCacheEntry),
}

/// Typed access to the active and paused session mirrors of a `LocalCache`.
#[derive(Clone)]
pub struct SessionCache {
    cache: Arc<dyn LocalCache>,
}

impl SessionCache {
    #[must_use]
    pub fn new(cache: Arc<dyn LocalCache>) -> Self {
        Self { cache }
    }

    fn read(&self, key: &str) -> Result<CachedSession, StorageError> {
        let Some(raw) = self.cache.get(key)? else {
            return Ok(CachedSession::Missing);
        };
        Ok(match serde_json::from_str::<LocalCacheEntry>(&raw) {
            Ok(entry) => CachedSession::Found(entry),
            Err(e) => CachedSession::Corrupt(e.to_string()),
        })
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read. Undecodable
    /// payloads are reported as `CachedSession::Corrupt`, not as errors.
    pub fn read_active(&self, user: &UserId) -> Result<CachedSession, StorageError> {
        self.read(&active_key(user))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be encoded or written.
    pub fn write_active(&self, user: &UserId, entry: &LocalCacheEntry) -> Result<(), StorageError> {
        write_json(self.cache.as_ref(), &active_key(user), entry)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the key cannot be removed.
    pub fn remove_active(&self, user: &UserId) -> Result<(), StorageError> {
        self.cache.remove(&active_key(user))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    pub fn read_paused(&self, user: &UserId) -> Result<CachedSession, StorageError> {
        self.read(&paused_key(user))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be encoded or written.
    pub fn write_paused(&self, user: &UserId, entry: &LocalCacheEntry) -> Result<(), StorageError> {
        write_json(self.cache.as_ref(), &paused_key(user), entry)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the key cannot be removed.
    pub fn remove_paused(&self, user: &UserId) -> Result<(), StorageError> {
        self.cache.remove(&paused_key(user))
    }
}

//
// ─── OUTBOX ────────────────────────────────────────────────────────────────────
//

/// Holding area for finished workouts that could not be delivered.
pub trait RecoveryOutbox: Send + Sync {
    /// Keep `record` until it is delivered. Pushing the same id twice keeps one copy.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    fn push(&self, user: &UserId, record: &WorkoutRecord) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the outbox cannot be read.
    fn pending(&self, user: &UserId) -> Result<Vec<WorkoutRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the outbox cannot be rewritten.
    fn remove(&self, user: &UserId, id: SessionId) -> Result<(), StorageError>;
}

/// Outbox stored as a JSON array under one cache key per user.
#[derive(Clone)]
pub struct CacheOutbox {
    cache: Arc<dyn LocalCache>,
}

impl CacheOutbox {
    #[must_use]
    pub fn new(cache: Arc<dyn LocalCache>) -> Self {
        Self { cache }
    }
}

impl RecoveryOutbox for CacheOutbox {
    fn push(&self, user: &UserId, record: &WorkoutRecord) -> Result<(), StorageError> {
        let mut pending = self.pending(user)?;
        pending.retain(|r| r.id != record.id);
        pending.push(record.clone());
        write_json(self.cache.as_ref(), &outbox_key(user), &pending)
    }

    fn pending(&self, user: &UserId) -> Result<Vec<WorkoutRecord>, StorageError> {
        Ok(read_json(self.cache.as_ref(), &outbox_key(user))?.unwrap_or_default())
    }

    fn remove(&self, user: &UserId, id: SessionId) -> Result<(), StorageError> {
        let mut pending = self.pending(user)?;
        let before = pending.len();
        pending.retain(|r| r.id != id);
        if pending.len() == before {
            return Ok(());
        }
        if pending.is_empty() {
            self.cache.remove(&outbox_key(user))
        } else {
            write_json(self.cache.as_ref(), &outbox_key(user), &pending)
        }
    }
}

//
// ─── LOCAL HISTORY ─────────────────────────────────────────────────────────────
//

/// Workout history kept on the device, newest first.
#[derive(Clone)]
pub struct CachedWorkoutLog {
    cache: Arc<dyn LocalCache>,
}

impl CachedWorkoutLog {
    #[must_use]
    pub fn new(cache: Arc<dyn LocalCache>) -> Self {
        Self { cache }
    }

    fn load(&self, user: &UserId) -> Result<Vec<WorkoutRecord>, StorageError> {
        match read_json(self.cache.as_ref(), &history_key(user)) {
            Ok(list) => Ok(list.unwrap_or_default()),
            Err(StorageError::Serialization(reason)) => {
                warn!(user_id = %user, %reason, "discarding unreadable local workout history");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl WorkoutLogRepository for CachedWorkoutLog {
    async fn append_workout(&self, user: &UserId, record: &WorkoutRecord) -> Result<(), StorageError> {
        let mut list = self.load(user)?;
        list.retain(|r| r.id != record.id);
        list.insert(0, record.clone());
        write_json(self.cache.as_ref(), &history_key(user), &list)
    }

    async fn list_workouts(&self, user: &UserId, limit: u32) -> Result<Vec<WorkoutRecord>, StorageError> {
        let mut list = self.load(user)?;
        list.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryCache;
    use workout_core::model::{FinishFeedback, Session, SessionSnapshot, WearableMetrics};
    use workout_core::time::fixed_now;
    use workout_core::wearable::WearableDelta;

    fn record() -> WorkoutRecord {
        let session = Session::start(SessionId::new_v4(), fixed_now(), WearableMetrics::unknown());
        WorkoutRecord::from_session(&session, fixed_now(), WearableDelta::default(), FinishFeedback::default())
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("workout-cache-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn file_cache_round_trips_and_removes() {
        let dir = temp_dir();
        let cache = FileCache::open(&dir).unwrap();
        assert_eq!(cache.get("activeWorkout_a/b").unwrap(), None);
        cache.set("activeWorkout_a/b", "{}").unwrap();
        assert_eq!(cache.get("activeWorkout_a/b").unwrap().as_deref(), Some("{}"));
        cache.remove("activeWorkout_a/b").unwrap();
        cache.remove("activeWorkout_a/b").unwrap();
        assert_eq!(cache.get("activeWorkout_a/b").unwrap(), None);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn file_cache_keeps_similar_user_ids_apart() {
        let dir = temp_dir();
        let cache = FileCache::open(&dir).unwrap();
        let dotted = active_key(&UserId::new("a.b"));
        let underscored = active_key(&UserId::new("a_b"));

        cache.set(&dotted, "dotted").unwrap();
        cache.set(&underscored, "underscored").unwrap();
        assert_eq!(cache.get(&dotted).unwrap().as_deref(), Some("dotted"));
        assert_eq!(cache.get(&underscored).unwrap().as_deref(), Some("underscored"));

        cache.remove(&dotted).unwrap();
        assert_eq!(cache.get(&underscored).unwrap().as_deref(), Some("underscored"));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn session_cache_flags_corrupt_payloads() {
        let raw = Arc::new(InMemoryCache::new());
        let cache = SessionCache::new(raw.clone());
        let user = UserId::new("u1");

        assert_eq!(cache.read_active(&user).unwrap(), CachedSession::Missing);
        raw.set(&active_key(&user), "{not json").unwrap();
        assert!(matches!(cache.read_active(&user).unwrap(), CachedSession::Corrupt(_)));

        let session = Session::start(SessionId::new_v4(), fixed_now(), WearableMetrics::unknown());
        let entry = LocalCacheEntry::new(SessionSnapshot::capture(&session, fixed_now()), fixed_now());
        cache.write_paused(&user, &entry).unwrap();
        assert_eq!(cache.read_paused(&user).unwrap(), CachedSession::Found(entry));
        cache.remove_paused(&user).unwrap();
        assert_eq!(cache.read_paused(&user).unwrap(), CachedSession::Missing);
    }

    #[test]
    fn outbox_dedupes_by_record_id() {
        let outbox = CacheOutbox::new(Arc::new(InMemoryCache::new()));
        let user = UserId::new("u1");
        let first = record();

        outbox.push(&user, &first).unwrap();
        outbox.push(&user, &first).unwrap();
        outbox.push(&user, &record()).unwrap();
        assert_eq!(outbox.pending(&user).unwrap().len(), 2);

        outbox.remove(&user, first.id).unwrap();
        let left = outbox.pending(&user).unwrap();
        assert_eq!(left.len(), 1);
        assert_ne!(left[0].id, first.id);
    }

    #[tokio::test]
    async fn local_history_is_newest_first() {
        let log = CachedWorkoutLog::new(Arc::new(InMemoryCache::new()));
        let user = UserId::new("u1");
        let older = record();
        let newer = record();
        log.append_workout(&user, &older).await.unwrap();
        log.append_workout(&user, &newer).await.unwrap();

        let list = log.list_workouts(&user, 10).await.unwrap();
        assert_eq!(list[0].id, newer.id);
        assert_eq!(log.list_workouts(&user, 1).await.unwrap().len(), 1);
    }
}
