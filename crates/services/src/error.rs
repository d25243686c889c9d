//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use workout_core::model::SessionError;

/// Errors emitted by `WorkoutEngine` operations that the caller must handle.
///
/// Store failures during routine operation are logged and absorbed; only
/// rejected edits and explicit storage queries surface here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Reasons a stored session could not be taken over during recovery.
///
/// Recovery itself never fails; these are logged and the record is dropped.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecoveryError {
    #[error("stored session is inconsistent: {0}")]
    Unrestorable(#[from] SessionError),
}

/// Errors reported by a `WorkoutFeed`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FeedError {
    #[error("feed rejected the workout: {0}")]
    Rejected(String),
    #[error("feed unavailable: {0}")]
    Unavailable(String),
}

/// Errors emitted by `HttpWearableSource`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WearableError {
    #[error("wearable request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Wearable(#[from] WearableError),
}
