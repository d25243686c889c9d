use std::path::Path;
use std::sync::Arc;

use storage::local_cache::{CachedWorkoutLog, FileCache};
use storage::repository::{LocalCache, Storage};
use tracing::info;

use crate::Clock;
use crate::error::AppServicesError;
use crate::sessions::WorkoutServices;
use crate::wearables::{HttpWearableSource, NoWearable, WearableConfig, WearableSource};
use workout_core::settings::EngineSettings;

/// Assembles the workout services for a host process.
#[derive(Clone)]
pub struct AppServices {
    workouts: WorkoutServices,
    wearable_connected: bool,
}

impl AppServices {
    /// Build services backed by `SQLite` for the remote tiers and a file cache
    /// in `cache_dir` for the local tier.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database, the cache directory or the
    /// wearable HTTP client cannot be set up.
    pub async fn new_sqlite(
        db_url: &str,
        cache_dir: &Path,
        clock: Clock,
        wearable: Option<WearableConfig>,
    ) -> Result<Self, AppServicesError> {
        let local: Arc<dyn LocalCache> = Arc::new(FileCache::open(cache_dir)?);
        let storage = Storage::sqlite(db_url, Arc::clone(&local)).await?;

        let wearable_connected = wearable.is_some();
        let wearable: Arc<dyn WearableSource> = match wearable {
            Some(config) => {
                info!(base_url = %config.base_url, "wearable metrics enabled");
                Arc::new(HttpWearableSource::new(config)?)
            }
            None => Arc::new(NoWearable),
        };

        let workouts = WorkoutServices::new(clock, storage)
            .with_settings(EngineSettings::defaults())
            .with_wearable(wearable)
            .with_local_log(Arc::new(CachedWorkoutLog::new(local)));

        Ok(Self {
            workouts,
            wearable_connected,
        })
    }

    /// Services over in-memory stores, for demos and tests.
    #[must_use]
    pub fn in_memory(clock: Clock, wearable: Arc<dyn WearableSource>) -> Self {
        Self {
            workouts: WorkoutServices::new(clock, Storage::in_memory()).with_wearable(wearable),
            wearable_connected: true,
        }
    }

    #[must_use]
    pub fn workouts(&self) -> &WorkoutServices {
        &self.workouts
    }

    #[must_use]
    pub fn wearable_connected(&self) -> bool {
        self.wearable_connected
    }
}
