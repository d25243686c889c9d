#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod sessions;
pub mod wearables;

pub use workout_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, EngineError, FeedError, RecoveryError, WearableError};
pub use sessions::{
    FinishReport, FixedChoice, NewWorkoutSource, RecoveryChoice, RecoveryOrigin, RecoveryPrompt,
    RecoveryPrompter, RecoveryRequest, WorkoutEngine, WorkoutFeed, WorkoutServices,
};
pub use wearables::{HttpWearableSource, ManualWearable, NoWearable, WearableConfig, WearableSource};
