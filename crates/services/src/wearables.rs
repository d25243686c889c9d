use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use workout_core::model::{UserId, WearableMetrics};

use crate::error::WearableError;

/// Point-in-time cumulative daily counters for a user.
///
/// Implementations never fail: an unreachable device or service reports
/// unknown values.
#[async_trait]
pub trait WearableSource: Send + Sync {
    async fn current_metrics(&self, user: &UserId) -> WearableMetrics;
}

/// Source for users without a connected wearable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWearable;

#[async_trait]
impl WearableSource for NoWearable {
    async fn current_metrics(&self, _user: &UserId) -> WearableMetrics {
        WearableMetrics::unknown()
    }
}

/// Source whose reading is set by hand; clones share the reading.
#[derive(Debug, Clone, Default)]
pub struct ManualWearable {
    reading: Arc<Mutex<WearableMetrics>>,
}

impl ManualWearable {
    #[must_use]
    pub fn new(initial: WearableMetrics) -> Self {
        Self {
            reading: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn set(&self, metrics: WearableMetrics) {
        if let Ok(mut guard) = self.reading.lock() {
            *guard = metrics;
        }
    }
}

#[async_trait]
impl WearableSource for ManualWearable {
    async fn current_metrics(&self, _user: &UserId) -> WearableMetrics {
        self.reading
            .lock()
            .map(|guard| *guard)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
pub struct WearableConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl WearableConfig {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("WORKOUT_WEARABLE_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let api_key = env::var("WORKOUT_WEARABLE_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        Some(Self { base_url, api_key })
    }
}

/// Reads `GET {base_url}/metrics/current?userId=…` returning
/// `{ "calories": number|null, "steps": number|null }`.
#[derive(Clone)]
pub struct HttpWearableSource {
    client: Client,
    config: WearableConfig,
}

impl HttpWearableSource {
    /// # Errors
    ///
    /// Returns `WearableError::Http` if the HTTP client cannot be built.
    pub fn new(config: WearableConfig) -> Result<Self, WearableError> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self { client, config })
    }

    /// Fetch the current reading.
    ///
    /// # Errors
    ///
    /// Returns `WearableError` when the request fails or the service answers
    /// with a non-success status.
    pub async fn fetch(&self, user: &UserId) -> Result<WearableMetrics, WearableError> {
        let url = format!(
            "{}/metrics/current",
            self.config.base_url.trim_end_matches('/')
        );
        let mut request = self.client.get(url).query(&[("userId", user.as_str())]);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(WearableError::HttpStatus(response.status()));
        }

        let body: MetricsResponse = response.json().await?;
        Ok(WearableMetrics::new(
            body.calories.filter(|c| c.is_finite() && *c >= 0.0),
            body.steps,
        ))
    }
}

#[async_trait]
impl WearableSource for HttpWearableSource {
    async fn current_metrics(&self, user: &UserId) -> WearableMetrics {
        match self.fetch(user).await {
            Ok(metrics) => {
                debug!(user_id = %user, ?metrics, "wearable reading");
                metrics
            }
            Err(e) => {
                warn!(user_id = %user, reason = %e, "wearable unavailable, using unknown metrics");
                WearableMetrics::unknown()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetricsResponse {
    #[serde(default)]
    calories: Option<f64>,
    #[serde(default)]
    steps: Option<u64>,
}
