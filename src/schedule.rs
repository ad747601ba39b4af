use crate::cache::{Clock, TtlCache};
use crate::error::Result;
use crate::fetcher::retry_with_backoff;
use crate::models::{FarmSettings, SensorData, WaterBudget};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleStatus {
    Completed,
    Pending,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Check,
    Irrigate,
    Monitor,
    Update,
}

/// One entry of a daily irrigation plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleItem {
    /// Display time such as "06:00 AM"
    pub time: String,
    pub action: String,
    pub status: ScheduleStatus,
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
}

impl ScheduleItem {
    fn new(time: &str, action: &str, status: ScheduleStatus, kind: ScheduleKind) -> Self {
        Self {
            time: time.to_string(),
            action: action.to_string(),
            status,
            kind,
        }
    }
}

/// Plan used whenever no generated schedule is available
pub fn fallback_schedule() -> Vec<ScheduleItem> {
    vec![
        ScheduleItem::new(
            "06:00 AM",
            "Morning Moisture Check",
            ScheduleStatus::Completed,
            ScheduleKind::Check,
        ),
        ScheduleItem::new(
            "08:00 AM",
            "Start Irrigation Cycle",
            ScheduleStatus::Pending,
            ScheduleKind::Irrigate,
        ),
        ScheduleItem::new(
            "12:00 PM",
            "Midday System Monitor",
            ScheduleStatus::Scheduled,
            ScheduleKind::Monitor,
        ),
        ScheduleItem::new(
            "05:00 PM",
            "Evening Moisture Update",
            ScheduleStatus::Scheduled,
            ScheduleKind::Update,
        ),
    ]
}

/// Produces an advisory daily schedule from the current farm state
#[async_trait]
pub trait ScheduleGenerator: Send + Sync {
    async fn generate(
        &self,
        settings: &FarmSettings,
        sample: &SensorData,
        budget: &WaterBudget,
    ) -> Result<Vec<ScheduleItem>>;
}

#[derive(Serialize)]
struct ScheduleRequest<'a> {
    settings: &'a FarmSettings,
    sample: &'a SensorData,
    budget: &'a WaterBudget,
}

/// Schedule generation over HTTP: `POST {base_url}/schedule` with the farm
/// state as JSON, answered by a JSON array of schedule items.
pub struct HttpScheduleGenerator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl HttpScheduleGenerator {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("agroflow-engine/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: 2,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[async_trait]
impl ScheduleGenerator for HttpScheduleGenerator {
    async fn generate(
        &self,
        settings: &FarmSettings,
        sample: &SensorData,
        budget: &WaterBudget,
    ) -> Result<Vec<ScheduleItem>> {
        let url = format!("{}/schedule", self.base_url);
        let body = ScheduleRequest {
            settings,
            sample,
            budget,
        };

        retry_with_backoff(self.max_retries, || async {
            debug!("Requesting irrigation schedule from {}", url);
            let mut request = self.client.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                request = request.header("x-api-key", key);
            }
            let items: Vec<ScheduleItem> = request
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok(items)
        })
        .await
    }
}

/// Always returns the fallback plan
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedScheduleGenerator;

#[async_trait]
impl ScheduleGenerator for FixedScheduleGenerator {
    async fn generate(
        &self,
        _settings: &FarmSettings,
        _sample: &SensorData,
        _budget: &WaterBudget,
    ) -> Result<Vec<ScheduleItem>> {
        Ok(fallback_schedule())
    }
}

/// Memoizes schedules per location, crop and irrigation method
pub struct CachedScheduleGenerator<G> {
    inner: G,
    cache: TtlCache<String, Vec<ScheduleItem>>,
}

impl<G: ScheduleGenerator> CachedScheduleGenerator<G> {
    pub fn new(inner: G, ttl: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl, clock),
        }
    }
}

fn cache_key(settings: &FarmSettings) -> String {
    format!(
        "{}-{}-{}",
        settings.location, settings.crop, settings.irrigation_method
    )
}

#[async_trait]
impl<G: ScheduleGenerator> ScheduleGenerator for CachedScheduleGenerator<G> {
    async fn generate(
        &self,
        settings: &FarmSettings,
        sample: &SensorData,
        budget: &WaterBudget,
    ) -> Result<Vec<ScheduleItem>> {
        let key = cache_key(settings);
        if let Some(hit) = self.cache.get(&key) {
            debug!("Schedule for '{}' served from cache", key);
            return Ok(hit);
        }

        let items = self.inner.generate(settings, sample, budget).await?;
        self.cache.insert(key, items.clone());
        Ok(items)
    }
}
