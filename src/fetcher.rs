use crate::cache::{Clock, TtlCache};
use crate::error::{AppError, Result};
use crate::models::SensorUpdate;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Looks up current environmental conditions for a location
#[async_trait]
pub trait EnvironmentalSource: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<SensorUpdate>;
}

/// Environmental lookup over HTTP.
///
/// Issues `GET {base_url}/environment?location=...` and expects a JSON object
/// with any of `temperature`, `rainfall`, `groundwaterLevel`, `humidity`.
pub struct HttpEnvironmentSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentReading {
    temperature: Option<f64>,
    rainfall: Option<f64>,
    groundwater_level: Option<f64>,
    humidity: Option<f64>,
}

impl From<EnvironmentReading> for SensorUpdate {
    fn from(reading: EnvironmentReading) -> Self {
        SensorUpdate {
            soil_moisture: None,
            rainfall: reading.rainfall,
            groundwater_level: reading.groundwater_level,
            temperature: reading.temperature,
            humidity: reading.humidity,
        }
    }
}

impl HttpEnvironmentSource {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("agroflow-engine/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: 3,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn fetch_once(&self, location: &str) -> Result<SensorUpdate> {
        let url = format!("{}/environment", self.base_url);
        debug!("Fetching environmental data for '{}' from {}", location, url);

        let mut request = self.client.get(&url).query(&[("location", location)]);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let reading: EnvironmentReading = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let update = SensorUpdate::from(reading);
        if update.is_empty() {
            return Err(AppError::InvalidData(format!(
                "No environmental data returned for '{}'",
                location
            )));
        }
        Ok(update)
    }
}

#[async_trait]
impl EnvironmentalSource for HttpEnvironmentSource {
    async fn fetch(&self, location: &str) -> Result<SensorUpdate> {
        retry_with_backoff(self.max_retries, || async { self.fetch_once(location).await }).await
    }
}

/// Source that always answers with the same reading. Used when no lookup
/// service is configured.
#[derive(Debug, Clone)]
pub struct StaticEnvironmentSource {
    reading: SensorUpdate,
}

impl StaticEnvironmentSource {
    pub fn new(reading: SensorUpdate) -> Self {
        Self { reading }
    }

    pub fn fallback() -> Self {
        Self::new(SensorUpdate::environmental_fallback())
    }
}

#[async_trait]
impl EnvironmentalSource for StaticEnvironmentSource {
    async fn fetch(&self, _location: &str) -> Result<SensorUpdate> {
        Ok(self.reading.clone())
    }
}

/// Memoizes successful lookups per location for the cache TTL
pub struct CachedEnvironmentSource<S> {
    inner: S,
    cache: TtlCache<String, SensorUpdate>,
}

impl<S: EnvironmentalSource> CachedEnvironmentSource<S> {
    pub fn new(inner: S, ttl: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl, clock),
        }
    }
}

#[async_trait]
impl<S: EnvironmentalSource> EnvironmentalSource for CachedEnvironmentSource<S> {
    async fn fetch(&self, location: &str) -> Result<SensorUpdate> {
        if let Some(hit) = self.cache.get(&location.to_string()) {
            debug!("Environmental data for '{}' served from cache", location);
            return Ok(hit);
        }

        let update = self.inner.fetch(location).await?;
        self.cache.insert(location.to_string(), update.clone());
        info!("Environmental data for '{}' refreshed", location);
        Ok(update)
    }
}

fn is_transient(e: &AppError) -> bool {
    match e {
        AppError::Http(reqwest_err) => {
            // Retry on connection errors, timeouts, rate limiting and server errors (5xx)
            reqwest_err.is_timeout()
                || reqwest_err.is_connect()
                || reqwest_err
                    .status()
                    .map(|s| s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS)
                    .unwrap_or(false)
        }
        AppError::Io(_) => true,
        _ => false,
    }
}

/// Retry a future with exponential backoff
pub(crate) async fn retry_with_backoff<F, Fut, T>(max_retries: u32, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut retries = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                retries += 1;

                if retries > max_retries || !is_transient(&e) {
                    return Err(e);
                }

                let delay = Duration::from_secs(2u64.pow(retries.saturating_sub(1)));
                warn!(
                    "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                    retries, max_retries, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
