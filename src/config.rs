use crate::error::{AppError, Result};
use crate::models::FarmSettings;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub farm: FarmSettings,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_drift_interval", deserialize_with = "deserialize_count")]
    pub drift_interval_seconds: u64,
    #[serde(default = "default_history_capacity", deserialize_with = "deserialize_count")]
    pub history_capacity: u64,
    #[serde(default = "default_cache_ttl", deserialize_with = "deserialize_count")]
    pub cache_ttl_minutes: u64,
    /// Drop initial-sync results when another update landed while the lookup
    /// was in flight
    #[serde(default)]
    pub discard_stale_sync: bool,
    #[serde(default = "default_feed_poll", deserialize_with = "deserialize_count")]
    pub feed_poll_seconds: u64,
    /// Recorded feed to replay instead of polling the live feed
    #[serde(default)]
    pub replay_file: Option<String>,
    #[serde(default = "default_replay_interval", deserialize_with = "deserialize_count")]
    pub replay_interval_seconds: u64,
}

fn default_drift_interval() -> u64 {
    60
}

fn default_history_capacity() -> u64 {
    25
}

fn default_cache_ttl() -> u64 {
    15
}

fn default_feed_poll() -> u64 {
    5
}

fn default_replay_interval() -> u64 {
    10
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drift_interval_seconds: default_drift_interval(),
            history_capacity: default_history_capacity(),
            cache_ttl_minutes: default_cache_ttl(),
            discard_stale_sync: false,
            feed_poll_seconds: default_feed_poll(),
            replay_file: None,
            replay_interval_seconds: default_replay_interval(),
        }
    }
}

impl SyncConfig {
    pub fn drift_interval(&self) -> Duration {
        Duration::from_secs(self.drift_interval_seconds)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cache_ttl_minutes as i64)
    }

    pub fn feed_poll_interval(&self) -> Duration {
        Duration::from_secs(self.feed_poll_seconds)
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_secs(self.replay_interval_seconds)
    }

    pub fn capacity(&self) -> usize {
        self.history_capacity as usize
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_environment_timeout", deserialize_with = "deserialize_count")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries", deserialize_with = "deserialize_count")]
    pub max_retries: u64,
}

fn default_environment_timeout() -> u64 {
    20
}

fn default_max_retries() -> u64 {
    3
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_seconds: default_environment_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_schedule_timeout", deserialize_with = "deserialize_count")]
    pub timeout_seconds: u64,
}

fn default_schedule_timeout() -> u64 {
    30
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_seconds: default_schedule_timeout(),
        }
    }
}

/// Custom deserializer that handles counts as both number and string
///
/// Accepts:
/// - `drift_interval_seconds: 60` (number)
/// - `drift_interval_seconds: "60"` (string that parses to number)
/// - `drift_interval_seconds: ${DRIFT_SECONDS}` (env var substituted to either)
fn deserialize_count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CountValue {
        Number(u64),
        String(String),
    }

    match CountValue::deserialize(deserializer)? {
        CountValue::Number(n) => Ok(n),
        CountValue::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom(format!("Invalid count: '{}'", s))),
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML document, substituting `${VAR}` references
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - A non-empty location
    /// - Positive farm size and non-negative pump flow
    /// - Positive time intervals and history capacity
    /// - Valid URL formats for every configured endpoint
    fn validate(&self) -> Result<()> {
        let farm = &self.farm;

        if farm.location.trim().is_empty() {
            return Err(AppError::Config("Farm location cannot be empty".to_string()));
        }

        if !(farm.farm_size.is_finite() && farm.farm_size > 0.0) {
            return Err(AppError::Config(format!(
                "Farm size must be a positive number of hectares, got {}",
                farm.farm_size
            )));
        }

        if !(farm.pump_flow_rate.is_finite() && farm.pump_flow_rate >= 0.0) {
            return Err(AppError::Config(format!(
                "Pump flow rate must be zero or positive, got {}",
                farm.pump_flow_rate
            )));
        }

        // Zero total flow is allowed but leaves every pump duration at 0
        if farm.total_flow_rate() == 0.0 {
            tracing::warn!(
                "Total pump flow rate is 0 ({} pumps at {} m³/h); pump durations will read 0",
                farm.number_of_pumps,
                farm.pump_flow_rate
            );
        }

        if self.sync.drift_interval_seconds == 0 {
            return Err(AppError::Config(
                "Sync drift_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.sync.history_capacity == 0 {
            return Err(AppError::Config(
                "Sync history_capacity must be at least 1".to_string(),
            ));
        }

        if self.sync.history_capacity > 10_000 {
            return Err(AppError::Config(format!(
                "Sync history_capacity {} seems too high, maximum recommended is 10000",
                self.sync.history_capacity
            )));
        }

        if self.sync.feed_poll_seconds == 0 {
            return Err(AppError::Config(
                "Sync feed_poll_seconds must be greater than 0".to_string(),
            ));
        }

        if self.sync.replay_interval_seconds == 0 {
            return Err(AppError::Config(
                "Sync replay_interval_seconds must be greater than 0".to_string(),
            ));
        }

        let endpoints = [
            ("farm.feed.url", farm.feed.url.as_deref()),
            ("environment.base_url", self.environment.base_url.as_deref()),
            ("schedule.base_url", self.schedule.base_url.as_deref()),
        ];
        for (field, value) in endpoints {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                validate_url(field, value)?;
            }
        }

        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| AppError::Config(format!("Invalid {} '{}': {}", field, value, e)))?;

    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return Err(AppError::Config(format!(
            "{} must use HTTP or HTTPS, got: {}",
            field,
            parsed.scheme()
        )));
    }

    if parsed.scheme() == "http" {
        tracing::warn!("{} uses plain HTTP: {}", field, value);
    }

    Ok(())
}

fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| AppError::Config(format!("Invalid substitution pattern: {}", e)))?;

    let mut missing_vars = Vec::new();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                missing_vars.push(var_name.to_string());
            }
        }
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root (copy .env.example)\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or set {} in your environment before running",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}
