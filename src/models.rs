use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CropType {
    Wheat,
    Rice,
    Maize,
    Cotton,
    Vegetables,
    Fruits,
}

impl CropType {
    pub const ALL: [CropType; 6] = [
        CropType::Wheat,
        CropType::Rice,
        CropType::Maize,
        CropType::Cotton,
        CropType::Vegetables,
        CropType::Fruits,
    ];
}

impl fmt::Display for CropType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CropType::Wheat => "Wheat",
            CropType::Rice => "Rice",
            CropType::Maize => "Maize",
            CropType::Cotton => "Cotton",
            CropType::Vegetables => "Vegetables",
            CropType::Fruits => "Fruits",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrrigationMethod {
    #[serde(alias = "Drip Irrigation")]
    Drip,
    #[serde(alias = "Sprinkler Irrigation")]
    Sprinkler,
    #[serde(alias = "Flood Irrigation")]
    Flood,
    #[serde(alias = "Smart Drip (AI Controlled)", alias = "Smart Drip")]
    SmartDrip,
}

impl IrrigationMethod {
    pub const ALL: [IrrigationMethod; 4] = [
        IrrigationMethod::Drip,
        IrrigationMethod::Sprinkler,
        IrrigationMethod::Flood,
        IrrigationMethod::SmartDrip,
    ];
}

impl fmt::Display for IrrigationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IrrigationMethod::Drip => "Drip Irrigation",
            IrrigationMethod::Sprinkler => "Sprinkler Irrigation",
            IrrigationMethod::Flood => "Flood Irrigation",
            IrrigationMethod::SmartDrip => "Smart Drip (AI Controlled)",
        };
        f.write_str(name)
    }
}

/// Growing season. Advisory only; the budget formula does not read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    #[serde(alias = "Kharif (Monsoon)")]
    Kharif,
    #[serde(alias = "Rabi (Winter)")]
    Rabi,
    #[serde(alias = "Zaid (Summer)")]
    Zaid,
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Season::Kharif => "Kharif (Monsoon)",
            Season::Rabi => "Rabi (Winter)",
            Season::Zaid => "Zaid (Summer)",
        };
        f.write_str(name)
    }
}

const DEFAULT_FEED_PATH: &str = "soilMoisture";

/// Connection parameters for the live telemetry feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedSettings {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

impl FeedSettings {
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    pub fn data_path(&self) -> &str {
        self.path
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_FEED_PATH)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmSettings {
    pub location: String,
    /// Hectares
    pub farm_size: f64,
    pub crop: CropType,
    pub irrigation_method: IrrigationMethod,
    pub season: Season,
    #[serde(default = "default_number_of_pumps")]
    pub number_of_pumps: u32,
    /// m³/h per pump
    pub pump_flow_rate: f64,
    #[serde(default)]
    pub feed: FeedSettings,
}

fn default_number_of_pumps() -> u32 {
    1
}

impl FarmSettings {
    /// Combined flow of all pumps in m³/h
    pub fn total_flow_rate(&self) -> f64 {
        f64::from(self.number_of_pumps) * self.pump_flow_rate
    }

    /// Whether switching from `other` to `self` requires a fresh sync session
    pub fn requires_resync(&self, other: &FarmSettings) -> bool {
        self.location != other.location || self.feed != other.feed
    }
}

impl Default for FarmSettings {
    fn default() -> Self {
        Self {
            location: "Nashik, Maharashtra".to_string(),
            farm_size: 2.5,
            crop: CropType::Fruits,
            irrigation_method: IrrigationMethod::Drip,
            season: Season::Zaid,
            number_of_pumps: 1,
            pump_flow_rate: 10.0,
            feed: FeedSettings::default(),
        }
    }
}

/// One time-stamped observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorData {
    pub timestamp: String,
    /// Percent
    pub soil_moisture: f64,
    /// mm
    pub rainfall: f64,
    /// Meters below surface
    pub groundwater_level: f64,
    /// Celsius
    pub temperature: f64,
    /// Percent
    pub humidity: f64,
}

impl SensorData {
    /// Field-by-field merge: fields present in `update` win, everything else
    /// is copied from `self`. The timestamp is always replaced.
    pub fn merged(&self, update: &SensorUpdate, timestamp: String) -> SensorData {
        SensorData {
            timestamp,
            soil_moisture: update.soil_moisture.unwrap_or(self.soil_moisture),
            rainfall: update.rainfall.unwrap_or(self.rainfall),
            groundwater_level: update.groundwater_level.unwrap_or(self.groundwater_level),
            temperature: update.temperature.unwrap_or(self.temperature),
            humidity: update.humidity.unwrap_or(self.humidity),
        }
    }
}

/// Partial sample as delivered by the feed, the environmental lookup or a
/// manual edit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorUpdate {
    #[serde(default, deserialize_with = "deserialize_reading", skip_serializing_if = "Option::is_none")]
    pub soil_moisture: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_reading", skip_serializing_if = "Option::is_none")]
    pub rainfall: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_reading", skip_serializing_if = "Option::is_none")]
    pub groundwater_level: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_reading", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_reading", skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
}

impl SensorUpdate {
    pub fn soil_moisture(value: f64) -> Self {
        Self {
            soil_moisture: Some(value),
            ..Self::default()
        }
    }

    /// Sample used when the environmental lookup is unavailable
    pub fn environmental_fallback() -> Self {
        Self {
            soil_moisture: None,
            rainfall: Some(0.0),
            groundwater_level: Some(10.0),
            temperature: Some(25.0),
            humidity: Some(50.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.soil_moisture.is_none()
            && self.rainfall.is_none()
            && self.groundwater_level.is_none()
            && self.temperature.is_none()
            && self.humidity.is_none()
    }
}

/// Custom deserializer for optional readings
///
/// Accepts:
/// - `"soilMoisture": 42.5` (number)
/// - `"soilMoisture": "42.5"` (string that parses to number, as some
///   microcontroller firmwares send)
/// - `"soilMoisture": null`
fn deserialize_reading<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ReadingValue {
        Number(f64),
        Text(String),
    }

    match Option::<ReadingValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(ReadingValue::Number(n)) => Ok(Some(n)),
        Some(ReadingValue::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("Invalid sensor reading: '{}'", s))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroundwaterStatus {
    /// Water table deeper than 50 m
    Critical,
    Stable,
    /// Water table shallower than 15 m
    Abundant,
}

impl fmt::Display for GroundwaterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroundwaterStatus::Critical => "Critical",
            GroundwaterStatus::Stable => "Stable",
            GroundwaterStatus::Abundant => "Abundant",
        };
        f.write_str(name)
    }
}

/// Category of the recommendation attached to a budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Advice {
    UrgentIrrigation,
    ScheduledIrrigation,
    RainfallSufficient,
    Optimal,
}

/// Derived irrigation decision. All volumes in m³, durations in hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterBudget {
    pub available_water: f64,
    pub crop_demand: f64,
    pub rainfall_contribution: f64,
    pub groundwater_status: GroundwaterStatus,
    pub balance: f64,
    pub recommendation: String,
    pub advice: Advice,
    pub pump_duration: f64,
}

impl WaterBudget {
    pub fn is_deficit(&self) -> bool {
        self.balance < 0.0
    }
}

/// Everything a consumer needs to render or reason about the current state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmSnapshot {
    pub settings: FarmSettings,
    pub sample: SensorData,
    pub budget: WaterBudget,
    pub manual_override: bool,
    pub revision: u64,
}

/// Wall-clock instant rendered the way sample timestamps are displayed
pub fn display_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}
