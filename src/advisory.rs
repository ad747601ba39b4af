//! Inputs for advisory consumers: threshold alerts on the current sample and
//! the farm-context text an assistant prompt is built on.

use crate::models::{FarmSettings, SensorData, WaterBudget};
use std::fmt::Write;

/// Moisture below this is critically low (%)
pub const CRITICAL_LOW_MOISTURE: f64 = 30.0;

/// Moisture above this is critically high (%)
pub const CRITICAL_HIGH_MOISTURE: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoistureAlert {
    CriticallyLow,
    CriticallyHigh,
}

impl MoistureAlert {
    pub fn message(&self) -> &'static str {
        match self {
            MoistureAlert::CriticallyLow => "Critical: Soil moisture is too low!",
            MoistureAlert::CriticallyHigh => "Critical: Soil moisture is too high!",
        }
    }

    /// Question to open an advisory conversation with
    pub fn suggested_question(&self) -> &'static str {
        match self {
            MoistureAlert::CriticallyLow => {
                "The soil moisture is critically low. What should I do to solve this immediately?"
            }
            MoistureAlert::CriticallyHigh => {
                "The soil moisture is critically high. What should I do to solve this immediately?"
            }
        }
    }
}

pub fn moisture_alert(sample: &SensorData) -> Option<MoistureAlert> {
    if sample.soil_moisture < CRITICAL_LOW_MOISTURE {
        Some(MoistureAlert::CriticallyLow)
    } else if sample.soil_moisture > CRITICAL_HIGH_MOISTURE {
        Some(MoistureAlert::CriticallyHigh)
    } else {
        None
    }
}

/// Farm, sensor and budget state as a plain-text block
pub fn farm_context(settings: &FarmSettings, sample: &SensorData, budget: &WaterBudget) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "Current Farm Context:");
    let _ = writeln!(out, "- Location: {}", settings.location);
    let _ = writeln!(out, "- Farm Size: {} hectares", settings.farm_size);
    let _ = writeln!(out, "- Crop: {}", settings.crop);
    let _ = writeln!(out, "- Irrigation Method: {}", settings.irrigation_method);
    let _ = writeln!(out, "- Season: {}", settings.season);
    let _ = writeln!(
        out,
        "- Pumps: {} pumps at {} m³/h each",
        settings.number_of_pumps, settings.pump_flow_rate
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Current Sensor Data:");
    let _ = writeln!(out, "- Soil Moisture: {}%", sample.soil_moisture);
    let _ = writeln!(out, "- Rainfall: {} mm", sample.rainfall);
    let _ = writeln!(
        out,
        "- Groundwater Level: {} m below surface",
        sample.groundwater_level
    );
    let _ = writeln!(out, "- Temperature: {}°C", sample.temperature);
    let _ = writeln!(out, "- Humidity: {}%", sample.humidity);
    let _ = writeln!(out);
    let _ = writeln!(out, "Current Water Budget:");
    let _ = writeln!(out, "- Available Water: {:.2} m³", budget.available_water);
    let _ = writeln!(out, "- Crop Demand: {:.2} m³", budget.crop_demand);
    let _ = writeln!(out, "- Water Balance: {:.2} m³", budget.balance);
    let _ = writeln!(out, "- Groundwater Status: {}", budget.groundwater_status);
    let _ = write!(out, "- Recommendation: {}", budget.recommendation);

    out
}
