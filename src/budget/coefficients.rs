use crate::models::{CropType, IrrigationMethod};
use std::collections::HashMap;

impl CropType {
    /// Base daily water need in m³ per hectare
    pub const fn daily_water_need(self) -> f64 {
        match self {
            CropType::Wheat => 40.0,
            CropType::Rice => 120.0,
            CropType::Maize => 60.0,
            CropType::Cotton => 80.0,
            CropType::Vegetables => 50.0,
            CropType::Fruits => 70.0,
        }
    }
}

impl IrrigationMethod {
    /// Fraction of applied water that reaches the crop, in (0, 1]
    pub const fn efficiency(self) -> f64 {
        match self {
            IrrigationMethod::Flood => 0.50,
            IrrigationMethod::Sprinkler => 0.75,
            IrrigationMethod::Drip => 0.90,
            IrrigationMethod::SmartDrip => 0.95,
        }
    }
}

/// Coefficient lookup used by the calculator.
///
/// `Coefficients::standard()` reproduces the fixed production tables. Entries
/// can be overridden individually for experiments and tests.
#[derive(Debug, Clone, Default)]
pub struct Coefficients {
    crop_overrides: HashMap<CropType, f64>,
    efficiency_overrides: HashMap<IrrigationMethod, f64>,
}

impl Coefficients {
    pub fn standard() -> Self {
        Self::default()
    }

    pub fn with_crop_need(mut self, crop: CropType, m3_per_ha_day: f64) -> Self {
        self.crop_overrides.insert(crop, m3_per_ha_day);
        self
    }

    pub fn with_efficiency(mut self, method: IrrigationMethod, efficiency: f64) -> Self {
        self.efficiency_overrides.insert(method, efficiency);
        self
    }

    pub fn crop_need(&self, crop: CropType) -> f64 {
        self.crop_overrides
            .get(&crop)
            .copied()
            .unwrap_or_else(|| crop.daily_water_need())
    }

    pub fn efficiency(&self, method: IrrigationMethod) -> f64 {
        self.efficiency_overrides
            .get(&method)
            .copied()
            .unwrap_or_else(|| method.efficiency())
    }
}
