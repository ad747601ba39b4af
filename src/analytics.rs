//! Derived indicators over a computed budget

use crate::models::{IrrigationMethod, WaterBudget};
use serde::Serialize;

/// Value of one cubic meter of pumping avoided
const SAVINGS_PER_CUBIC_METER: f64 = 0.45;

/// Carbon reduction per unit of pumping savings (%)
const CARBON_PER_SAVING: f64 = 0.12;

const SURPLUS_EFFICIENCY_BONUS: f64 = 2.5;
const DEFICIT_EFFICIENCY_PENALTY: f64 = 5.2;

/// Deficit beyond which yield impact turns negative (m³)
const SEVERE_DEFICIT: f64 = -50.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    /// Percent
    pub water_use_efficiency: f64,
    pub pumping_savings: f64,
    /// Percent
    pub yield_impact: f64,
    /// Percent
    pub carbon_reduction: f64,
}

/// Where the day's water comes from (m³)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetBreakdown {
    pub soil_storage: f64,
    pub rainfall: f64,
    pub groundwater_used: f64,
}

fn efficiency_base(method: IrrigationMethod) -> f64 {
    match method {
        IrrigationMethod::Flood => 62.0,
        IrrigationMethod::Sprinkler => 78.0,
        IrrigationMethod::Drip => 91.0,
        IrrigationMethod::SmartDrip => 96.0,
    }
}

pub fn water_use_efficiency(method: IrrigationMethod, budget: &WaterBudget) -> f64 {
    let adjustment = if budget.balance >= 0.0 {
        SURPLUS_EFFICIENCY_BONUS
    } else {
        -DEFICIT_EFFICIENCY_PENALTY
    };
    efficiency_base(method) + adjustment
}

pub fn pumping_savings(budget: &WaterBudget) -> f64 {
    (budget.rainfall_contribution * SAVINGS_PER_CUBIC_METER).round()
}

pub fn yield_impact(budget: &WaterBudget) -> f64 {
    if budget.balance < SEVERE_DEFICIT {
        -8.0
    } else if budget.balance < 0.0 {
        4.0
    } else {
        14.0
    }
}

pub fn analyze(method: IrrigationMethod, budget: &WaterBudget) -> Analytics {
    let savings = pumping_savings(budget);
    Analytics {
        water_use_efficiency: water_use_efficiency(method, budget),
        pumping_savings: savings,
        yield_impact: yield_impact(budget),
        carbon_reduction: savings * CARBON_PER_SAVING,
    }
}

pub fn breakdown(budget: &WaterBudget) -> BudgetBreakdown {
    BudgetBreakdown {
        soil_storage: budget.available_water - budget.rainfall_contribution,
        rainfall: budget.rainfall_contribution,
        groundwater_used: if budget.is_deficit() {
            budget.balance.abs()
        } else {
            0.0
        },
    }
}

/// Pump run time as "2h 5m", or "45 mins" up to an hour
pub fn format_pump_duration(hours: f64) -> String {
    let minutes = (hours * 60.0).round().max(0.0) as u64;
    if minutes > 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{} mins", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Advice, GroundwaterStatus};

    fn budget(available: f64, demand: f64, rainfall: f64) -> WaterBudget {
        WaterBudget {
            available_water: available,
            crop_demand: demand,
            rainfall_contribution: rainfall,
            groundwater_status: GroundwaterStatus::Stable,
            balance: available - demand,
            recommendation: String::new(),
            advice: Advice::Optimal,
            pump_duration: 0.0,
        }
    }

    #[test]
    fn test_efficiency_by_method_and_balance() {
        let surplus = budget(300.0, 200.0, 0.0);
        let deficit = budget(100.0, 200.0, 0.0);

        assert_eq!(water_use_efficiency(IrrigationMethod::Drip, &surplus), 93.5);
        assert!((water_use_efficiency(IrrigationMethod::Flood, &deficit) - 56.8).abs() < 1e-9);
        assert_eq!(water_use_efficiency(IrrigationMethod::SmartDrip, &surplus), 98.5);
    }

    #[test]
    fn test_savings_and_carbon() {
        let report = analyze(IrrigationMethod::Sprinkler, &budget(400.0, 200.0, 125.0));
        // 125 * 0.45 = 56.25
        assert_eq!(report.pumping_savings, 56.0);
        assert!((report.carbon_reduction - 6.72).abs() < 1e-9);
    }

    #[test]
    fn test_yield_impact_bands() {
        assert_eq!(yield_impact(&budget(100.0, 200.0, 0.0)), -8.0);
        assert_eq!(yield_impact(&budget(160.0, 200.0, 0.0)), 4.0);
        assert_eq!(yield_impact(&budget(150.0, 200.0, 0.0)), 4.0);
        assert_eq!(yield_impact(&budget(200.0, 200.0, 0.0)), 14.0);
    }

    #[test]
    fn test_breakdown() {
        let parts = breakdown(&budget(318.75, 450.625, 25.0));
        assert_eq!(parts.soil_storage, 293.75);
        assert_eq!(parts.rainfall, 25.0);
        assert!((parts.groundwater_used - 131.875).abs() < 1e-9);

        assert_eq!(breakdown(&budget(300.0, 200.0, 0.0)).groundwater_used, 0.0);
    }

    #[test]
    fn test_format_pump_duration() {
        assert_eq!(format_pump_duration(0.0), "0 mins");
        assert_eq!(format_pump_duration(0.75), "45 mins");
        assert_eq!(format_pump_duration(1.0), "60 mins");
        assert_eq!(format_pump_duration(13.1875), "13h 11m");
    }
}
