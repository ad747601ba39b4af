use crate::budget::coefficients::Coefficients;
use crate::models::{Advice, FarmSettings, GroundwaterStatus, SensorData, WaterBudget};

/// 1 mm of rain over 1 ha is 10 m³
const RAINFALL_M3_PER_MM_HA: f64 = 10.0;

/// Water held by 1 ha of soil at 100% moisture, in m³
const SOIL_CAPACITY_M3_PER_HA: f64 = 500.0;

/// Water table deeper than this (m below surface) is critical
const GROUNDWATER_CRITICAL_DEPTH: f64 = 50.0;

/// Water table shallower than this (m below surface) is abundant
const GROUNDWATER_ABUNDANT_DEPTH: f64 = 15.0;

/// Soil moisture (%) under which irrigation is urgent regardless of balance
const URGENT_MOISTURE: f64 = 30.0;

/// Rainfall (mm) above which irrigation can be skipped
const SIGNIFICANT_RAINFALL: f64 = 10.0;

/// Compute the water budget with the standard coefficient tables
pub fn compute_budget(settings: &FarmSettings, sample: &SensorData) -> WaterBudget {
    compute_budget_with(&Coefficients::standard(), settings, sample)
}

/// Compute the water budget for one sample.
///
/// Pure and total: malformed inputs (negative sizes, out-of-range moisture)
/// flow through into the result rather than being rejected.
pub fn compute_budget_with(
    coefficients: &Coefficients,
    settings: &FarmSettings,
    sample: &SensorData,
) -> WaterBudget {
    let farm_size = settings.farm_size;

    let crop_demand = coefficients.crop_need(settings.crop) * farm_size
        / coefficients.efficiency(settings.irrigation_method);
    let rainfall_contribution = sample.rainfall * farm_size * RAINFALL_M3_PER_MM_HA;
    let soil_water = (sample.soil_moisture / 100.0) * SOIL_CAPACITY_M3_PER_HA * farm_size;
    let available_water = soil_water + rainfall_contribution;

    let groundwater_status = classify_groundwater(sample.groundwater_level);
    let balance = available_water - crop_demand;
    let pump_duration = pump_hours(balance, settings.total_flow_rate());
    let (advice, recommendation) = recommend(sample, balance, pump_duration);

    WaterBudget {
        available_water,
        crop_demand,
        rainfall_contribution,
        groundwater_status,
        balance,
        recommendation,
        advice,
        pump_duration,
    }
}

/// Classify water-table depth. Deep water is scarce, so depth > 50 m is
/// Critical and depth < 15 m is Abundant; both bounds are exclusive.
pub fn classify_groundwater(depth_m: f64) -> GroundwaterStatus {
    if depth_m > GROUNDWATER_CRITICAL_DEPTH {
        GroundwaterStatus::Critical
    } else if depth_m < GROUNDWATER_ABUNDANT_DEPTH {
        GroundwaterStatus::Abundant
    } else {
        GroundwaterStatus::Stable
    }
}

fn pump_hours(balance: f64, total_flow_rate: f64) -> f64 {
    if balance < 0.0 && total_flow_rate > 0.0 {
        balance.abs() / total_flow_rate
    } else {
        0.0
    }
}

fn recommend(sample: &SensorData, balance: f64, pump_duration: f64) -> (Advice, String) {
    if sample.soil_moisture < URGENT_MOISTURE {
        (
            Advice::UrgentIrrigation,
            format!(
                "Urgent: Irrigate {:.1} m³ immediately. Run pumps for {:.1} hours.",
                balance.abs(),
                pump_duration
            ),
        )
    } else if balance < 0.0 {
        (
            Advice::ScheduledIrrigation,
            format!(
                "Scheduled: Apply {:.1} m³ water today. Run pumps for {:.1} hours.",
                balance.abs(),
                pump_duration
            ),
        )
    } else if sample.rainfall > SIGNIFICANT_RAINFALL {
        (
            Advice::RainfallSufficient,
            "No irrigation needed. Significant rainfall detected.".to_string(),
        )
    } else {
        (
            Advice::Optimal,
            "Soil moisture optimal. No irrigation required today.".to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CropType, IrrigationMethod};

    const EPSILON: f64 = 1e-9;

    fn settings() -> FarmSettings {
        FarmSettings {
            farm_size: 2.5,
            crop: CropType::Fruits,
            irrigation_method: IrrigationMethod::Drip,
            number_of_pumps: 1,
            pump_flow_rate: 10.0,
            ..FarmSettings::default()
        }
    }

    fn sample(soil_moisture: f64, rainfall: f64, groundwater_level: f64) -> SensorData {
        SensorData {
            timestamp: "12:00".to_string(),
            soil_moisture,
            rainfall,
            groundwater_level,
            temperature: 28.0,
            humidity: 60.0,
        }
    }

    #[test]
    fn test_surplus_example() {
        let budget = compute_budget(&settings(), &sample(50.0, 0.0, 25.0));

        assert!((budget.crop_demand - 70.0 * 2.5 / 0.9).abs() < EPSILON);
        assert!((budget.crop_demand - 194.44).abs() < 0.01);
        assert_eq!(budget.rainfall_contribution, 0.0);
        assert_eq!(budget.available_water, 625.0);
        assert!((budget.balance - 430.56).abs() < 0.01);
        assert_eq!(budget.pump_duration, 0.0);
        assert_eq!(budget.groundwater_status, GroundwaterStatus::Stable);
        assert_eq!(budget.advice, Advice::Optimal);
        assert_eq!(
            budget.recommendation,
            "Soil moisture optimal. No irrigation required today."
        );
    }

    #[test]
    fn test_low_moisture_still_surplus() {
        // 20% moisture on 2.5 ha holds 250 m³, more than the 194.44 m³ demand
        let budget = compute_budget(&settings(), &sample(20.0, 0.0, 25.0));
        assert_eq!(budget.available_water, 250.0);
        assert!((budget.balance - 55.56).abs() < 0.01);
        assert_eq!(budget.pump_duration, 0.0);
        assert_eq!(budget.advice, Advice::UrgentIrrigation);
    }

    #[test]
    fn test_deficit_example() {
        let budget = compute_budget(&settings(), &sample(5.0, 0.0, 25.0));

        assert_eq!(budget.available_water, 62.5);
        assert!((budget.balance + 131.94).abs() < 0.01);
        assert!((budget.pump_duration - 13.19).abs() < 0.01);
        assert_eq!(budget.advice, Advice::UrgentIrrigation);
        assert_eq!(
            budget.recommendation,
            "Urgent: Irrigate 131.9 m³ immediately. Run pumps for 13.2 hours."
        );
    }

    #[test]
    fn test_scheduled_irrigation_when_moist_but_deficit() {
        let mut settings = settings();
        settings.crop = CropType::Rice;
        settings.irrigation_method = IrrigationMethod::Flood;
        // demand = 120 * 2.5 / 0.5 = 600; available = 0.36 * 500 * 2.5 = 450
        let budget = compute_budget(&settings, &sample(36.0, 0.0, 25.0));

        assert!((budget.balance + 150.0).abs() < EPSILON);
        assert!((budget.pump_duration - 15.0).abs() < EPSILON);
        assert_eq!(budget.advice, Advice::ScheduledIrrigation);
        assert_eq!(
            budget.recommendation,
            "Scheduled: Apply 150.0 m³ water today. Run pumps for 15.0 hours."
        );
    }

    #[test]
    fn test_rainfall_message_on_surplus() {
        let budget = compute_budget(&settings(), &sample(50.0, 12.0, 25.0));
        assert_eq!(budget.rainfall_contribution, 300.0);
        assert_eq!(budget.available_water, 925.0);
        assert_eq!(budget.advice, Advice::RainfallSufficient);
        assert_eq!(
            budget.recommendation,
            "No irrigation needed. Significant rainfall detected."
        );
    }

    #[test]
    fn test_urgent_wins_over_surplus() {
        // Moisture 25 with enough rain to leave a surplus
        let budget = compute_budget(&settings(), &sample(25.0, 2.0, 25.0));
        assert!(budget.balance > 0.0);
        assert_eq!(budget.pump_duration, 0.0);
        assert_eq!(budget.advice, Advice::UrgentIrrigation);
        assert!(budget.recommendation.starts_with("Urgent: Irrigate"));
        assert!(budget.recommendation.contains("Run pumps for 0.0 hours"));
    }

    #[test]
    fn test_groundwater_classification_boundaries() {
        assert_eq!(classify_groundwater(60.0), GroundwaterStatus::Critical);
        assert_eq!(classify_groundwater(30.0), GroundwaterStatus::Stable);
        assert_eq!(classify_groundwater(5.0), GroundwaterStatus::Abundant);
        assert_eq!(classify_groundwater(50.0), GroundwaterStatus::Stable);
        assert_eq!(classify_groundwater(15.0), GroundwaterStatus::Stable);
        assert_eq!(classify_groundwater(50.0001), GroundwaterStatus::Critical);
        assert_eq!(classify_groundwater(14.9999), GroundwaterStatus::Abundant);
    }

    #[test]
    fn test_zero_flow_rate_yields_zero_duration() {
        let mut settings = settings();
        settings.pump_flow_rate = 0.0;
        let budget = compute_budget(&settings, &sample(5.0, 0.0, 25.0));
        assert!(budget.balance < 0.0);
        assert_eq!(budget.pump_duration, 0.0);

        settings.pump_flow_rate = 10.0;
        settings.number_of_pumps = 0;
        let budget = compute_budget(&settings, &sample(5.0, 0.0, 25.0));
        assert_eq!(budget.pump_duration, 0.0);
    }

    #[test]
    fn test_pump_duration_scales_with_pump_count() {
        let mut settings = settings();
        settings.number_of_pumps = 4;
        let budget = compute_budget(&settings, &sample(5.0, 0.0, 25.0));
        assert!((budget.pump_duration - budget.balance.abs() / 40.0).abs() < EPSILON);
    }

    #[test]
    fn test_identities_hold_across_inputs() {
        for crop in CropType::ALL {
            for method in IrrigationMethod::ALL {
                for &moisture in &[0.0, 12.5, 29.9, 30.0, 55.0, 100.0, 130.0] {
                    for &rain in &[0.0, 4.2, 10.0, 10.1, 40.0] {
                        let settings = FarmSettings {
                            crop,
                            irrigation_method: method,
                            farm_size: 3.7,
                            number_of_pumps: 2,
                            pump_flow_rate: 12.5,
                            ..FarmSettings::default()
                        };
                        let s = sample(moisture, rain, 22.0);
                        let budget = compute_budget(&settings, &s);
                        let soil_water = s.soil_moisture / 100.0 * 500.0 * settings.farm_size;

                        assert_eq!(budget.available_water, soil_water + budget.rainfall_contribution);
                        assert!(
                            (budget.available_water - budget.rainfall_contribution - soil_water).abs()
                                < EPSILON
                        );
                        assert_eq!(budget.balance, budget.available_water - budget.crop_demand);
                        if budget.balance >= 0.0 {
                            assert_eq!(budget.pump_duration, 0.0);
                        } else {
                            assert_eq!(budget.pump_duration, budget.balance.abs() / 25.0);
                            assert!(budget.pump_duration > 0.0);
                        }
                        assert_eq!(budget, compute_budget(&settings, &s));
                    }
                }
            }
        }
    }

    #[test]
    fn test_coefficient_overrides_flow_through() {
        let coefficients = Coefficients::standard().with_crop_need(CropType::Fruits, 0.0);
        let budget = compute_budget_with(&coefficients, &settings(), &sample(50.0, 0.0, 25.0));
        assert_eq!(budget.crop_demand, 0.0);
        assert_eq!(budget.balance, 625.0);
    }

    #[test]
    fn test_negative_farm_size_propagates() {
        let mut settings = settings();
        settings.farm_size = -1.0;
        let budget = compute_budget(&settings, &sample(50.0, 0.0, 25.0));
        assert!(budget.available_water < 0.0);
        assert!(budget.crop_demand < 0.0);
    }
}
