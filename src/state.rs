use crate::budget::{compute_budget_with, Coefficients};
use crate::error::Result;
use crate::history::{MergePolicy, SensorHistory};
use crate::models::{FarmSettings, FarmSnapshot, SensorUpdate, WaterBudget};
use tracing::{debug, info, warn};

/// A change to the current sample
#[derive(Debug, Clone, PartialEq)]
pub enum SensorCommand {
    /// Initial-sync enrichment of the current snapshot: seeds if needed and
    /// merges in place.
    Enrich(SensorUpdate),
    /// Live feed data: leaves manual mode, seeds if needed and slides the
    /// window.
    LiveUpdate(SensorUpdate),
    /// Simulated drift of a seeded history: slides the window and keeps the
    /// current mode.
    Drift(SensorUpdate),
    /// Manual edit: enters manual mode and merges in place.
    Override(SensorUpdate),
    /// Return to live mode without touching data.
    ClearOverride,
}

/// Settings, sensor history and the budget derived from them.
///
/// The budget is recomputed on every tail change and every settings save, so
/// it never lags behind its inputs.
pub struct FarmState {
    settings: FarmSettings,
    history: SensorHistory,
    coefficients: Coefficients,
    budget: Option<WaterBudget>,
}

impl FarmState {
    pub fn new(settings: FarmSettings, history: SensorHistory) -> Self {
        Self::with_coefficients(settings, history, Coefficients::standard())
    }

    pub fn with_coefficients(
        settings: FarmSettings,
        history: SensorHistory,
        coefficients: Coefficients,
    ) -> Self {
        warn_on_zero_flow(&settings);
        let mut state = Self {
            settings,
            history,
            coefficients,
            budget: None,
        };
        state.recompute();
        state
    }

    /// Apply `command` and return the fresh budget when the tail changed
    pub fn apply(&mut self, command: SensorCommand) -> Result<Option<&WaterBudget>> {
        match command {
            SensorCommand::Enrich(update) => {
                self.history.seed();
                self.history.apply_partial(&update, MergePolicy::InPlace)?;
            }
            SensorCommand::LiveUpdate(update) => {
                if self.history.is_manual() {
                    info!("Live data received, leaving manual override");
                    self.history.clear_override();
                }
                self.history.seed();
                self.history.apply_partial(&update, MergePolicy::LiveAppend)?;
            }
            SensorCommand::Drift(update) => {
                self.history.apply_partial(&update, MergePolicy::LiveAppend)?;
            }
            SensorCommand::Override(update) => {
                self.history.override_with(&update)?;
            }
            SensorCommand::ClearOverride => {
                self.history.clear_override();
                return Ok(None);
            }
        }

        self.recompute();
        Ok(self.budget.as_ref())
    }

    /// Replace the settings and recompute immediately
    pub fn save_settings(&mut self, settings: FarmSettings) -> Option<&WaterBudget> {
        warn_on_zero_flow(&settings);
        self.settings = settings;
        self.recompute();
        self.budget.as_ref()
    }

    fn recompute(&mut self) {
        self.budget = self
            .history
            .current_sample()
            .ok()
            .map(|sample| compute_budget_with(&self.coefficients, &self.settings, sample));

        if let Some(budget) = &self.budget {
            debug!(
                "Budget recomputed: balance {:.1} m³, pump {:.1} h, groundwater {}",
                budget.balance, budget.pump_duration, budget.groundwater_status
            );
        }
    }

    pub fn snapshot(&self) -> Option<FarmSnapshot> {
        let sample = self.history.current_sample().ok()?;
        let budget = self.budget.as_ref()?;
        Some(FarmSnapshot {
            settings: self.settings.clone(),
            sample: sample.clone(),
            budget: budget.clone(),
            manual_override: self.history.is_manual(),
            revision: self.history.revision(),
        })
    }

    pub fn settings(&self) -> &FarmSettings {
        &self.settings
    }

    pub fn history(&self) -> &SensorHistory {
        &self.history
    }

    pub fn budget(&self) -> Option<&WaterBudget> {
        self.budget.as_ref()
    }
}

fn warn_on_zero_flow(settings: &FarmSettings) {
    if settings.total_flow_rate() <= 0.0 {
        warn!(
            "Total pump flow rate is {} m³/h ({} pumps at {} m³/h); pump durations will read 0",
            settings.total_flow_rate(),
            settings.number_of_pumps,
            settings.pump_flow_rate
        );
    }
}
