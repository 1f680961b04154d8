//! Reference dispatcher standing in for the external optimizer.

use std::collections::BTreeMap;

use crate::config::{AgentConfig, ModelConfig};
use crate::devices::{
    AssetKind, EvSizing, StepContext, StorageSizing, carrier_variable_name, variable_name,
};
use crate::error::ModelError;
use crate::model::{Expression, LinearModel, OptimizationModel};

/// Target-following dispatcher.
///
/// Solves a built model with `good_lp` minimising the summed tracking
/// deviation of the agent's storage plants. In economic mode there is no
/// deviation to minimise and any feasible point is returned.
#[derive(Debug, Default, Clone, Copy)]
pub struct TargetFollower;

impl TargetFollower {
    /// Returns a value for every variable in `model`, keyed by name.
    pub fn dispatch(
        &self,
        model: &LinearModel,
        agent: &AgentConfig,
    ) -> Result<BTreeMap<String, f64>, ModelError> {
        let mut deviation = Vec::new();
        for plant in &agent.plants {
            let kind = plant.kind()?;
            if !kind.has_storage() {
                continue;
            }
            for side in ["deviation_pos", "deviation_neg"] {
                if let Some(var) = model.variable(&variable_name(&plant.id, kind.tag(), side)) {
                    deviation.push(var);
                }
            }
        }
        let objective: Expression = deviation.into_iter().sum();
        model.solve(objective)
    }

    /// State of charge at the start of the next step for every storage plant
    /// of `agent`, given the dispatched `values`.
    ///
    /// EVs start from their supplied SOC net of the step's trip consumption.
    pub fn advance(
        &self,
        agent: &AgentConfig,
        ctx: &StepContext,
        values: &BTreeMap<String, f64>,
        config: &ModelConfig,
    ) -> Result<BTreeMap<String, f64>, ModelError> {
        let step_hours = ctx.step_hours(config);
        let mut socs = BTreeMap::new();

        for plant in &agent.plants {
            let kind = plant.kind()?;
            if !kind.has_storage() {
                continue;
            }
            let (capacity, efficiency, soc) = if kind == AssetKind::Ev {
                let sizing: EvSizing = plant.sizing()?;
                let consumed = ctx.forecast.require(&plant.id, "energy_consumed")?;
                (
                    sizing.capacity,
                    sizing.charging_efficiency,
                    ctx.require_soc(&plant.id)? - consumed,
                )
            } else {
                let sizing: StorageSizing = plant.sizing()?;
                (
                    sizing.capacity,
                    sizing.efficiency,
                    ctx.require_soc(&plant.id)?,
                )
            };

            let name = carrier_variable_name(&plant.id, kind, kind.carrier(), config);
            let power = values
                .get(&name)
                .copied()
                .ok_or_else(|| ModelError::missing(format!("no dispatched value for `{name}`")))?;
            socs.insert(
                plant.id.clone(),
                next_soc(soc, power, step_hours, efficiency, capacity),
            );
        }

        Ok(socs)
    }
}

/// Advances a state of charge by one step at constant `power`.
///
/// Charging stores `p·Δt·η`, discharging draws `p·Δt/η`; the result is
/// clamped to `[0, capacity]`.
pub fn next_soc(soc: f64, power: f64, step_hours: f64, efficiency: f64, capacity: f64) -> f64 {
    let delta = if power >= 0.0 {
        power * step_hours * efficiency
    } else {
        power * step_hours / efficiency
    };
    (soc + delta).min(capacity).max(0.0)
}
