//! The agent's interface to the outside: cleared market positions and the
//! balancing slack.

use tracing::debug;

use crate::config::{MarketConfig, ModelConfig};
use crate::devices::types::{BalanceTerm, Component, to_unit};
use crate::error::ModelError;
use crate::model::{Carrier, OptimizationModel, VarId, Variable};

/// Energy already committed on a market for this step, pinned at the
/// committed quantity. Imports are positive.
#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    agent_id: String,
    name: String,
    carrier: Carrier,
    committed: i64,
    var: Option<VarId>,
}

impl Market {
    pub fn new(agent_id: &str, market: &MarketConfig) -> Result<Self, ModelError> {
        let committed = to_unit(
            market.committed,
            &format!("committed quantity on `{}`", market.name),
        )?;
        Ok(Self {
            agent_id: agent_id.to_string(),
            name: market.name.clone(),
            carrier: market.carrier,
            committed,
            var: None,
        })
    }

    pub fn carrier(&self) -> Carrier {
        self.carrier
    }
}

impl Component for Market {
    fn define_variables(
        &mut self,
        model: &mut dyn OptimizationModel,
        config: &ModelConfig,
    ) -> Result<(), ModelError> {
        let name = format!(
            "{}_{}_{}",
            self.agent_id,
            self.name,
            config.carrier_tag(self.carrier)
        );
        let var = model.add_variable(
            Variable::pinned(name, self.committed as f64)
                .on(self.carrier)
                .integral(config.integral),
        )?;
        self.var = Some(var);
        Ok(())
    }

    fn balance_terms(&self) -> Vec<BalanceTerm> {
        self.var
            .map(|var| BalanceTerm::supply(self.carrier, var))
            .into_iter()
            .collect()
    }

    fn component_type(&self) -> &'static str {
        "Market"
    }
}

/// Symmetric slack `[-M, M]` absorbing any residual imbalance on one carrier.
///
/// `M` must dominate the summed bound magnitudes of everything else on the
/// carrier, see [`Balancing::check_dominates`]. On electricity the slack is
/// integral like every other power variable. On heat it stays continuous,
/// since a heat pump's heat output is `COP · el` and need not be whole.
#[derive(Debug, Clone, PartialEq)]
pub struct Balancing {
    agent_id: String,
    carrier: Carrier,
    limit: f64,
    var: Option<VarId>,
}

impl Balancing {
    pub fn new(agent_id: &str, carrier: Carrier, config: &ModelConfig) -> Result<Self, ModelError> {
        let limit = config.balancing_limit;
        if !(limit.is_finite() && limit > 0.0) {
            return Err(ModelError::configuration(format!(
                "balancing limit must be a positive number, got {limit}"
            )));
        }
        Ok(Self {
            agent_id: agent_id.to_string(),
            carrier,
            limit,
            var: None,
        })
    }

    /// Fails unless `M` covers `others`, the summed magnitude of every other
    /// variable on this carrier.
    pub fn check_dominates(&self, others: f64) -> Result<(), ModelError> {
        if others > self.limit {
            return Err(ModelError::bounds(format!(
                "balancing limit {} on {} is below the {others} the other components can reach",
                self.limit, self.carrier
            )));
        }
        debug!(carrier = %self.carrier, others, limit = self.limit, "balancing dominates");
        Ok(())
    }
}

impl Component for Balancing {
    fn define_variables(
        &mut self,
        model: &mut dyn OptimizationModel,
        config: &ModelConfig,
    ) -> Result<(), ModelError> {
        let name = format!(
            "{}_balancing_{}",
            self.agent_id,
            config.carrier_tag(self.carrier)
        );
        let var = model.add_variable(
            Variable::new(name, -self.limit, self.limit)
                .on(self.carrier)
                .integral(config.integral && self.carrier == Carrier::Electricity),
        )?;
        self.var = Some(var);
        Ok(())
    }

    fn balance_terms(&self) -> Vec<BalanceTerm> {
        self.var
            .map(|var| BalanceTerm::supply(self.carrier, var))
            .into_iter()
            .collect()
    }

    fn component_type(&self) -> &'static str {
        "Balancing"
    }
}
