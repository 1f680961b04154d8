//! Assembles one agent's model for one control step.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::config::{AgentConfig, ModelConfig};
use crate::devices::{AssetComponent, Balancing, BalanceTerm, Component, Market, StepContext};
use crate::error::{BuildError, ModelError};
use crate::model::{Carrier, Constraint, Expression, LinearModel, OptimizationModel};

/// Builds an agent's per-step model from its plant portfolio and markets.
///
/// Order: every plant (variables, then constraints), every market, one
/// balancing slack per carrier in use, then the per-carrier balance
/// equalities. The model is returned only once complete; any failure drops
/// it.
#[derive(Debug, Clone, Copy)]
pub struct AgentModelBuilder<'a> {
    agent: &'a AgentConfig,
    config: &'a ModelConfig,
}

impl<'a> AgentModelBuilder<'a> {
    pub fn new(agent: &'a AgentConfig, config: &'a ModelConfig) -> Self {
        Self { agent, config }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent.id
    }

    /// Builds the model for the step described by `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ModelError`] raised, attributed to this agent, the
    /// step and, where one is to blame, the plant.
    pub fn build(&self, ctx: &StepContext) -> Result<LinearModel, BuildError> {
        let mut model = LinearModel::new();
        let mut terms: Vec<BalanceTerm> = Vec::new();

        for plant in &self.agent.plants {
            let mut component = AssetComponent::from_descriptor(plant, ctx, self.config)
                .map_err(|e| self.error(Some(plant.id.as_str()), ctx, e))?;
            component
                .define_variables(&mut model, self.config)
                .and_then(|()| component.define_constraints(&mut model))
                .map_err(|e| self.error(Some(plant.id.as_str()), ctx, e))?;
            debug!(
                agent = %self.agent.id,
                plant = %plant.id,
                component = component.component_type(),
                "plant registered"
            );
            terms.extend(component.balance_terms());
        }

        for market in &self.agent.markets {
            let mut component = Market::new(&self.agent.id, market)
                .map(AssetComponent::Market)
                .map_err(|e| self.error(None, ctx, e))?;
            component
                .define_variables(&mut model, self.config)
                .map_err(|e| self.error(None, ctx, e))?;
            terms.extend(component.balance_terms());
        }

        let carriers: Vec<Carrier> = model.carriers().collect();
        for &carrier in &carriers {
            let mut balancing = Balancing::new(&self.agent.id, carrier, self.config)
                .map_err(|e| self.error(None, ctx, e))?;
            balancing
                .check_dominates(model.carrier_magnitude(carrier))
                .and_then(|()| balancing.define_variables(&mut model, self.config))
                .map_err(|e| self.error(None, ctx, e))?;
            terms.extend(balancing.balance_terms());
        }

        if self.config.balance_constraints {
            self.add_balances(&mut model, &terms)
                .map_err(|e| self.error(None, ctx, e))?;
        }

        info!(
            agent = %self.agent.id,
            step = ctx.step,
            variables = model.variable_count(),
            constraints = model.constraint_count(),
            "agent model built"
        );
        Ok(model)
    }

    /// `sum(coeff * var) == 0` per carrier, named `{agent}_balance_{tag}`.
    fn add_balances(
        &self,
        model: &mut LinearModel,
        terms: &[BalanceTerm],
    ) -> Result<(), ModelError> {
        let mut per_carrier: BTreeMap<Carrier, Vec<&BalanceTerm>> = BTreeMap::new();
        for term in terms {
            per_carrier.entry(term.carrier).or_default().push(term);
        }
        for (carrier, terms) in per_carrier {
            let sum: Expression = terms.iter().map(|t| t.coeff * t.var).sum();
            let name = format!(
                "{}_balance_{}",
                self.agent.id,
                self.config.carrier_tag(carrier)
            );
            model.add_constraint(Constraint::equals(name, sum, 0.0))?;
        }
        Ok(())
    }

    fn error(&self, asset_id: Option<&str>, ctx: &StepContext, source: ModelError) -> BuildError {
        BuildError {
            agent_id: self.agent.id.clone(),
            asset_id: asset_id.map(str::to_string),
            step: ctx.step,
            source,
        }
    }
}
