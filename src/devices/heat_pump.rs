//! Heat pump: the one component that spans both carriers.

use crate::config::ModelConfig;
use crate::devices::types::{
    AssetDescriptor, AssetKind, BalanceTerm, Component, HeatPumpSizing, StepContext,
    carrier_variable_name, define_carrier_variable, to_unit, variable_name,
};
use crate::error::ModelError;
use crate::model::{Carrier, Constraint, OptimizationModel, VarId, Variable};

/// Electricity drawn and heat delivered, tied by `heat = COP * electricity`.
///
/// Controllable pumps may run anywhere in `[0, rated]` on each carrier.
/// Uncontrollable ones run at rated electrical input and deliver
/// `rated * COP`, which must fit under the thermal rating. The heat variable
/// is continuous so the equality holds for fractional COP.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatPump {
    plant_id: String,
    cop: f64,
    electricity: (i64, i64),
    heat: (f64, f64),
    vars: Option<(VarId, VarId)>,
}

impl HeatPump {
    pub fn new(descriptor: &AssetDescriptor, ctx: &StepContext) -> Result<Self, ModelError> {
        let kind = descriptor.kind()?;
        if kind != AssetKind::HeatPump {
            return Err(ModelError::configuration(format!(
                "`{}` is a {kind}, not a heat pump",
                descriptor.id
            )));
        }
        let sizing: HeatPumpSizing = descriptor.sizing()?;
        let cop = ctx.forecast.require(&descriptor.id, "cop")?;
        if cop <= 0.0 {
            return Err(ModelError::bounds(format!(
                "COP of `{}` must be > 0, got {cop}",
                descriptor.id
            )));
        }

        let rated_el = to_unit(sizing.power, "electrical rating")?;
        let rated_th = sizing.heat;
        let (electricity, heat) = if sizing.controllable {
            ((0, rated_el), (0.0, rated_th))
        } else {
            let delivered = rated_el as f64 * cop;
            if delivered > rated_th {
                return Err(ModelError::bounds(format!(
                    "`{}` delivers {delivered} at full input but is rated for {rated_th}",
                    descriptor.id
                )));
            }
            ((rated_el, rated_el), (delivered, delivered))
        };

        Ok(Self {
            plant_id: descriptor.id.clone(),
            cop,
            electricity,
            heat,
            vars: None,
        })
    }

    pub fn cop(&self) -> f64 {
        self.cop
    }
}

impl Component for HeatPump {
    fn define_variables(
        &mut self,
        model: &mut dyn OptimizationModel,
        config: &ModelConfig,
    ) -> Result<(), ModelError> {
        let el = define_carrier_variable(
            model,
            config,
            &self.plant_id,
            AssetKind::HeatPump,
            Carrier::Electricity,
            self.electricity.0,
            self.electricity.1,
        )?;
        let heat = model.add_variable(
            Variable::new(
                carrier_variable_name(&self.plant_id, AssetKind::HeatPump, Carrier::Heat, config),
                self.heat.0,
                self.heat.1,
            )
            .on(Carrier::Heat)
            .integral(false),
        )?;
        self.vars = Some((el, heat));
        Ok(())
    }

    fn define_constraints(&self, model: &mut dyn OptimizationModel) -> Result<(), ModelError> {
        let Some((el, heat)) = self.vars else {
            return Ok(());
        };
        let name = variable_name(&self.plant_id, AssetKind::HeatPump.tag(), "cop");
        model.add_constraint(Constraint::equals(name, heat - self.cop * el, 0.0))
    }

    fn balance_terms(&self) -> Vec<BalanceTerm> {
        match self.vars {
            Some((el, heat)) => vec![
                BalanceTerm::demand(Carrier::Electricity, el),
                BalanceTerm::supply(Carrier::Heat, heat),
            ],
            None => Vec::new(),
        }
    }

    fn component_type(&self) -> &'static str {
        "HeatPump"
    }
}
