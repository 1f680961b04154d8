//! Single-variable contributors whose value comes straight from the forecast:
//! inflexible demand (electric, space heat, hot water) and simple generation.

use crate::config::ModelConfig;
use crate::devices::types::{
    AssetDescriptor, AssetKind, BalanceTerm, Component, SimplePlantSizing, StepContext,
    define_carrier_variable, to_unit,
};
use crate::error::ModelError;
use crate::model::{OptimizationModel, VarId};

/// A demand pinned to its forecast: `lower == upper == forecast`.
///
/// Covers `inflexible_load` (forecast key `{id}_power`), `heat`
/// (`{id}_heat`) and `dhw` (`{id}_dhw`).
#[derive(Debug, Clone, PartialEq)]
pub struct FixedInjection {
    plant_id: String,
    kind: AssetKind,
    value: i64,
    var: Option<VarId>,
}

impl FixedInjection {
    pub fn new(descriptor: &AssetDescriptor, ctx: &StepContext) -> Result<Self, ModelError> {
        let kind = descriptor.kind()?;
        let attribute = match kind {
            AssetKind::InflexibleLoad => "power",
            AssetKind::Heat => "heat",
            AssetKind::Dhw => "dhw",
            other => {
                return Err(ModelError::configuration(format!(
                    "`{}` is a {other}, not a fixed demand",
                    descriptor.id
                )));
            }
        };
        let forecast = ctx.forecast.require(&descriptor.id, attribute)?;
        let what = format!("`{}_{attribute}` forecast", descriptor.id);
        Ok(Self {
            plant_id: descriptor.id.clone(),
            kind,
            value: to_unit(forecast, &what)?,
            var: None,
        })
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

impl Component for FixedInjection {
    fn define_variables(
        &mut self,
        model: &mut dyn OptimizationModel,
        config: &ModelConfig,
    ) -> Result<(), ModelError> {
        let var = define_carrier_variable(
            model,
            config,
            &self.plant_id,
            self.kind,
            self.kind.carrier(),
            self.value,
            self.value,
        )?;
        self.var = Some(var);
        Ok(())
    }

    fn balance_terms(&self) -> Vec<BalanceTerm> {
        self.var
            .map(|var| BalanceTerm::demand(self.kind.carrier(), var))
            .into_iter()
            .collect()
    }

    fn component_type(&self) -> &'static str {
        "FixedInjection"
    }
}

/// PV, wind or fixed generation.
///
/// Controllable plants may be curtailed to zero, `[0, forecast]`; the rest
/// are pinned to the forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct SimplePlant {
    plant_id: String,
    kind: AssetKind,
    lower: i64,
    upper: i64,
    var: Option<VarId>,
}

impl SimplePlant {
    pub fn new(descriptor: &AssetDescriptor, ctx: &StepContext) -> Result<Self, ModelError> {
        let kind = descriptor.kind()?;
        if !matches!(kind, AssetKind::Pv | AssetKind::Wind | AssetKind::FixedGen) {
            return Err(ModelError::configuration(format!(
                "`{}` is a {kind}, not a generator",
                descriptor.id
            )));
        }
        let sizing: SimplePlantSizing = descriptor.sizing()?;
        let forecast = ctx.forecast.require(&descriptor.id, "power")?;
        let value = to_unit(forecast, &format!("`{}_power` forecast", descriptor.id))?;

        let (lower, upper) = if sizing.controllable {
            if value < 0 {
                return Err(ModelError::bounds(format!(
                    "curtailable `{}` has negative forecast {value}",
                    descriptor.id
                )));
            }
            (0, value)
        } else {
            (value, value)
        };

        Ok(Self {
            plant_id: descriptor.id.clone(),
            kind,
            lower,
            upper,
            var: None,
        })
    }

    pub fn bounds(&self) -> (i64, i64) {
        (self.lower, self.upper)
    }
}

impl Component for SimplePlant {
    fn define_variables(
        &mut self,
        model: &mut dyn OptimizationModel,
        config: &ModelConfig,
    ) -> Result<(), ModelError> {
        let var = define_carrier_variable(
            model,
            config,
            &self.plant_id,
            self.kind,
            self.kind.carrier(),
            self.lower,
            self.upper,
        )?;
        self.var = Some(var);
        Ok(())
    }

    fn balance_terms(&self) -> Vec<BalanceTerm> {
        self.var
            .map(|var| BalanceTerm::supply(self.kind.carrier(), var))
            .into_iter()
            .collect()
    }

    fn component_type(&self) -> &'static str {
        "SimplePlant"
    }
}
