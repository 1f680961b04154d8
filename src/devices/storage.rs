//! Storage-capable assets: EVs, the generic battery family (battery, pumped
//! storage, hydrogen) and heat storage.
//!
//! All of them share [`storage_bounds`] for the power variable and, when a
//! target is supplied, the same deviation sub-model.
//!
//! # Power Flow Convention
//! - Positive power: charging (demand on the carrier)
//! - Negative power: discharging (supply to the carrier)

use tracing::warn;

use crate::config::ModelConfig;
use crate::devices::types::{
    AssetDescriptor, AssetKind, BalanceTerm, Component, EvSizing, StepContext, StorageSizing,
    define_carrier_variable, to_unit, variable_name,
};
use crate::error::ModelError;
use crate::model::{Carrier, Constraint, OptimizationModel, VarId, Variable};

/// Physical inputs of the storage bound computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageParams {
    /// Energy capacity `C`.
    pub capacity: f64,
    /// State of charge `S` at the start of the step, net of consumption.
    pub soc: f64,
    /// Rated power `P`.
    pub power: f64,
    /// One-way efficiency `η` in `(0, 1]`.
    pub efficiency: f64,
    /// Step length `Δt` in hours.
    pub step_hours: f64,
    /// Discharge permission (`v2g` / `b2g`).
    pub discharge: bool,
    /// Whether the asset is connected this step. Only EVs are ever absent.
    pub available: bool,
}

/// Integer power bounds of a storage asset for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerBounds {
    pub lower: i64,
    pub upper: i64,
}

/// Computes charge/discharge bounds from capacity, SOC, efficiency, rated
/// power and step length.
///
/// ```text
/// upper = round(min(P, (C - S) / η / Δt))
/// lower = -round(min(P, S * η / Δt))   if discharge is permitted, else 0
/// lower = upper = 0                    if the asset is unavailable
/// ```
///
/// # Errors
///
/// - [`ModelError::Configuration`] if `η` is outside `(0, 1]`, `Δt <= 0` or
///   the rated power is not finite.
/// - [`ModelError::Bounds`] if `S` lies outside `[0, C]`, or if the rounded
///   bounds do not straddle zero (negative rated power).
pub fn storage_bounds(params: &StorageParams) -> Result<PowerBounds, ModelError> {
    let StorageParams {
        capacity,
        soc,
        power,
        efficiency,
        step_hours,
        discharge,
        available,
    } = *params;

    if !(efficiency > 0.0 && efficiency <= 1.0) {
        return Err(ModelError::configuration(format!(
            "efficiency must be in (0, 1], got {efficiency}"
        )));
    }
    if !(step_hours.is_finite() && step_hours > 0.0) {
        return Err(ModelError::configuration(format!(
            "step length must be > 0 hours, got {step_hours}"
        )));
    }
    if !power.is_finite() {
        return Err(ModelError::configuration(format!(
            "rated power must be finite, got {power}"
        )));
    }
    if !(soc >= 0.0 && soc <= capacity) {
        return Err(ModelError::bounds(format!(
            "state of charge {soc} outside [0, {capacity}]"
        )));
    }

    let energy_to_full = capacity - soc;
    let upper = to_unit(power.min(energy_to_full / efficiency / step_hours), "upper bound")?;
    let lower = if discharge {
        -to_unit(power.min(soc * efficiency / step_hours), "lower bound")?
    } else {
        0
    };

    if upper < 0 || lower > 0 {
        return Err(ModelError::bounds(format!(
            "bounds [{lower}, {upper}] do not contain zero (rated power {power})"
        )));
    }

    if !available {
        return Ok(PowerBounds { lower: 0, upper: 0 });
    }
    Ok(PowerBounds { lower, upper })
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TrackingVars {
    target: VarId,
    deviation_pos: VarId,
    deviation_neg: VarId,
}

/// A storage asset's power variable plus, in tracking mode, its target and
/// deviation slacks.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexibleStorage {
    plant_id: String,
    kind: AssetKind,
    bounds: PowerBounds,
    target: Option<i64>,
    power: Option<VarId>,
    tracking: Option<TrackingVars>,
}

impl FlexibleStorage {
    /// Battery, pumped storage, hydrogen or heat storage.
    ///
    /// Heat storage may always discharge, whatever its `b2g` flag says.
    pub fn generic(
        descriptor: &AssetDescriptor,
        ctx: &StepContext,
        config: &ModelConfig,
    ) -> Result<Self, ModelError> {
        let kind = descriptor.kind()?;
        if !matches!(
            kind,
            AssetKind::Battery | AssetKind::Psh | AssetKind::Hydrogen | AssetKind::HeatStorage
        ) {
            return Err(ModelError::configuration(format!(
                "`{}` is a {kind}, not generic storage",
                descriptor.id
            )));
        }
        let sizing: StorageSizing = descriptor.sizing()?;
        let params = StorageParams {
            capacity: sizing.capacity,
            soc: ctx.require_soc(&descriptor.id)?,
            power: sizing.power,
            efficiency: sizing.efficiency,
            step_hours: ctx.step_hours(config),
            discharge: sizing.b2g || kind == AssetKind::HeatStorage,
            available: true,
        };
        Self::with_params(descriptor, kind, &params, ctx)
    }

    /// An electric vehicle. The supplied SOC is reduced by the step's
    /// `energy_consumed` forecast before bounds are computed.
    pub fn ev(
        descriptor: &AssetDescriptor,
        ctx: &StepContext,
        config: &ModelConfig,
    ) -> Result<Self, ModelError> {
        let kind = descriptor.kind()?;
        if kind != AssetKind::Ev {
            return Err(ModelError::configuration(format!(
                "`{}` is a {kind}, not an EV",
                descriptor.id
            )));
        }
        let sizing: EvSizing = descriptor.sizing()?;
        let consumed = ctx.forecast.require(&descriptor.id, "energy_consumed")?;
        let availability = ctx.forecast.require(&descriptor.id, "availability")?;
        let params = StorageParams {
            capacity: sizing.capacity,
            soc: ctx.require_soc(&descriptor.id)? - consumed,
            power: sizing.charging_home,
            efficiency: sizing.charging_efficiency,
            step_hours: ctx.step_hours(config),
            discharge: sizing.v2g,
            available: availability > 0.0,
        };
        Self::with_params(descriptor, kind, &params, ctx)
    }

    fn with_params(
        descriptor: &AssetDescriptor,
        kind: AssetKind,
        params: &StorageParams,
        ctx: &StepContext,
    ) -> Result<Self, ModelError> {
        let bounds = storage_bounds(params)?;
        let target = match ctx.target(&descriptor.id)? {
            Some(t) => Some(to_unit(t, &format!("target of `{}`", descriptor.id))?),
            None => None,
        };
        Ok(Self {
            plant_id: descriptor.id.clone(),
            kind,
            bounds,
            target,
            power: None,
            tracking: None,
        })
    }

    pub fn bounds(&self) -> PowerBounds {
        self.bounds
    }

    pub fn target(&self) -> Option<i64> {
        self.target
    }

    fn carrier(&self) -> Carrier {
        self.kind.carrier()
    }

    fn name(&self, suffix: &str) -> String {
        variable_name(&self.plant_id, self.kind.tag(), suffix)
    }
}

impl Component for FlexibleStorage {
    fn define_variables(
        &mut self,
        model: &mut dyn OptimizationModel,
        config: &ModelConfig,
    ) -> Result<(), ModelError> {
        let PowerBounds { lower, upper } = self.bounds;
        let power = define_carrier_variable(
            model,
            config,
            &self.plant_id,
            self.kind,
            self.carrier(),
            lower,
            upper,
        )?;
        self.power = Some(power);

        let Some(target) = self.target else {
            return Ok(());
        };
        if target < lower || target > upper {
            warn!(
                plant = %self.plant_id,
                target,
                lower,
                upper,
                "target outside feasible power band"
            );
        }

        let target_var = model.add_variable(
            Variable::pinned(self.name("target"), target as f64).integral(config.integral),
        )?;
        let deviation_pos = model.add_variable(
            Variable::new(self.name("deviation_pos"), 0.0, (upper - target).max(0) as f64)
                .integral(config.integral),
        )?;
        let deviation_neg = model.add_variable(
            Variable::new(self.name("deviation_neg"), 0.0, (target - lower).max(0) as f64)
                .integral(config.integral),
        )?;
        self.tracking = Some(TrackingVars {
            target: target_var,
            deviation_pos,
            deviation_neg,
        });
        Ok(())
    }

    fn define_constraints(&self, model: &mut dyn OptimizationModel) -> Result<(), ModelError> {
        let (Some(power), Some(t)) = (self.power, self.tracking) else {
            return Ok(());
        };
        // power - target <= deviation_pos, target - power <= deviation_neg
        model.add_constraint(Constraint::leq(
            self.name("deviation_pos"),
            power - t.target,
            t.deviation_pos,
        ))?;
        model.add_constraint(Constraint::leq(
            self.name("deviation_neg"),
            t.target - power,
            t.deviation_neg,
        ))?;
        Ok(())
    }

    fn balance_terms(&self) -> Vec<BalanceTerm> {
        self.power
            .map(|var| BalanceTerm::demand(self.carrier(), var))
            .into_iter()
            .collect()
    }

    fn component_type(&self) -> &'static str {
        match self.kind {
            AssetKind::Ev => "Ev",
            AssetKind::HeatStorage => "HeatStorage",
            _ => "Storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DispatchMode;
    use crate::forecast::ForecastSlice;
    use crate::model::{LinearModel, Sense};
    use chrono::{TimeZone, Utc};

    fn params(capacity: f64, soc: f64) -> StorageParams {
        StorageParams {
            capacity,
            soc,
            power: 5000.0,
            efficiency: 0.95,
            step_hours: 0.25,
            discharge: true,
            available: true,
        }
    }

    fn ctx(mode: DispatchMode) -> StepContext {
        StepContext::new(
            3,
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 45, 0).unwrap(),
            900.0,
            mode,
        )
        .unwrap()
    }

    fn battery(b2g: bool) -> AssetDescriptor {
        AssetDescriptor::new("bat", AssetKind::Battery)
            .with_sizing(&StorageSizing {
                capacity: 10_000.0,
                power: 5_000.0,
                efficiency: 0.95,
                b2g,
            })
            .unwrap()
    }

    fn ev(v2g: bool) -> AssetDescriptor {
        AssetDescriptor::new("car", AssetKind::Ev)
            .with_sizing(&EvSizing {
                capacity: 60_000.0,
                charging_home: 11_000.0,
                charging_ac: None,
                charging_dc: None,
                charging_efficiency: 0.9,
                v2g,
            })
            .unwrap()
    }

    #[test]
    fn worked_example() {
        let b = storage_bounds(&params(10_000.0, 8_000.0)).unwrap();
        assert_eq!(b, PowerBounds { lower: -5000, upper: 5000 });
    }

    #[test]
    fn energy_limited_charge() {
        // 500 / 0.95 / 0.25 = 2105.26
        let b = storage_bounds(&params(10_000.0, 9_500.0)).unwrap();
        assert_eq!(b.upper, 2105);
    }

    #[test]
    fn no_discharge_permission_pins_lower_at_zero() {
        let b = storage_bounds(&StorageParams {
            discharge: false,
            ..params(10_000.0, 5_000.0)
        })
        .unwrap();
        assert_eq!(b.lower, 0);
        assert_eq!(b.upper, 5000);
    }

    #[test]
    fn soc_above_capacity_is_bounds_error() {
        let err = storage_bounds(&params(10_000.0, 10_001.0)).unwrap_err();
        assert!(matches!(err, ModelError::Bounds(_)));
    }

    #[test]
    fn negative_soc_is_bounds_error() {
        let err = storage_bounds(&params(10_000.0, -1.0)).unwrap_err();
        assert!(matches!(err, ModelError::Bounds(_)));
    }

    #[test]
    fn negative_rated_power_is_bounds_error() {
        let err = storage_bounds(&StorageParams {
            power: -100.0,
            ..params(10_000.0, 5_000.0)
        })
        .unwrap_err();
        assert!(matches!(err, ModelError::Bounds(_)));
    }

    #[test]
    fn zero_efficiency_is_configuration_error() {
        let err = storage_bounds(&StorageParams {
            efficiency: 0.0,
            ..params(10_000.0, 5_000.0)
        })
        .unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn non_finite_rated_power_is_configuration_error() {
        for power in [f64::NAN, f64::INFINITY] {
            let err = storage_bounds(&StorageParams {
                power,
                ..params(10_000.0, 5_000.0)
            })
            .unwrap_err();
            assert!(matches!(err, ModelError::Configuration(_)), "{power}");
        }
    }

    #[test]
    fn ev_with_nan_charging_power_is_rejected() {
        let descriptor = AssetDescriptor::new("car", AssetKind::Ev)
            .with_sizing(&EvSizing {
                capacity: 60_000.0,
                charging_home: f64::NAN,
                charging_ac: None,
                charging_dc: None,
                charging_efficiency: 0.9,
                v2g: true,
            })
            .unwrap();
        let forecast = ForecastSlice::new()
            .with("car_energy_consumed", 0.0)
            .with("car_availability", 1.0);
        let ctx = ctx(DispatchMode::Economic)
            .with_forecast(forecast)
            .with_soc("car", 30_000.0);
        let err = FlexibleStorage::ev(&descriptor, &ctx, &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn battery_without_soc_is_missing_data() {
        let err = FlexibleStorage::generic(
            &battery(true),
            &ctx(DispatchMode::Economic),
            &ModelConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::MissingData(_)));
    }

    #[test]
    fn economic_battery_registers_only_power() {
        let ctx = ctx(DispatchMode::Economic).with_soc("bat", 8000.0);
        let mut c =
            FlexibleStorage::generic(&battery(true), &ctx, &ModelConfig::default()).unwrap();
        let mut model = LinearModel::new();
        c.define_variables(&mut model, &ModelConfig::default()).unwrap();
        c.define_constraints(&mut model).unwrap();
        assert_eq!(model.variable_count(), 1);
        assert_eq!(model.constraint_count(), 0);
        assert_eq!(model.bounds("bat_battery_power"), Some((-5000.0, 5000.0)));
    }

    #[test]
    fn tracking_battery_registers_deviation_model() {
        let ctx = ctx(DispatchMode::Tracking)
            .with_soc("bat", 8000.0)
            .with_target("bat", 1200.0);
        let config = ModelConfig::default();
        let mut c = FlexibleStorage::generic(&battery(true), &ctx, &config).unwrap();
        let mut model = LinearModel::new();
        c.define_variables(&mut model, &config).unwrap();
        c.define_constraints(&mut model).unwrap();

        assert_eq!(model.bounds("bat_battery_target"), Some((1200.0, 1200.0)));
        assert_eq!(model.bounds("bat_battery_deviation_pos"), Some((0.0, 3800.0)));
        assert_eq!(model.bounds("bat_battery_deviation_neg"), Some((0.0, 6200.0)));

        let pos = model.constraint("bat_battery_deviation_pos").unwrap();
        assert_eq!(pos.sense, Sense::LessEqual);
        let power = model.variable("bat_battery_power").unwrap();
        let dev = model.variable("bat_battery_deviation_pos").unwrap();
        assert_eq!(pos.coefficient(power), 1.0);
        assert_eq!(pos.coefficient(dev), -1.0);
    }

    #[test]
    fn target_outside_band_clamps_slack_bounds_at_zero() {
        let ctx = ctx(DispatchMode::Tracking)
            .with_soc("bat", 8000.0)
            .with_target("bat", 9000.0);
        let config = ModelConfig::default();
        let mut c = FlexibleStorage::generic(&battery(true), &ctx, &config).unwrap();
        let mut model = LinearModel::new();
        c.define_variables(&mut model, &config).unwrap();
        assert_eq!(model.bounds("bat_battery_deviation_pos"), Some((0.0, 0.0)));
    }

    #[test]
    fn tracking_without_target_is_missing_data() {
        let ctx = ctx(DispatchMode::Tracking).with_soc("bat", 8000.0);
        let err =
            FlexibleStorage::generic(&battery(true), &ctx, &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::MissingData(_)));
    }

    #[test]
    fn heat_storage_always_discharges() {
        let tank = AssetDescriptor::new("tank", AssetKind::HeatStorage)
            .with_sizing(&StorageSizing {
                capacity: 20_000.0,
                power: 6_000.0,
                efficiency: 1.0,
                b2g: false,
            })
            .unwrap();
        let ctx = ctx(DispatchMode::Economic).with_soc("tank", 1000.0);
        let config = ModelConfig::default();
        let mut c = FlexibleStorage::generic(&tank, &ctx, &config).unwrap();
        assert_eq!(c.bounds(), PowerBounds { lower: -4000, upper: 6000 });

        let mut model = LinearModel::new();
        c.define_variables(&mut model, &config).unwrap();
        assert_eq!(
            model.get("tank_heat_storage_heat").and_then(|v| v.carrier),
            Some(Carrier::Heat)
        );
    }

    #[test]
    fn absent_ev_is_pinned_at_zero() {
        let forecast = ForecastSlice::new()
            .with("car_availability", 0.0)
            .with("car_energy_consumed", 0.0);
        let ctx = ctx(DispatchMode::Economic)
            .with_forecast(forecast)
            .with_soc("car", 20_000.0);
        let c = FlexibleStorage::ev(&ev(true), &ctx, &ModelConfig::default()).unwrap();
        assert_eq!(c.bounds(), PowerBounds { lower: 0, upper: 0 });
    }

    #[test]
    fn ev_soc_is_net_of_trip_consumption() {
        let forecast = ForecastSlice::new()
            .with("car_availability", 1.0)
            .with("car_energy_consumed", 1_000.0);
        let ctx = ctx(DispatchMode::Economic)
            .with_forecast(forecast)
            .with_soc("car", 1_500.0);
        let c = FlexibleStorage::ev(&ev(true), &ctx, &ModelConfig::default()).unwrap();
        // 500 * 0.9 / 0.25 = 1800
        assert_eq!(c.bounds().lower, -1800);
        assert_eq!(c.bounds().upper, 11_000);
    }

    #[test]
    fn ev_bounds_use_home_charging_power_only() {
        let mut fast = ev(true);
        fast.sizing.insert("charging_DC".into(), toml::Value::Float(150_000.0));
        let forecast = ForecastSlice::new()
            .with("car_availability", 1.0)
            .with("car_energy_consumed", 0.0);
        let ctx = ctx(DispatchMode::Economic)
            .with_forecast(forecast)
            .with_soc("car", 30_000.0);
        let c = FlexibleStorage::ev(&fast, &ctx, &ModelConfig::default()).unwrap();
        assert_eq!(c.bounds(), PowerBounds { lower: -11_000, upper: 11_000 });
    }

    #[test]
    fn ev_trip_beyond_soc_is_bounds_error() {
        let forecast = ForecastSlice::new()
            .with("car_availability", 0.0)
            .with("car_energy_consumed", 8_000.0);
        let ctx = ctx(DispatchMode::Economic)
            .with_forecast(forecast)
            .with_soc("car", 5_000.0);
        let err = FlexibleStorage::ev(&ev(false), &ctx, &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Bounds(_)));
    }
}
