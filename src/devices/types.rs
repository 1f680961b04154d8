//! Common types and traits shared by all asset components.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::forecast::ForecastSlice;
use crate::model::{Carrier, OptimizationModel, VarId, Variable};

/// Closed set of asset type tags an agent's plant can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    InflexibleLoad,
    FlexibleLoad,
    Pv,
    Wind,
    FixedGen,
    Heat,
    Dhw,
    HeatPump,
    Ev,
    Battery,
    Psh,
    Hydrogen,
    HeatStorage,
}

impl AssetKind {
    pub const ALL: [AssetKind; 13] = [
        AssetKind::InflexibleLoad,
        AssetKind::FlexibleLoad,
        AssetKind::Pv,
        AssetKind::Wind,
        AssetKind::FixedGen,
        AssetKind::Heat,
        AssetKind::Dhw,
        AssetKind::HeatPump,
        AssetKind::Ev,
        AssetKind::Battery,
        AssetKind::Psh,
        AssetKind::Hydrogen,
        AssetKind::HeatStorage,
    ];

    /// The tag used in scenario files and as the role segment of variable names.
    pub fn tag(&self) -> &'static str {
        match self {
            AssetKind::InflexibleLoad => "inflexible_load",
            AssetKind::FlexibleLoad => "flexible_load",
            AssetKind::Pv => "pv",
            AssetKind::Wind => "wind",
            AssetKind::FixedGen => "fixed_gen",
            AssetKind::Heat => "heat",
            AssetKind::Dhw => "dhw",
            AssetKind::HeatPump => "hp",
            AssetKind::Ev => "ev",
            AssetKind::Battery => "battery",
            AssetKind::Psh => "psh",
            AssetKind::Hydrogen => "hydrogen",
            AssetKind::HeatStorage => "heat_storage",
        }
    }

    /// Assets carrying a state of charge between steps.
    pub fn has_storage(&self) -> bool {
        matches!(
            self,
            AssetKind::Ev
                | AssetKind::Battery
                | AssetKind::Psh
                | AssetKind::Hydrogen
                | AssetKind::HeatStorage
        )
    }

    /// Carrier of the asset's primary variable. The heat pump also registers
    /// a heat variable.
    pub fn carrier(&self) -> Carrier {
        match self {
            AssetKind::Heat | AssetKind::Dhw | AssetKind::HeatStorage => Carrier::Heat,
            _ => Carrier::Electricity,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for AssetKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| ModelError::configuration(format!("unknown asset type `{s}`")))
    }
}

/// A plant in an agent's portfolio as it appears in the scenario file.
///
/// The sizing bag is kept untyped until a component asks for the struct of
/// its family, so a missing field surfaces as a configuration error at
/// construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetDescriptor {
    /// Plant identifier, the first segment of every variable name.
    pub id: String,
    /// Asset type tag, see [`AssetKind::tag`].
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Family-specific sizing parameters.
    #[serde(default)]
    pub sizing: toml::Table,
    /// State of charge at simulation start, for storage-capable assets.
    #[serde(default)]
    pub initial_soc: Option<f64>,
    /// Whether the plant sits behind its own meter. Carried through from the
    /// scenario file for downstream metering; model building does not read
    /// it.
    #[serde(default)]
    pub submeter: bool,
}

impl AssetDescriptor {
    pub fn new(id: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            id: id.into(),
            type_tag: kind.tag().to_string(),
            sizing: toml::Table::new(),
            initial_soc: None,
            submeter: false,
        }
    }

    /// Replaces the sizing bag with the serialized form of `sizing`.
    pub fn with_sizing<S: Serialize>(mut self, sizing: &S) -> Result<Self, ModelError> {
        match toml::Value::try_from(sizing) {
            Ok(toml::Value::Table(table)) => {
                self.sizing = table;
                Ok(self)
            }
            Ok(other) => Err(ModelError::configuration(format!(
                "plant `{}`: sizing must be a table, got {}",
                self.id,
                other.type_str()
            ))),
            Err(e) => Err(ModelError::configuration(format!(
                "plant `{}`: cannot serialize sizing: {e}",
                self.id
            ))),
        }
    }

    pub fn with_initial_soc(mut self, soc: f64) -> Self {
        self.initial_soc = Some(soc);
        self
    }

    pub fn kind(&self) -> Result<AssetKind, ModelError> {
        self.type_tag.parse()
    }

    /// Parses the sizing bag into the struct of the asset's family.
    pub fn sizing<S: DeserializeOwned>(&self) -> Result<S, ModelError> {
        toml::Value::Table(self.sizing.clone())
            .try_into()
            .map_err(|e| {
                ModelError::configuration(format!(
                    "plant `{}` ({}): invalid sizing: {e}",
                    self.id, self.type_tag
                ))
            })
    }
}

/// Sizing of PV, wind and fixed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplePlantSizing {
    /// Whether output may be curtailed below the forecast.
    pub controllable: bool,
}

fn yes() -> bool {
    true
}

/// Sizing of battery, pumped storage, hydrogen and heat storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSizing {
    /// Energy capacity.
    pub capacity: f64,
    /// Rated charge/discharge power.
    pub power: f64,
    /// One-way conversion efficiency in `(0, 1]`.
    pub efficiency: f64,
    /// Discharge permission. Ignored for heat storage, which may always
    /// discharge.
    #[serde(default = "yes")]
    pub b2g: bool,
}

/// Sizing of an electric vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvSizing {
    pub capacity: f64,
    /// Charging power at home, the rated power used for bounds.
    pub charging_home: f64,
    /// Public AC charging power. Descriptive only: bounds use
    /// `charging_home`, since the vehicle is modelled at its home connection.
    #[serde(default, rename = "charging_AC")]
    pub charging_ac: Option<f64>,
    /// Public DC charging power. Descriptive only, like `charging_ac`.
    #[serde(default, rename = "charging_DC")]
    pub charging_dc: Option<f64>,
    pub charging_efficiency: f64,
    /// Vehicle-to-grid permission.
    #[serde(default)]
    pub v2g: bool,
}

/// Sizing of a heat pump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatPumpSizing {
    /// Rated electrical input.
    pub power: f64,
    /// Rated thermal output.
    pub heat: f64,
    #[serde(default)]
    pub controllable: bool,
}

/// Whether flexible assets follow a previously committed schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Unconstrained economic dispatch; targets are ignored.
    #[default]
    Economic,
    /// Deviation-penalized tracking; every storage asset needs a target.
    Tracking,
}

/// Everything one agent's components need to know about the current step.
///
/// Built fresh by the controller each step and dropped after the model is
/// built.
#[derive(Debug, Clone, PartialEq)]
pub struct StepContext {
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    step_seconds: f64,
    pub mode: DispatchMode,
    pub forecast: ForecastSlice,
    socs: BTreeMap<String, f64>,
    targets: BTreeMap<String, f64>,
}

impl StepContext {
    /// Creates an empty context.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `step_seconds` is not a positive,
    /// finite number.
    pub fn new(
        step: usize,
        timestamp: DateTime<Utc>,
        step_seconds: f64,
        mode: DispatchMode,
    ) -> Result<Self, ModelError> {
        if !(step_seconds.is_finite() && step_seconds > 0.0) {
            return Err(ModelError::configuration(format!(
                "step length must be > 0 seconds, got {step_seconds}"
            )));
        }
        Ok(Self {
            step,
            timestamp,
            step_seconds,
            mode,
            forecast: ForecastSlice::default(),
            socs: BTreeMap::new(),
            targets: BTreeMap::new(),
        })
    }

    pub fn with_forecast(mut self, forecast: ForecastSlice) -> Self {
        self.forecast = forecast;
        self
    }

    pub fn with_soc(mut self, plant_id: impl Into<String>, soc: f64) -> Self {
        self.set_soc(plant_id, soc);
        self
    }

    pub fn with_target(mut self, plant_id: impl Into<String>, target: f64) -> Self {
        self.set_target(plant_id, target);
        self
    }

    pub fn set_soc(&mut self, plant_id: impl Into<String>, soc: f64) {
        self.socs.insert(plant_id.into(), soc);
    }

    pub fn set_target(&mut self, plant_id: impl Into<String>, target: f64) {
        self.targets.insert(plant_id.into(), target);
    }

    pub fn step_seconds(&self) -> f64 {
        self.step_seconds
    }

    /// Step length in hours, using the configured conversion factor.
    pub fn step_hours(&self, config: &ModelConfig) -> f64 {
        self.step_seconds * config.seconds_to_hours
    }

    pub fn soc(&self, plant_id: &str) -> Option<f64> {
        self.socs.get(plant_id).copied()
    }

    pub fn require_soc(&self, plant_id: &str) -> Result<f64, ModelError> {
        match self.soc(plant_id) {
            Some(soc) if soc.is_finite() => Ok(soc),
            Some(soc) => Err(ModelError::missing(format!(
                "state of charge of `{plant_id}` is not a number ({soc})"
            ))),
            None => Err(ModelError::missing(format!(
                "no state of charge for `{plant_id}`"
            ))),
        }
    }

    /// The plant's target in tracking mode, `None` in economic mode.
    pub fn target(&self, plant_id: &str) -> Result<Option<f64>, ModelError> {
        match self.mode {
            DispatchMode::Economic => Ok(None),
            DispatchMode::Tracking => match self.targets.get(plant_id) {
                Some(target) if target.is_finite() => Ok(Some(*target)),
                Some(target) => Err(ModelError::missing(format!(
                    "target of `{plant_id}` is not a number ({target})"
                ))),
                None => Err(ModelError::missing(format!(
                    "no target for `{plant_id}` in tracking mode"
                ))),
            },
        }
    }
}

/// An asset's contribution to one agent step's optimization model.
///
/// Implementations are built from a descriptor and a [`StepContext`], then
/// asked to register variables and, afterwards, constraints.
pub trait Component {
    /// Registers the component's decision variables.
    fn define_variables(
        &mut self,
        model: &mut dyn OptimizationModel,
        config: &ModelConfig,
    ) -> Result<(), ModelError>;

    /// Registers constraints among the variables defined earlier.
    fn define_constraints(&self, _model: &mut dyn OptimizationModel) -> Result<(), ModelError> {
        Ok(())
    }

    /// Signed contributions to each carrier's balance, available after
    /// [`Component::define_variables`].
    fn balance_terms(&self) -> Vec<BalanceTerm> {
        Vec::new()
    }

    /// Returns a human-readable type name for the component.
    fn component_type(&self) -> &'static str;
}

/// `coeff * var` in the balance of `carrier`; supply is positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceTerm {
    pub carrier: Carrier,
    pub var: VarId,
    pub coeff: f64,
}

impl BalanceTerm {
    pub fn supply(carrier: Carrier, var: VarId) -> Self {
        Self {
            carrier,
            var,
            coeff: 1.0,
        }
    }

    pub fn demand(carrier: Carrier, var: VarId) -> Self {
        Self {
            carrier,
            var,
            coeff: -1.0,
        }
    }
}

/// `{plant_id}_{role}_{suffix}`.
pub fn variable_name(plant_id: &str, role: &str, suffix: &str) -> String {
    format!("{plant_id}_{role}_{suffix}")
}

/// Name of the variable an asset registers on `carrier`.
pub fn carrier_variable_name(
    plant_id: &str,
    kind: AssetKind,
    carrier: Carrier,
    config: &ModelConfig,
) -> String {
    variable_name(plant_id, kind.tag(), config.carrier_tag(carrier))
}

/// Rounds a value to the model's integer unit, half to even.
pub fn to_unit(value: f64, what: &str) -> Result<i64, ModelError> {
    if !value.is_finite() {
        return Err(ModelError::missing(format!("{what} is not a number ({value})")));
    }
    Ok(value.round_ties_even() as i64)
}

/// Registers an integral variable for `plant_id` on `carrier`.
pub(crate) fn define_carrier_variable(
    model: &mut dyn OptimizationModel,
    config: &ModelConfig,
    plant_id: &str,
    kind: AssetKind,
    carrier: Carrier,
    lower: i64,
    upper: i64,
) -> Result<VarId, ModelError> {
    if lower > upper {
        return Err(ModelError::bounds(format!(
            "`{plant_id}` ({kind}) on {carrier}: lower {lower} > upper {upper}"
        )));
    }
    model.add_variable(
        Variable::new(
            carrier_variable_name(plant_id, kind, carrier, config),
            lower as f64,
            upper as f64,
        )
        .on(carrier)
        .integral(config.integral),
    )
}
