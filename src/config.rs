//! TOML-based scenario configuration and preset definitions.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use toml::Value::{Boolean, Float};

use crate::devices::{
    AssetDescriptor, AssetKind, DispatchMode, EvSizing, HeatPumpSizing, SimplePlantSizing,
    StorageSizing, variable_name,
};
use crate::model::Carrier;

/// Top-level scenario configuration parsed from TOML.
///
/// Load from TOML with [`ScenarioConfig::from_toml_file`] or start from one
/// of the [`ScenarioConfig::PRESETS`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation timing and global parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Carrier tags, unit factors and model-wide constants.
    #[serde(default)]
    pub model: ModelConfig,
    /// Agents and their plant portfolios.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Timestamp of the first step.
    pub start: DateTime<Utc>,
    /// Control step length in seconds (must be > 0).
    pub step_seconds: f64,
    /// Number of steps to simulate (must be > 0).
    pub steps: usize,
    /// Economic dispatch or schedule tracking.
    pub mode: DispatchMode,
    /// Seed for synthetic forecasts.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start: DateTime::UNIX_EPOCH,
            step_seconds: 900.0,
            steps: 96,
            mode: DispatchMode::Economic,
            seed: 42,
        }
    }
}

/// Constants every component shares: carrier tags used in variable names,
/// unit conversion and the balancing limit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Name segment for electricity variables.
    pub electricity_tag: String,
    /// Name segment for heat variables.
    pub heat_tag: String,
    /// Factor converting seconds to hours.
    pub seconds_to_hours: f64,
    /// Symmetric limit `M` of the balancing slack.
    pub balancing_limit: f64,
    /// Register power variables as integers.
    pub integral: bool,
    /// Add one balance equality per carrier.
    pub balance_constraints: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            electricity_tag: "power".to_string(),
            heat_tag: "heat".to_string(),
            seconds_to_hours: 1.0 / 3600.0,
            balancing_limit: 1e10,
            integral: true,
            balance_constraints: true,
        }
    }
}

impl ModelConfig {
    pub fn carrier_tag(&self, carrier: Carrier) -> &str {
        match carrier {
            Carrier::Electricity => &self.electricity_tag,
            Carrier::Heat => &self.heat_tag,
        }
    }
}

/// One agent: its plants and the markets it has cleared on.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub id: String,
    #[serde(default)]
    pub plants: Vec<AssetDescriptor>,
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plants: Vec::new(),
            markets: Vec::new(),
        }
    }

    pub fn with_plant(mut self, plant: AssetDescriptor) -> Self {
        self.plants.push(plant);
        self
    }

    pub fn with_market(mut self, market: MarketConfig) -> Self {
        self.markets.push(market);
        self
    }
}

/// A market the agent trades on for one carrier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketConfig {
    pub name: String,
    pub carrier: Carrier,
    /// Quantity already committed through clearing. Zero until clearing
    /// results are wired in.
    #[serde(default)]
    pub committed: f64,
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.step_seconds"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// A plant whose sizing table is written out directly, so presets never pass
/// through a fallible serializer.
fn sized(id: String, kind: AssetKind, sizing: &[(&str, toml::Value)]) -> AssetDescriptor {
    let mut plant = AssetDescriptor::new(id, kind);
    plant.sizing = sizing
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect();
    plant
}

/// Storage sizing with discharge permitted.
fn storage(
    id: String,
    kind: AssetKind,
    capacity: f64,
    power: f64,
    efficiency: f64,
) -> AssetDescriptor {
    sized(
        id,
        kind,
        &[
            ("capacity", Float(capacity)),
            ("power", Float(power)),
            ("efficiency", Float(efficiency)),
        ],
    )
}

fn household_agent(id: &str) -> AgentConfig {
    let plants = vec![
        AssetDescriptor::new(format!("{id}_load"), AssetKind::InflexibleLoad),
        sized(format!("{id}_pv"), AssetKind::Pv, &[("controllable", Boolean(true))]),
        storage(format!("{id}_bat"), AssetKind::Battery, 10_000.0, 5_000.0, 0.95)
            .with_initial_soc(5_000.0),
        sized(
            format!("{id}_ev"),
            AssetKind::Ev,
            &[
                ("capacity", Float(60_000.0)),
                ("charging_home", Float(11_000.0)),
                ("charging_AC", Float(22_000.0)),
                ("charging_DC", Float(50_000.0)),
                ("charging_efficiency", Float(0.9)),
                ("v2g", Boolean(false)),
            ],
        )
        .with_initial_soc(30_000.0),
        sized(
            format!("{id}_hp"),
            AssetKind::HeatPump,
            &[
                ("power", Float(3_000.0)),
                ("heat", Float(10_000.0)),
                ("controllable", Boolean(true)),
            ],
        ),
        AssetDescriptor::new(format!("{id}_heat"), AssetKind::Heat),
        AssetDescriptor::new(format!("{id}_dhw"), AssetKind::Dhw),
        storage(format!("{id}_tank"), AssetKind::HeatStorage, 20_000.0, 6_000.0, 0.98)
            .with_initial_soc(10_000.0),
    ];

    AgentConfig {
        id: id.to_string(),
        plants,
        markets: vec![MarketConfig {
            name: "lem".to_string(),
            carrier: Carrier::Electricity,
            committed: 0.0,
        }],
    }
}

fn industry_agent(id: &str) -> AgentConfig {
    let mut h2 = storage(format!("{id}_h2"), AssetKind::Hydrogen, 200_000.0, 20_000.0, 0.6)
        .with_initial_soc(50_000.0);
    h2.sizing.insert("b2g".to_string(), Boolean(false));

    AgentConfig {
        id: id.to_string(),
        plants: vec![
            AssetDescriptor::new(format!("{id}_load"), AssetKind::InflexibleLoad),
            sized(format!("{id}_wind"), AssetKind::Wind, &[("controllable", Boolean(true))]),
            sized(format!("{id}_gen"), AssetKind::FixedGen, &[("controllable", Boolean(false))]),
            storage(format!("{id}_psh"), AssetKind::Psh, 500_000.0, 50_000.0, 0.8)
                .with_initial_soc(250_000.0),
            h2,
        ],
        markets: vec![MarketConfig {
            name: "wholesale".to_string(),
            carrier: Carrier::Electricity,
            committed: 0.0,
        }],
    }
}

impl ScenarioConfig {
    /// Two households with the full residential asset mix, tracking a
    /// day-ahead schedule.
    pub fn household() -> Self {
        Self {
            simulation: SimulationConfig {
                mode: DispatchMode::Tracking,
                ..SimulationConfig::default()
            },
            model: ModelConfig::default(),
            agents: vec![household_agent("hh_1"), household_agent("hh_2")],
        }
    }

    /// One industrial site with large storage and wind.
    pub fn industry() -> Self {
        Self {
            simulation: SimulationConfig {
                step_seconds: 3600.0,
                steps: 24,
                ..SimulationConfig::default()
            },
            model: ModelConfig::default(),
            agents: vec![industry_agent("ind_1")],
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["household", "industry"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "household" => Ok(Self::household()),
            "industry" => Ok(Self::industry()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "scenario".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid. Sizing fields are
    /// checked per plant family, so a scenario that validates will not hit a
    /// configuration error at model build time.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if !(s.step_seconds.is_finite() && s.step_seconds > 0.0) {
            errors.push(ConfigError {
                field: "simulation.step_seconds".into(),
                message: "must be > 0".into(),
            });
        }
        if s.steps == 0 {
            errors.push(ConfigError {
                field: "simulation.steps".into(),
                message: "must be > 0".into(),
            });
        }

        let m = &self.model;
        if m.electricity_tag.is_empty() || m.heat_tag.is_empty() {
            errors.push(ConfigError {
                field: "model.electricity_tag".into(),
                message: "carrier tags must not be empty".into(),
            });
        }
        if m.electricity_tag == m.heat_tag {
            errors.push(ConfigError {
                field: "model.heat_tag".into(),
                message: "must differ from model.electricity_tag".into(),
            });
        }
        if !(m.seconds_to_hours.is_finite() && m.seconds_to_hours > 0.0) {
            errors.push(ConfigError {
                field: "model.seconds_to_hours".into(),
                message: "must be > 0".into(),
            });
        }
        if !(m.balancing_limit.is_finite() && m.balancing_limit > 0.0) {
            errors.push(ConfigError {
                field: "model.balancing_limit".into(),
                message: "must be > 0".into(),
            });
        }

        let mut agent_ids = HashSet::new();
        for (i, agent) in self.agents.iter().enumerate() {
            let path = format!("agents[{i}]");
            if agent.id.is_empty() {
                errors.push(ConfigError {
                    field: format!("{path}.id"),
                    message: "must not be empty".into(),
                });
            }
            if !agent_ids.insert(agent.id.as_str()) {
                errors.push(ConfigError {
                    field: format!("{path}.id"),
                    message: format!("duplicate agent id \"{}\"", agent.id),
                });
            }

            let mut plant_ids = HashSet::new();
            let mut plant_vars = HashSet::new();
            for (j, plant) in agent.plants.iter().enumerate() {
                let path = format!("{path}.plants[{j}]");
                if !plant_ids.insert(plant.id.as_str()) {
                    errors.push(ConfigError {
                        field: format!("{path}.id"),
                        message: format!("duplicate plant id \"{}\"", plant.id),
                    });
                }
                let kind = match plant.kind() {
                    Ok(kind) => kind,
                    Err(e) => {
                        errors.push(ConfigError {
                            field: format!("{path}.type"),
                            message: e.to_string(),
                        });
                        continue;
                    }
                };
                for suffix in [
                    m.electricity_tag.as_str(),
                    m.heat_tag.as_str(),
                    "target",
                    "deviation_pos",
                    "deviation_neg",
                ] {
                    plant_vars.insert(variable_name(&plant.id, kind.tag(), suffix));
                }
                if let Err(e) = check_sizing(plant, kind) {
                    errors.push(ConfigError {
                        field: format!("{path}.sizing"),
                        message: e.to_string(),
                    });
                }
                if kind.has_storage() && plant.initial_soc.is_none() {
                    errors.push(ConfigError {
                        field: format!("{path}.initial_soc"),
                        message: format!("required for {kind}"),
                    });
                }
            }

            let mut market_names = HashSet::new();
            for (j, market) in agent.markets.iter().enumerate() {
                let field = format!("{path}.markets[{j}].name");
                if !market_names.insert(market.name.as_str()) {
                    errors.push(ConfigError {
                        field: field.clone(),
                        message: format!("duplicate market \"{}\"", market.name),
                    });
                }
                // the balancing slack owns `{agent}_balancing_{tag}`
                if market.name == "balancing" {
                    errors.push(ConfigError {
                        field: field.clone(),
                        message: "\"balancing\" is reserved for the balancing slack".into(),
                    });
                }
                let var = variable_name(&agent.id, &market.name, m.carrier_tag(market.carrier));
                if plant_vars.contains(&var) {
                    errors.push(ConfigError {
                        field,
                        message: format!("variable \"{var}\" collides with a plant variable"),
                    });
                }
            }
        }

        errors
    }
}

fn check_sizing(plant: &AssetDescriptor, kind: AssetKind) -> Result<(), crate::error::ModelError> {
    match kind {
        AssetKind::Pv | AssetKind::Wind | AssetKind::FixedGen => {
            plant.sizing::<SimplePlantSizing>().map(|_| ())
        }
        AssetKind::Battery | AssetKind::Psh | AssetKind::Hydrogen | AssetKind::HeatStorage => {
            plant.sizing::<StorageSizing>().map(|_| ())
        }
        AssetKind::Ev => plant.sizing::<EvSizing>().map(|_| ()),
        AssetKind::HeatPump => plant.sizing::<HeatPumpSizing>().map(|_| ()),
        AssetKind::InflexibleLoad | AssetKind::FlexibleLoad | AssetKind::Heat | AssetKind::Dhw => {
            Ok(())
        }
    }
}
