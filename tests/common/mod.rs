//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use agent_rtc::config::{AgentConfig, MarketConfig, ModelConfig, ScenarioConfig};
use agent_rtc::devices::{
    AssetDescriptor, AssetKind, DispatchMode, EvSizing, HeatPumpSizing, SimplePlantSizing,
    StepContext, StorageParams, StorageSizing,
};
use agent_rtc::forecast::{ForecastSlice, SyntheticProfile};
use agent_rtc::model::Carrier;
use chrono::{DateTime, TimeZone, Utc};

/// Start of every fixture step (2024-06-01 12:00 UTC).
pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Empty 15-minute step context.
pub fn step(mode: DispatchMode) -> StepContext {
    StepContext::new(48, noon(), 900.0, mode).expect("900 s is a valid step")
}

/// Battery parameters of the worked example (10 kWh, 5 kW, 95%, 15 min).
pub fn worked_example(soc: f64) -> StorageParams {
    StorageParams {
        capacity: 10_000.0,
        soc,
        power: 5_000.0,
        efficiency: 0.95,
        step_hours: 0.25,
        discharge: true,
        available: true,
    }
}

pub fn battery(id: &str, kind: AssetKind) -> AssetDescriptor {
    AssetDescriptor::new(id, kind)
        .with_sizing(&StorageSizing {
            capacity: 10_000.0,
            power: 5_000.0,
            efficiency: 0.95,
            b2g: true,
        })
        .expect("storage sizing serializes")
}

pub fn ev(id: &str, v2g: bool) -> AssetDescriptor {
    AssetDescriptor::new(id, AssetKind::Ev)
        .with_sizing(&EvSizing {
            capacity: 60_000.0,
            charging_home: 11_000.0,
            charging_ac: Some(22_000.0),
            charging_dc: None,
            charging_efficiency: 0.9,
            v2g,
        })
        .expect("ev sizing serializes")
}

pub fn generator(id: &str, kind: AssetKind, controllable: bool) -> AssetDescriptor {
    AssetDescriptor::new(id, kind)
        .with_sizing(&SimplePlantSizing { controllable })
        .expect("plant sizing serializes")
}

pub fn heat_pump(id: &str, controllable: bool) -> AssetDescriptor {
    AssetDescriptor::new(id, AssetKind::HeatPump)
        .with_sizing(&HeatPumpSizing {
            power: 3_000.0,
            heat: 10_000.0,
            controllable,
        })
        .expect("heat pump sizing serializes")
}

/// One agent owning one plant of every supported family, with the step
/// inputs it needs.
pub fn mixed_agent() -> (AgentConfig, StepContext) {
    let agent = AgentConfig::new("site")
        .with_plant(AssetDescriptor::new("load", AssetKind::InflexibleLoad))
        .with_plant(AssetDescriptor::new("rad", AssetKind::Heat))
        .with_plant(AssetDescriptor::new("tap", AssetKind::Dhw))
        .with_plant(generator("roof", AssetKind::Pv, true))
        .with_plant(generator("mill", AssetKind::Wind, false))
        .with_plant(generator("chp", AssetKind::FixedGen, false))
        .with_plant(heat_pump("hp", true))
        .with_plant(ev("car", true))
        .with_plant(battery("bat", AssetKind::Battery))
        .with_plant(battery("dam", AssetKind::Psh))
        .with_plant(battery("h2", AssetKind::Hydrogen))
        .with_plant(battery("tank", AssetKind::HeatStorage))
        .with_market(MarketConfig {
            name: "lem".into(),
            carrier: Carrier::Electricity,
            committed: 1_500.0,
        });

    let forecast = ForecastSlice::from_iter([
        ("load_power", 900.0),
        ("rad_heat", 2_400.0),
        ("tap_dhw", 350.0),
        ("roof_power", 3_800.0),
        ("mill_power", 1_200.0),
        ("chp_power", 800.0),
        ("hp_cop", 3.4),
        ("car_availability", 1.0),
        ("car_energy_consumed", 2_000.0),
    ]);

    let ctx = step(DispatchMode::Tracking)
        .with_forecast(forecast)
        .with_soc("car", 32_000.0)
        .with_soc("bat", 8_000.0)
        .with_soc("dam", 2_000.0)
        .with_soc("h2", 5_000.0)
        .with_soc("tank", 9_000.0)
        .with_target("car", 4_000.0)
        .with_target("bat", -2_000.0)
        .with_target("dam", 7_000.0)
        .with_target("h2", 0.0)
        .with_target("tank", 1_000.0);

    (agent, ctx)
}

/// A preset with `steps` steps and its seeded synthetic forecast.
pub fn preset_with_forecast(
    name: &str,
    steps: usize,
) -> (ScenarioConfig, agent_rtc::forecast::ForecastTable) {
    let mut config = ScenarioConfig::from_preset(name).expect("preset exists");
    config.simulation.steps = steps;
    let forecast = SyntheticProfile::new(config.simulation.step_seconds, config.simulation.seed)
        .table_for(&config.agents, steps);
    (config, forecast)
}

pub fn default_model() -> ModelConfig {
    ModelConfig::default()
}
