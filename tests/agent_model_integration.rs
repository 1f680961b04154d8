mod common;

use std::collections::BTreeMap;

use agent_rtc::config::ModelConfig;
use agent_rtc::devices::{
    AssetComponent, AssetDescriptor, AssetKind, Component, DispatchMode, SimplePlant,
};
use agent_rtc::error::ModelError;
use agent_rtc::forecast::ForecastSlice;
use agent_rtc::model::{Carrier, LinearModel, Sense};
use agent_rtc::sim::{AgentModelBuilder, FleetJob, TargetFollower, build_fleet};
use rstest::rstest;

#[rstest]
#[case(AssetKind::InflexibleLoad, "power", "x_inflexible_load_power")]
#[case(AssetKind::Heat, "heat", "x_heat_heat")]
#[case(AssetKind::Dhw, "dhw", "x_dhw_heat")]
fn fixed_demand_is_pinned_to_forecast(
    #[case] kind: AssetKind,
    #[case] attribute: &str,
    #[case] name: &str,
) {
    let config = ModelConfig::default();
    let ctx = common::step(DispatchMode::Economic)
        .with_forecast(ForecastSlice::new().with(format!("x_{attribute}"), 1_234.0));
    let mut c = AssetComponent::from_descriptor(&AssetDescriptor::new("x", kind), &ctx, &config)
        .expect("forecast present");
    let mut model = LinearModel::new();
    c.define_variables(&mut model, &config).expect("fresh model");
    assert_eq!(model.bounds(name), Some((1_234.0, 1_234.0)));
}

#[rstest]
#[case(AssetKind::Pv, true, (0, 2_500))]
#[case(AssetKind::Wind, true, (0, 2_500))]
#[case(AssetKind::FixedGen, true, (0, 2_500))]
#[case(AssetKind::Pv, false, (2_500, 2_500))]
#[case(AssetKind::Wind, false, (2_500, 2_500))]
#[case(AssetKind::FixedGen, false, (2_500, 2_500))]
fn generation_bounds_follow_controllability(
    #[case] kind: AssetKind,
    #[case] controllable: bool,
    #[case] expected: (i64, i64),
) {
    let ctx = common::step(DispatchMode::Economic)
        .with_forecast(ForecastSlice::new().with("g_power", 2_500.0));
    let plant = SimplePlant::new(&common::generator("g", kind, controllable), &ctx)
        .expect("forecast present");
    assert_eq!(plant.bounds(), expected);
}

#[test]
fn mixed_agent_builds_every_family() {
    let (agent, ctx) = common::mixed_agent();
    let config = ModelConfig::default();
    let model = AgentModelBuilder::new(&agent, &config)
        .build(&ctx)
        .expect("consistent inputs");

    for name in [
        "load_inflexible_load_power",
        "rad_heat_heat",
        "tap_dhw_heat",
        "roof_pv_power",
        "mill_wind_power",
        "chp_fixed_gen_power",
        "hp_hp_power",
        "hp_hp_heat",
        "car_ev_power",
        "car_ev_target",
        "car_ev_deviation_pos",
        "car_ev_deviation_neg",
        "bat_battery_power",
        "dam_psh_power",
        "h2_hydrogen_power",
        "tank_heat_storage_heat",
        "tank_heat_storage_deviation_neg",
        "site_lem_power",
        "site_balancing_power",
        "site_balancing_heat",
    ] {
        assert!(model.get(name).is_some(), "missing variable {name}");
    }

    for name in [
        "hp_hp_cop",
        "bat_battery_deviation_pos",
        "bat_battery_deviation_neg",
        "site_balance_power",
        "site_balance_heat",
    ] {
        assert!(model.constraint(name).is_some(), "missing constraint {name}");
    }
    assert_eq!(
        model.constraint("site_balance_heat").map(|c| c.sense),
        Some(Sense::Equal)
    );
}

#[test]
fn balancing_dominates_every_other_bound() {
    let (agent, ctx) = common::mixed_agent();
    let config = ModelConfig::default();
    let model = AgentModelBuilder::new(&agent, &config)
        .build(&ctx)
        .expect("consistent inputs");

    for (carrier, slack) in [
        (Carrier::Electricity, "site_balancing_power"),
        (Carrier::Heat, "site_balancing_heat"),
    ] {
        let (lower, upper) = model.bounds(slack).expect("slack registered");
        let others = model.carrier_magnitude(carrier) - upper;
        assert_eq!(lower, -upper);
        assert!(upper >= others, "{carrier}: {upper} < {others}");
    }
}

#[test]
fn reference_dispatch_is_feasible() {
    let (agent, ctx) = common::mixed_agent();
    let config = ModelConfig::default();
    let model = AgentModelBuilder::new(&agent, &config)
        .build(&ctx)
        .expect("consistent inputs");
    let values = TargetFollower.dispatch(&model, &agent).expect("dispatchable");

    let violations = model.check_assignment(&values);
    assert!(violations.is_empty(), "{violations:?}");
    // 7000 is beyond what the reservoir can take this step
    assert!(values["dam_psh_deviation_neg"] > 0.0);
}

#[test]
fn any_assignment_outside_bounds_is_reported() {
    let (agent, ctx) = common::mixed_agent();
    let config = ModelConfig::default();
    let model = AgentModelBuilder::new(&agent, &config)
        .build(&ctx)
        .expect("consistent inputs");
    let mut values = TargetFollower.dispatch(&model, &agent).expect("dispatchable");
    values.insert("roof_pv_power".into(), 3_801.0);
    assert!(!model.check_assignment(&values).is_empty());
}

#[test]
fn aborted_agent_never_yields_a_model() {
    let (agent, ctx) = common::mixed_agent();
    let config = ModelConfig::default();
    let ctx = ctx.with_soc("tank", 10_500.0);
    let err = AgentModelBuilder::new(&agent, &config)
        .build(&ctx)
        .expect_err("tank is overfull");
    assert_eq!(err.asset_id.as_deref(), Some("tank"));
    assert!(matches!(err.kind(), ModelError::Bounds(_)));
    assert!(err.to_string().contains("agent `site`, asset `tank`, step 48"));
}

#[test]
fn flexible_load_aborts_the_agent_step() {
    let (agent, ctx) = common::mixed_agent();
    let agent = agent.with_plant(AssetDescriptor::new("wash", AssetKind::FlexibleLoad));
    let err = AgentModelBuilder::new(&agent, &ModelConfig::default())
        .build(&ctx)
        .expect_err("flexible load has no model");
    assert!(matches!(err.kind(), ModelError::Unsupported(_)));
}

#[test]
fn economic_mode_ignores_targets() {
    let (agent, tracking) = common::mixed_agent();
    let economic = agent_rtc::devices::StepContext::new(
        tracking.step,
        tracking.timestamp,
        tracking.step_seconds(),
        DispatchMode::Economic,
    )
    .expect("valid step")
    .with_forecast(tracking.forecast.clone())
    .with_soc("car", 32_000.0)
    .with_soc("bat", 8_000.0)
    .with_soc("dam", 2_000.0)
    .with_soc("h2", 5_000.0)
    .with_soc("tank", 9_000.0);

    let model = AgentModelBuilder::new(&agent, &ModelConfig::default())
        .build(&economic)
        .expect("consistent inputs");
    assert!(model.get("bat_battery_target").is_none());
    assert!(model.constraint("bat_battery_deviation_pos").is_none());
}

#[test]
fn custom_carrier_tags_rename_variables() {
    let (agent, ctx) = common::mixed_agent();
    let config = ModelConfig {
        electricity_tag: "el".into(),
        heat_tag: "th".into(),
        ..ModelConfig::default()
    };
    let model = AgentModelBuilder::new(&agent, &config)
        .build(&ctx)
        .expect("consistent inputs");
    assert!(model.get("bat_battery_el").is_some());
    assert!(model.get("hp_hp_th").is_some());
    assert!(model.get("site_balancing_th").is_some());
}

#[test]
fn fleet_build_matches_sequential_build() {
    let (agent, ctx) = common::mixed_agent();
    let config = ModelConfig::default();
    let agents: Vec<_> = (0..8)
        .map(|i| {
            let mut a = agent.clone();
            a.id = format!("site{i}");
            a
        })
        .collect();
    let jobs: Vec<FleetJob<'_>> = agents
        .iter()
        .map(|a| FleetJob {
            agent: a,
            ctx: ctx.clone(),
        })
        .collect();

    let parallel = build_fleet(&jobs, &config);
    for (a, result) in agents.iter().zip(parallel) {
        let model = result.expect("consistent inputs");
        let sequential = AgentModelBuilder::new(a, &config)
            .build(&ctx)
            .expect("consistent inputs");
        let names = |m: &LinearModel| {
            m.variables()
                .map(|v| (v.name.clone(), (v.lower, v.upper)))
                .collect::<BTreeMap<_, _>>()
                .len()
        };
        assert_eq!(names(&model), names(&sequential));
        assert!(model.get(&format!("{}_balancing_power", a.id)).is_some());
    }
}
