//! Step loop: builds every agent's model, dispatches it and carries state of
//! charge forward.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::{AgentConfig, ScenarioConfig};
use crate::devices::StepContext;
use crate::error::{BuildError, ModelError};
use crate::forecast::{ForecastSlice, ForecastTable};
use crate::sim::{FleetJob, StepClock, TargetFollower, build_fleet};
use crate::telemetry::{TelemetryRow, rows_from_model};

/// Counts and tracking quality over a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub models_built: usize,
    pub models_failed: usize,
    pub variables: usize,
    pub constraints: usize,
    /// Summed `deviation_pos + deviation_neg` over all dispatched models.
    pub total_deviation: f64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Summary ---")?;
        writeln!(f, "Steps:                 {}", self.steps)?;
        writeln!(f, "Agent models built:    {}", self.models_built)?;
        writeln!(f, "Agent steps aborted:   {}", self.models_failed)?;
        writeln!(f, "Variables registered:  {}", self.variables)?;
        writeln!(f, "Constraints registered: {}", self.constraints)?;
        write!(f, "Total deviation:       {:.1}", self.total_deviation)
    }
}

pub struct RunResult {
    pub telemetry: Vec<TelemetryRow>,
    pub failures: Vec<BuildError>,
    pub summary: RunSummary,
}

/// Runs `config.simulation.steps` control steps over every agent.
///
/// An agent whose model cannot be built for a step is reported in
/// [`RunResult::failures`] and keeps its state of charge; the other agents
/// carry on.
pub fn run_scenario(config: &ScenarioConfig, forecast: &ForecastTable) -> RunResult {
    let sim = &config.simulation;
    let mut clock = StepClock::new(sim.start, sim.step_seconds, sim.steps);
    let follower = TargetFollower;

    let mut socs: Vec<BTreeMap<String, f64>> = config
        .agents
        .iter()
        .map(|agent| {
            agent
                .plants
                .iter()
                .filter_map(|p| p.initial_soc.map(|soc| (p.id.clone(), soc)))
                .collect()
        })
        .collect();

    let mut telemetry = Vec::new();
    let mut failures = Vec::new();
    let mut summary = RunSummary::default();

    while let Some((step, timestamp)) = clock.tick() {
        let slice = forecast.slice(step);

        let mut jobs = Vec::with_capacity(config.agents.len());
        let mut indices = Vec::with_capacity(config.agents.len());
        for (i, agent) in config.agents.iter().enumerate() {
            match step_context(config, agent, step, timestamp, &slice, &socs[i]) {
                Ok(ctx) => {
                    jobs.push(FleetJob { agent, ctx });
                    indices.push(i);
                }
                Err(source) => failures.push(BuildError {
                    agent_id: agent.id.clone(),
                    asset_id: None,
                    step,
                    source,
                }),
            }
        }

        let results = build_fleet(&jobs, &config.model);

        for ((job, &i), result) in jobs.iter().zip(&indices).zip(results) {
            let model = match result {
                Ok(model) => model,
                Err(e) => {
                    warn!(error = %e, "agent step aborted");
                    failures.push(e);
                    continue;
                }
            };
            summary.models_built += 1;
            summary.variables += model.variable_count();
            summary.constraints += model.constraint_count();

            let dispatched = follower
                .dispatch(&model, job.agent)
                .and_then(|values| {
                    let next = follower.advance(job.agent, &job.ctx, &values, &config.model)?;
                    Ok((values, next))
                });
            match dispatched {
                Ok((values, next)) => {
                    summary.total_deviation += values
                        .iter()
                        .filter(|(name, _)| {
                            name.ends_with("_deviation_pos") || name.ends_with("_deviation_neg")
                        })
                        .map(|(_, v)| v)
                        .sum::<f64>();
                    telemetry.extend(rows_from_model(
                        step,
                        timestamp,
                        &job.agent.id,
                        &model,
                        Some(&values),
                    ));
                    socs[i].extend(next);
                }
                Err(source) => {
                    let e = BuildError {
                        agent_id: job.agent.id.clone(),
                        asset_id: None,
                        step,
                        source,
                    };
                    warn!(error = %e, "agent dispatch failed");
                    failures.push(e);
                }
            }
        }
        summary.steps += 1;
    }

    summary.models_failed = failures.len();
    info!(
        steps = summary.steps,
        built = summary.models_built,
        failed = summary.models_failed,
        "run finished"
    );

    RunResult {
        telemetry,
        failures,
        summary,
    }
}

/// Per-agent context: the step's forecast, current SOCs and, for storage
/// plants with a `{id}_target` forecast, their target.
fn step_context(
    config: &ScenarioConfig,
    agent: &AgentConfig,
    step: usize,
    timestamp: DateTime<Utc>,
    slice: &ForecastSlice,
    socs: &BTreeMap<String, f64>,
) -> Result<StepContext, ModelError> {
    let sim = &config.simulation;
    let mut ctx = StepContext::new(step, timestamp, sim.step_seconds, sim.mode)?
        .with_forecast(slice.clone());
    for (plant, soc) in socs {
        ctx.set_soc(plant.clone(), *soc);
    }
    for plant in &agent.plants {
        if let Some(target) = slice.get(&format!("{}_target", plant.id)) {
            ctx.set_target(plant.id.clone(), target);
        }
    }
    Ok(ctx)
}
