//! Parallel model construction across a fleet of agents.

use rayon::prelude::*;

use crate::config::{AgentConfig, ModelConfig};
use crate::devices::StepContext;
use crate::error::BuildError;
use crate::model::LinearModel;
use crate::sim::builder::AgentModelBuilder;

/// One agent's inputs for the current step.
#[derive(Debug, Clone)]
pub struct FleetJob<'a> {
    pub agent: &'a AgentConfig,
    pub ctx: StepContext,
}

/// Builds every agent's model for one step in parallel.
///
/// Agents share no state, so each build runs on its own rayon task. Results
/// come back in input order; a failure affects only its own agent.
pub fn build_fleet(
    jobs: &[FleetJob<'_>],
    config: &ModelConfig,
) -> Vec<Result<LinearModel, BuildError>> {
    jobs.par_iter()
        .map(|job| AgentModelBuilder::new(job.agent, config).build(&job.ctx))
        .collect()
}
