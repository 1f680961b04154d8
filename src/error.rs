//! Error types raised while building an agent's per-step optimization model.

use thiserror::Error;

/// Failure raised by a component or by the model container.
///
/// Every variant is fatal for the agent step being built; nothing here is
/// retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// Unknown asset type tag or a missing/invalid sizing field.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Computed bounds are inconsistent (`lower > upper`, SOC outside
    /// `[0, capacity]`, ...).
    #[error("bounds error: {0}")]
    Bounds(String),

    /// A forecast key, SOC or target required for this step is absent.
    #[error("missing data: {0}")]
    MissingData(String),

    /// The asset family has no complete constraint set.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A variable or constraint name was registered twice in one model.
    #[error("duplicate name `{0}` in model")]
    DuplicateName(String),

    /// A constraint referenced a variable the model does not know.
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    /// The LP solver rejected the model or found no solution.
    #[error("solver failed: {0}")]
    Solver(String),
}

impl ModelError {
    pub(crate) fn configuration(desc: impl Into<String>) -> Self {
        Self::Configuration(desc.into())
    }

    pub(crate) fn bounds(desc: impl Into<String>) -> Self {
        Self::Bounds(desc.into())
    }

    pub(crate) fn missing(desc: impl Into<String>) -> Self {
        Self::MissingData(desc.into())
    }

    pub(crate) fn unsupported(desc: impl Into<String>) -> Self {
        Self::Unsupported(desc.into())
    }
}

/// A [`ModelError`] attributed to the agent, asset and step it occurred in.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("agent `{agent_id}`{}, step {step}: {source}", asset_suffix(.asset_id))]
pub struct BuildError {
    pub agent_id: String,
    pub asset_id: Option<String>,
    pub step: usize,
    #[source]
    pub source: ModelError,
}

fn asset_suffix(asset_id: &Option<String>) -> String {
    match asset_id {
        Some(id) => format!(", asset `{id}`"),
        None => String::new(),
    }
}

impl BuildError {
    /// The underlying failure without attribution.
    pub fn kind(&self) -> &ModelError {
        &self.source
    }
}
