//! Per-agent, per-step optimization model builder for energy-system agents.
//!
//! Each control step, every agent's plants are turned into bounded decision
//! variables and linear constraints inside a fresh [`model::LinearModel`],
//! ready for an external solver.

/// TOML scenario configuration and presets.
pub mod config;
pub mod devices;
pub mod error;
pub mod forecast;
/// Optimization-model seam and in-memory container.
pub mod model;
pub mod runner;
/// Agent model builder, fleet build, clock and reference dispatcher.
pub mod sim;
pub mod telemetry;
