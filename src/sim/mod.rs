/// Per-agent step model assembly.
pub mod builder;
/// Step clock with wall-clock timestamps.
pub mod clock;
/// Reference target-following dispatcher.
pub mod controller;
/// Parallel build across agents.
pub mod fleet;

pub use builder::AgentModelBuilder;
pub use clock::StepClock;
pub use controller::{TargetFollower, next_soc};
pub use fleet::{FleetJob, build_fleet};
