//! Asset components that register variables and constraints into an agent's
//! step model.

/// Market and balancing slacks.
pub mod boundary;
/// Inflexible demand and simple generation.
pub mod fixed;
/// Electricity-to-heat coupling.
pub mod heat_pump;
/// Tag-to-component dispatch.
pub mod registry;
/// EV, battery family and heat storage.
pub mod storage;
pub mod types;

// Re-export the main types for convenience
pub use boundary::{Balancing, Market};
pub use fixed::{FixedInjection, SimplePlant};
pub use heat_pump::HeatPump;
pub use registry::AssetComponent;
pub use storage::{FlexibleStorage, PowerBounds, StorageParams, storage_bounds};
pub use types::{
    AssetDescriptor, AssetKind, BalanceTerm, Component, DispatchMode, EvSizing, HeatPumpSizing,
    SimplePlantSizing, StepContext, StorageSizing, carrier_variable_name, to_unit, variable_name,
};
