//! Maps an asset type tag to its component.

use crate::config::ModelConfig;
use crate::devices::boundary::{Balancing, Market};
use crate::devices::fixed::{FixedInjection, SimplePlant};
use crate::devices::heat_pump::HeatPump;
use crate::devices::storage::FlexibleStorage;
use crate::devices::types::{AssetDescriptor, AssetKind, BalanceTerm, Component, StepContext};
use crate::error::ModelError;
use crate::model::OptimizationModel;

/// Closed set of component implementations, one instance per asset per step.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetComponent {
    Fixed(FixedInjection),
    Plant(SimplePlant),
    Storage(FlexibleStorage),
    HeatPump(HeatPump),
    Market(Market),
    Balancing(Balancing),
}

impl AssetComponent {
    /// Builds the component for `descriptor` from the step's inputs.
    ///
    /// # Errors
    ///
    /// [`ModelError::Configuration`] for an unknown tag or bad sizing,
    /// [`ModelError::Unsupported`] for `flexible_load`, and whatever the
    /// family's bound computation reports.
    pub fn from_descriptor(
        descriptor: &AssetDescriptor,
        ctx: &StepContext,
        config: &ModelConfig,
    ) -> Result<Self, ModelError> {
        let component = match descriptor.kind()? {
            AssetKind::InflexibleLoad | AssetKind::Heat | AssetKind::Dhw => {
                Self::Fixed(FixedInjection::new(descriptor, ctx)?)
            }
            AssetKind::Pv | AssetKind::Wind | AssetKind::FixedGen => {
                Self::Plant(SimplePlant::new(descriptor, ctx)?)
            }
            AssetKind::Battery | AssetKind::Psh | AssetKind::Hydrogen | AssetKind::HeatStorage => {
                Self::Storage(FlexibleStorage::generic(descriptor, ctx, config)?)
            }
            AssetKind::Ev => Self::Storage(FlexibleStorage::ev(descriptor, ctx, config)?),
            AssetKind::HeatPump => Self::HeatPump(HeatPump::new(descriptor, ctx)?),
            AssetKind::FlexibleLoad => {
                return Err(ModelError::unsupported(format!(
                    "flexible load `{}` has no constraint set",
                    descriptor.id
                )));
            }
        };
        Ok(component)
    }

    fn inner(&self) -> &dyn Component {
        match self {
            Self::Fixed(c) => c,
            Self::Plant(c) => c,
            Self::Storage(c) => c,
            Self::HeatPump(c) => c,
            Self::Market(c) => c,
            Self::Balancing(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Component {
        match self {
            Self::Fixed(c) => c,
            Self::Plant(c) => c,
            Self::Storage(c) => c,
            Self::HeatPump(c) => c,
            Self::Market(c) => c,
            Self::Balancing(c) => c,
        }
    }
}

impl Component for AssetComponent {
    fn define_variables(
        &mut self,
        model: &mut dyn OptimizationModel,
        config: &ModelConfig,
    ) -> Result<(), ModelError> {
        self.inner_mut().define_variables(model, config)
    }

    fn define_constraints(&self, model: &mut dyn OptimizationModel) -> Result<(), ModelError> {
        self.inner().define_constraints(model)
    }

    fn balance_terms(&self) -> Vec<BalanceTerm> {
        self.inner().balance_terms()
    }

    fn component_type(&self) -> &'static str {
        self.inner().component_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{DispatchMode, StorageSizing};
    use crate::forecast::ForecastSlice;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn ctx() -> StepContext {
        StepContext::new(
            0,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            900.0,
            DispatchMode::Economic,
        )
        .unwrap()
        .with_forecast(
            ForecastSlice::new()
                .with("a_power", 100.0)
                .with("a_heat", 100.0)
                .with("a_dhw", 100.0),
        )
        .with_soc("a", 1000.0)
    }

    #[rstest]
    #[case(AssetKind::InflexibleLoad, "FixedInjection")]
    #[case(AssetKind::Heat, "FixedInjection")]
    #[case(AssetKind::Dhw, "FixedInjection")]
    #[case(AssetKind::Battery, "Storage")]
    #[case(AssetKind::Psh, "Storage")]
    #[case(AssetKind::Hydrogen, "Storage")]
    #[case(AssetKind::HeatStorage, "HeatStorage")]
    fn dispatches_on_tag(#[case] kind: AssetKind, #[case] expected: &str) {
        let descriptor = AssetDescriptor::new("a", kind)
            .with_sizing(&StorageSizing {
                capacity: 2000.0,
                power: 500.0,
                efficiency: 0.9,
                b2g: true,
            })
            .unwrap();
        let c = AssetComponent::from_descriptor(&descriptor, &ctx(), &ModelConfig::default())
            .unwrap();
        assert_eq!(c.component_type(), expected);
    }

    #[test]
    fn flexible_load_is_unsupported() {
        let descriptor = AssetDescriptor::new("a", AssetKind::FlexibleLoad);
        let err = AssetComponent::from_descriptor(&descriptor, &ctx(), &ModelConfig::default())
            .unwrap_err();
        assert!(matches!(err, ModelError::Unsupported(_)));
    }

    #[test]
    fn unknown_tag_is_configuration_error() {
        let mut descriptor = AssetDescriptor::new("a", AssetKind::Pv);
        descriptor.type_tag = "tidal".into();
        let err = AssetComponent::from_descriptor(&descriptor, &ctx(), &ModelConfig::default())
            .unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }
}
