//! Composable features configuring the agent container.
//!
//! Each feature reads the add-on options and contributes environment
//! variables, bind mounts and configuration files through two hooks:
//!
//! - `before_create` gets a [`CreateContext`] and may add env vars and mounts
//!   to the container definition.
//! - `before_start` gets a [`StartContext`] and may copy files into the
//!   created container.
//!
//! Features never read each other's contributions, so the result does not
//! depend on the order they run in. The runner still applies them in a fixed
//! order so the container definition and logs are stable between runs.

mod apm;
mod core_agent;
mod logging;
mod process_collection;
mod system_probe;

use std::fmt;

use crate::error::FeatureError;
use crate::runner::context::{CreateContext, StartContext};

/// A feature of the managed agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Credentials, host mounts and the core system check. Always active.
    Core,
    /// Journald log collection.
    Logging,
    /// Live process collection.
    ProcessCollection,
    /// System probe for process stats and network performance monitoring.
    SystemProbe,
    /// APM trace agent.
    Apm,
}

impl Feature {
    /// Every feature, in the order the runner applies them.
    pub const ALL: [Feature; 5] = [
        Feature::Core,
        Feature::Logging,
        Feature::ProcessCollection,
        Feature::SystemProbe,
        Feature::Apm,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Logging => "logging",
            Self::ProcessCollection => "process_collection",
            Self::SystemProbe => "system_probe",
            Self::Apm => "apm",
        }
    }

    /// Contribute to the container definition.
    pub fn before_create(&self, ctx: &mut CreateContext<'_>) -> Result<(), FeatureError> {
        match self {
            Self::Core => core_agent::before_create(ctx),
            Self::Logging => logging::before_create(ctx),
            Self::ProcessCollection => process_collection::before_create(ctx),
            Self::SystemProbe => system_probe::before_create(ctx),
            Self::Apm => apm::before_create(ctx),
        }
    }

    /// Prepare the created container before it starts.
    pub async fn before_start(&self, ctx: &StartContext<'_>) -> Result<(), FeatureError> {
        match self {
            Self::Core => core_agent::before_start(ctx).await,
            Self::Logging => logging::before_start(ctx).await,
            Self::ProcessCollection | Self::SystemProbe | Self::Apm => Ok(()),
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::container::ContainerSpec;
    use crate::options::FeatureToggles;

    #[test]
    fn test_all_features_disabled_only_core_and_apm_contribute() {
        let options = options(FeatureToggles::default());
        let base = ContainerSpec::base(&options.container_name, options.image_ref());

        for feature in [
            Feature::Logging,
            Feature::ProcessCollection,
            Feature::SystemProbe,
        ] {
            assert_eq!(create_spec(feature, &options), base, "{feature} changed the container definition");
        }
        assert_ne!(create_spec(Feature::Core, &options), base);
        assert_eq!(
            create_spec(Feature::Apm, &options).env_value("DD_APM_ENABLED"),
            Some("false")
        );
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<&str> = Feature::ALL.iter().map(Feature::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Feature::ALL.len());
    }
}
