//! Core agent configuration, applied unconditionally.

use crate::container::AccessMode;
use crate::error::FeatureError;
use crate::runner::context::{CreateContext, StartContext};

/// Persistent run directory inside the agent container.
const RUN_DIRECTORY: &str = "/opt/datadog-agent/run";

const SYSTEM_CORE_CONF_SOURCE: &str = "conf.d/system_core.d/conf.yaml";
const SYSTEM_CORE_CONF_DEST: &str = "/etc/datadog-agent/conf.d/system_core.d/conf.yaml";

pub(super) fn before_create(ctx: &mut CreateContext<'_>) -> Result<(), FeatureError> {
    let api_key = ctx.options().api_key().to_string();
    let site = ctx.options().site.clone();
    let run_directory = ctx.options().run_directory.clone();

    ctx.add_env("DD_API_KEY", api_key)?;
    ctx.add_env("DD_SITE", site)?;
    // dogstatsd listens for metrics from other containers
    ctx.add_env("DD_DOGSTATSD_NON_LOCAL_TRAFFIC", "true")?;

    ctx.add_bind_mount("/proc/", "/host/proc/", AccessMode::ReadOnly)?;
    ctx.add_bind_mount("/sys/fs/cgroup/", "/host/sys/fs/cgroup", AccessMode::ReadOnly)?;
    ctx.add_bind_mount(
        "/var/run/docker.sock",
        "/var/run/docker.sock",
        AccessMode::ReadOnly,
    )?;
    ctx.add_bind_mount(run_directory, RUN_DIRECTORY, AccessMode::ReadWrite)?;

    Ok(())
}

pub(super) async fn before_start(ctx: &StartContext<'_>) -> Result<(), FeatureError> {
    ctx.copy_file_to_container(SYSTEM_CORE_CONF_SOURCE, SYSTEM_CORE_CONF_DEST)
        .await
        .map_err(|source| FeatureError::CopyFile {
            what: "system_core",
            source,
        })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::container::ContainerHandle;
    use crate::feature::Feature;
    use crate::feature::test_support::{create_spec, options};
    use crate::options::{FeatureToggles, Options};
    use crate::runner::context::StartContext;
    use crate::testing::{DaemonCall, FakeDaemon};

    fn all_toggle_combinations() -> Vec<FeatureToggles> {
        (0..16u8)
            .map(|bits| FeatureToggles {
                logging_enabled: bits & 1 != 0,
                process_collection_enabled: bits & 2 != 0,
                apm_enabled: bits & 4 != 0,
                network_performance_monitoring_enabled: bits & 8 != 0,
            })
            .collect()
    }

    #[test]
    fn test_core_contributes_for_every_toggle_combination() {
        for toggles in all_toggle_combinations() {
            let spec = create_spec(Feature::Core, &options(toggles));

            assert_eq!(
                spec.env_strings(),
                vec!["DD_API_KEY=k", "DD_SITE=s", "DD_DOGSTATSD_NON_LOCAL_TRAFFIC=true"]
            );
            assert_eq!(
                spec.bind_strings(),
                vec![
                    "/proc/:/host/proc/:ro",
                    "/sys/fs/cgroup/:/host/sys/fs/cgroup:ro",
                    "/var/run/docker.sock:/var/run/docker.sock:ro",
                    "/mnt/data/datadog-agent/run:/opt/datadog-agent/run:rw",
                ]
            );
        }
    }

    #[test]
    fn test_core_rejects_relative_run_directory() {
        let mut options = Options::new("k", "s", FeatureToggles::default());
        options.run_directory = "data/run".to_string();
        let mut spec = crate::container::ContainerSpec::base("dd-agent", options.image_ref());
        let mut ctx = crate::runner::context::CreateContext::new(&options, &mut spec);

        assert!(Feature::Core.before_create(&mut ctx).is_err());
    }

    #[tokio::test]
    async fn test_core_copies_system_core_conf() {
        let resources = tempfile::tempdir().unwrap();
        let conf = resources.path().join("conf.d/system_core.d");
        std::fs::create_dir_all(&conf).unwrap();
        std::fs::write(conf.join("conf.yaml"), "instances:\n  - {}\n").unwrap();

        let options = options(FeatureToggles::default());
        let daemon = FakeDaemon::new();
        let container = ContainerHandle::new("agent");
        let ctx = StartContext::new(&options, &daemon, &container, resources.path());

        Feature::Core.before_start(&ctx).await.unwrap();

        assert_eq!(
            daemon.calls(),
            vec![DaemonCall::Upload {
                id: "agent".to_string(),
                dest_dir: "/etc/datadog-agent/conf.d/system_core.d".to_string(),
                entries: vec!["conf.yaml".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn test_core_copy_failure_is_an_error() {
        let resources = tempfile::tempdir().unwrap();
        let options = options(FeatureToggles::default());
        let daemon = FakeDaemon::new();
        let container = ContainerHandle::new("agent");
        let ctx = StartContext::new(&options, &daemon, &container, resources.path());

        let err = Feature::Core.before_start(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("system_core"));
    }
}
