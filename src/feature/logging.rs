//! Journald log collection.

use crate::container::AccessMode;
use crate::error::FeatureError;
use crate::runner::context::{CreateContext, StartContext};

const JOURNALD_CONF_SOURCE: &str = "conf.d/journald.d/conf.yaml";
const JOURNALD_CONF_DEST: &str = "/etc/datadog-agent/conf.d/journald.d/conf.yaml";

pub(super) fn before_create(ctx: &mut CreateContext<'_>) -> Result<(), FeatureError> {
    if !ctx.options().features.logging_enabled {
        return Ok(());
    }

    tracing::info!("enabling log collection");

    ctx.add_env("DD_LOGS_ENABLED", "true")?;

    ctx.add_bind_mount("/var/log/journal", "/var/log/journal", AccessMode::ReadOnly)?;
    ctx.add_bind_mount("/etc/machine-id", "/etc/machine-id", AccessMode::ReadOnly)?;

    Ok(())
}

pub(super) async fn before_start(ctx: &StartContext<'_>) -> Result<(), FeatureError> {
    if !ctx.options().features.logging_enabled {
        return Ok(());
    }

    ctx.copy_file_to_container(JOURNALD_CONF_SOURCE, JOURNALD_CONF_DEST)
        .await
        .map_err(|source| FeatureError::CopyFile {
            what: "journald",
            source,
        })
}

#[cfg(test)]
mod tests {
    use crate::container::ContainerHandle;
    use crate::feature::Feature;
    use crate::feature::test_support::{create_spec, options};
    use crate::options::FeatureToggles;
    use crate::runner::context::StartContext;
    use crate::testing::{DaemonCall, FakeDaemon};

    fn logging(enabled: bool) -> FeatureToggles {
        FeatureToggles {
            logging_enabled: enabled,
            ..Default::default()
        }
    }

    #[test]
    fn test_logging_enabled() {
        let spec = create_spec(Feature::Logging, &options(logging(true)));

        assert_eq!(spec.env_strings(), vec!["DD_LOGS_ENABLED=true"]);
        assert_eq!(
            spec.bind_strings(),
            vec![
                "/var/log/journal:/var/log/journal:ro",
                "/etc/machine-id:/etc/machine-id:ro",
            ]
        );
    }

    #[test]
    fn test_logging_disabled() {
        let spec = create_spec(Feature::Logging, &options(logging(false)));

        assert!(spec.env.is_empty());
        assert!(spec.mounts.is_empty());
    }

    #[tokio::test]
    async fn test_logging_disabled_copies_nothing() {
        let resources = tempfile::tempdir().unwrap();
        let options = options(logging(false));
        let daemon = FakeDaemon::new();
        let container = ContainerHandle::new("agent");
        let ctx = StartContext::new(&options, &daemon, &container, resources.path());

        Feature::Logging.before_start(&ctx).await.unwrap();

        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn test_logging_enabled_copies_journald_conf() {
        let resources = tempfile::tempdir().unwrap();
        let conf = resources.path().join("conf.d/journald.d");
        std::fs::create_dir_all(&conf).unwrap();
        std::fs::write(conf.join("conf.yaml"), "logs:\n  - type: journald\n").unwrap();

        let options = options(logging(true));
        let daemon = FakeDaemon::new();
        let container = ContainerHandle::new("agent");
        let ctx = StartContext::new(&options, &daemon, &container, resources.path());

        Feature::Logging.before_start(&ctx).await.unwrap();

        assert_eq!(
            daemon.calls(),
            vec![DaemonCall::Upload {
                id: "agent".to_string(),
                dest_dir: "/etc/datadog-agent/conf.d/journald.d".to_string(),
                entries: vec!["conf.yaml".to_string()],
            }]
        );
    }
}
