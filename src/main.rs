//! Datadog Agent manager - main entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use datadog_agent_manager::{
    cli::{Cli, LogFormat},
    daemon::DockerDaemon,
    options::Options,
    runner::{RunnerBuilder, run_until_shutdown, termination_signal},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let options = Options::load(&cli.options_file_path).with_context(|| {
        format!(
            "failed to load options from {}",
            cli.options_file_path.display()
        )
    })?;
    tracing::info!(
        container = %options.container_name,
        image = %options.image_ref(),
        site = %options.site,
        "loaded add-on options"
    );

    let daemon = DockerDaemon::connect(&cli.docker_host)
        .await
        .context("failed to connect to docker")?;

    let runner = Arc::new(
        RunnerBuilder::new(options, Arc::new(daemon))
            .default_features()
            .resources_dir(&cli.resources_dir)
            .stop_grace(cli.stop_grace())
            .build(),
    );

    let reason = run_until_shutdown(runner, termination_signal(), cli.shutdown_timeout())
        .await
        .context("failed to shut down datadog agent")?;

    tracing::info!(reason = ?reason, "datadog agent manager stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("datadog_agent_manager=info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
