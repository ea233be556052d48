//! Command line arguments.
//!
//! Every flag can also be set through the environment, which is how the
//! add-on supervisor configures the manager.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ColorChoice, Parser, ValueEnum};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "datadog-agent-manager")]
#[command(about = "Runs the Datadog Agent as a managed sidecar container")]
#[command(
    long_about = "Pulls the Datadog Agent image, creates a container configured from the add-on options and keeps it running until a termination signal.\nExample: datadog-agent-manager --options-file-path /data/options.json"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    /// Add-on options file (JSON)
    #[arg(long, env = "OPTIONS_FILE_PATH", default_value = "/data/options.json")]
    pub options_file_path: PathBuf,

    /// Docker daemon address (unix:// or tcp://)
    #[arg(long, env = "DOCKER_HOST", default_value = "unix:///run/docker.sock")]
    pub docker_host: String,

    /// Directory holding the check configuration files copied into the agent
    #[arg(long, env = "RESOURCES_DIR", default_value = "resources")]
    pub resources_dir: PathBuf,

    /// Seconds the agent is given to exit before it is killed
    #[arg(long, env = "STOP_TIMEOUT_SECS", default_value_t = 15)]
    pub stop_timeout_secs: u64,

    /// Hard limit in seconds on stopping and removing the agent
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 30)]
    pub shutdown_timeout_secs: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_explicit_flags() {
        let cli = Cli::try_parse_from([
            "datadog-agent-manager",
            "--options-file-path",
            "/tmp/options.json",
            "--docker-host",
            "tcp://127.0.0.1:2375",
            "--stop-timeout-secs",
            "5",
            "--shutdown-timeout-secs",
            "10",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.options_file_path, PathBuf::from("/tmp/options.json"));
        assert_eq!(cli.docker_host, "tcp://127.0.0.1:2375");
        assert_eq!(cli.stop_grace(), Duration::from_secs(5));
        assert_eq!(cli.shutdown_timeout(), Duration::from_secs(10));
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        assert!(
            Cli::try_parse_from(["datadog-agent-manager", "--log-format", "xml"]).is_err()
        );
    }
}
