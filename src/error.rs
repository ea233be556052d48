//! Error types for the agent manager.

use std::path::PathBuf;

use thiserror::Error;

/// Errors loading the add-on options file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read options file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse options file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse options: {0}")]
    Json(#[source] serde_json::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors talking to the container daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The daemon could not be reached or rejected the connection.
    #[error("Docker not available at {host}: {reason}")]
    NotAvailable { host: String, reason: String },

    /// Unsupported daemon address scheme.
    #[error("Unsupported Docker host '{0}', expected unix://, tcp:// or http://")]
    UnsupportedHost(String),

    /// A daemon API call failed.
    #[error("Docker {operation} failed: {reason}")]
    Request {
        operation: &'static str,
        reason: String,
    },
}

impl DaemonError {
    pub(crate) fn request(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Request {
            operation,
            reason: err.to_string(),
        }
    }
}

/// Errors preparing a file for transfer into the container.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to get source info for {path}: {source}")]
    SourceInfo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported source {path}: only regular files and directories can be copied")]
    UnsupportedSource { path: PathBuf },

    #[error("Destination '{0}' must be an absolute path naming a file")]
    InvalidDestination(String),

    #[error("Failed to create tar archive: {0}")]
    Tar(#[from] std::io::Error),
}

/// Errors raised by feature hooks.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// The build context rejected an environment assignment.
    #[error("Invalid environment variable '{key}': {reason}")]
    InvalidEnv { key: String, reason: &'static str },

    /// The build context rejected a bind mount.
    #[error("Invalid bind mount '{path}': {reason}")]
    InvalidMount { path: String, reason: &'static str },

    /// Copying a configuration file into the container failed.
    #[error("Failed to copy {what} conf file: {source}")]
    CopyFile {
        what: &'static str,
        #[source]
        source: CopyError,
    },
}

/// Errors from a single copy-into-container request.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("failed to copy to container: {0}")]
    Daemon(#[from] DaemonError),
}

/// Errors from the runner's lifecycle phases.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to list existing agent containers: {0}")]
    ListStale(#[source] DaemonError),

    #[error("Failed to remove existing agent container {id}: {source}")]
    RemoveStale {
        id: String,
        #[source]
        source: DaemonError,
    },

    #[error("Failed to pull image {image}: {source}")]
    Pull {
        image: String,
        #[source]
        source: DaemonError,
    },

    #[error("create failed: {feature} BeforeCreate hook: {source}")]
    CreateHook {
        feature: &'static str,
        #[source]
        source: FeatureError,
    },

    #[error("create failed: {0}")]
    Create(#[source] DaemonError),

    #[error("start failed: {feature} BeforeStart hook: {source}")]
    StartHook {
        feature: &'static str,
        #[source]
        source: FeatureError,
    },

    #[error("start failed: {0}")]
    Start(#[source] DaemonError),

    #[error("Failed to attach to agent container: {0}")]
    Attach(#[source] DaemonError),

    #[error("Failed to remove agent container {id}: {source}")]
    Remove {
        id: String,
        #[source]
        source: DaemonError,
    },

    #[error("Shutdown did not complete within {0:?}")]
    ShutdownTimeout(std::time::Duration),
}

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
