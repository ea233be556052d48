//! Container daemon capability.
//!
//! The runner only talks to the daemon through [`DaemonClient`], which keeps
//! the lifecycle logic independent of the Docker API. [`DockerDaemon`] is the
//! production implementation over bollard.

mod docker;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;

pub use docker::DockerDaemon;

use crate::container::{ContainerHandle, ContainerSpec};
use crate::error::DaemonError;

/// One progress message from an image pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullProgress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
}

/// Combined stdout/stderr of an attached container.
pub type OutputStream = BoxStream<'static, Result<Bytes, DaemonError>>;

/// Operations the runner needs from the container daemon.
///
/// Every operation either succeeds or fails outright; implementations do not
/// retry.
#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// Check the daemon is reachable.
    async fn ping(&self) -> Result<(), DaemonError>;

    /// IDs of all containers, running or not, carrying `label` (`key=value`).
    async fn list_containers_with_label(&self, label: &str) -> Result<Vec<String>, DaemonError>;

    /// Force-remove a container.
    async fn remove_container(&self, id: &str) -> Result<(), DaemonError>;

    /// Pull an image, reporting each progress message to `on_progress`.
    async fn pull_image(
        &self,
        image: &str,
        on_progress: &mut (dyn FnMut(PullProgress) + Send),
    ) -> Result<(), DaemonError>;

    /// Create (but do not start) a container.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, DaemonError>;

    async fn start_container(&self, container: &ContainerHandle) -> Result<(), DaemonError>;

    /// Stop a container, killing it after `grace`.
    async fn stop_container(
        &self,
        container: &ContainerHandle,
        grace: Duration,
    ) -> Result<(), DaemonError>;

    /// Attach to the container's combined output stream.
    async fn attach_output(&self, container: &ContainerHandle) -> Result<OutputStream, DaemonError>;

    /// Block until the container is not running; returns its exit code.
    async fn wait_until_stopped(&self, container: &ContainerHandle) -> Result<i64, DaemonError>;

    /// Extract a tar archive into `dest_dir` inside the container.
    async fn upload_archive(
        &self,
        container: &ContainerHandle,
        dest_dir: &str,
        archive: Bytes,
    ) -> Result<(), DaemonError>;
}
