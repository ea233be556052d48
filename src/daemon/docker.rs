//! Docker implementation of [`DaemonClient`] using bollard.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions, LogOutput,
    ListContainersOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    UploadToContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, HostConfigCgroupnsModeEnum};
use bollard::{API_DEFAULT_VERSION, Docker};
use bytes::Bytes;
use futures::StreamExt;

use crate::container::{ContainerHandle, ContainerSpec};
use crate::daemon::{DaemonClient, OutputStream, PullProgress};
use crate::error::DaemonError;

/// Request timeout for daemon API calls, in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Docker Engine API client.
#[derive(Debug, Clone)]
pub struct DockerDaemon {
    docker: Docker,
    host: String,
}

impl DockerDaemon {
    /// Connect to the daemon at `host` and check it responds.
    ///
    /// Accepts `unix://` socket paths and `tcp://` / `http://` addresses.
    pub async fn connect(host: &str) -> Result<Self, DaemonError> {
        let not_available = |e: bollard::errors::Error| DaemonError::NotAvailable {
            host: host.to_string(),
            reason: e.to_string(),
        };

        let docker = if host.starts_with("unix://") {
            Docker::connect_with_unix(host, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else {
            return Err(DaemonError::UnsupportedHost(host.to_string()));
        }
        .map_err(not_available)?;

        let docker = docker.negotiate_version().await.map_err(not_available)?;

        let daemon = Self {
            docker,
            host: host.to_string(),
        };
        daemon.ping().await?;

        tracing::debug!(host = %daemon.host, "connected to Docker daemon");
        Ok(daemon)
    }
}

#[async_trait]
impl DaemonClient for DockerDaemon {
    async fn ping(&self) -> Result<(), DaemonError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| DaemonError::NotAvailable {
                host: self.host.clone(),
                reason: e.to_string(),
            })
    }

    async fn list_containers_with_label(&self, label: &str) -> Result<Vec<String>, DaemonError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label.to_string()]);

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| DaemonError::request("list containers", e))?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn remove_container(&self, id: &str) -> Result<(), DaemonError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| DaemonError::request("remove container", e))
    }

    async fn pull_image(
        &self,
        image: &str,
        on_progress: &mut (dyn FnMut(PullProgress) + Send),
    ) -> Result<(), DaemonError> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| DaemonError::request("pull image", e))?;
            on_progress(PullProgress {
                id: info.id,
                status: info.status,
                progress: info.progress,
            });
        }

        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, DaemonError> {
        let host_config = HostConfig {
            binds: Some(spec.bind_strings()),
            pid_mode: spec.host_pid.then(|| "host".to_string()),
            cgroupns_mode: spec.host_cgroupns.then_some(HostConfigCgroupnsModeEnum::HOST),
            ..Default::default()
        };

        let labels: HashMap<String, String> = spec
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env_strings()),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| DaemonError::request("create container", e))?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, "{}", warning);
        }

        Ok(ContainerHandle::new(response.id))
    }

    async fn start_container(&self, container: &ContainerHandle) -> Result<(), DaemonError> {
        self.docker
            .start_container(container.id(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DaemonError::request("start container", e))
    }

    async fn stop_container(
        &self,
        container: &ContainerHandle,
        grace: Duration,
    ) -> Result<(), DaemonError> {
        let options = StopContainerOptions {
            t: i64::try_from(grace.as_secs()).unwrap_or(i64::MAX),
        };

        self.docker
            .stop_container(container.id(), Some(options))
            .await
            .map_err(|e| DaemonError::request("stop container", e))
    }

    async fn attach_output(&self, container: &ContainerHandle) -> Result<OutputStream, DaemonError> {
        let options = AttachContainerOptions::<String> {
            stream: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            ..Default::default()
        };

        let AttachContainerResults { output, .. } = self
            .docker
            .attach_container(container.id(), Some(options))
            .await
            .map_err(|e| DaemonError::request("attach container", e))?;

        Ok(output
            .map(|chunk| {
                chunk
                    .map(LogOutput::into_bytes)
                    .map_err(|e| DaemonError::request("read container output", e))
            })
            .boxed())
    }

    async fn wait_until_stopped(&self, container: &ContainerHandle) -> Result<i64, DaemonError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(container.id(), Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(DaemonError::request("wait container", e)),
            None => Err(DaemonError::request(
                "wait container",
                "stream ended without a status",
            )),
        }
    }

    async fn upload_archive(
        &self,
        container: &ContainerHandle,
        dest_dir: &str,
        archive: Bytes,
    ) -> Result<(), DaemonError> {
        let options = UploadToContainerOptions {
            path: dest_dir.to_string(),
            ..Default::default()
        };

        self.docker
            .upload_to_container(container.id(), Some(options), archive)
            .await
            .map_err(|e| DaemonError::request("upload archive", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let err = DockerDaemon::connect("ssh://example.com").await.unwrap_err();
        assert!(matches!(err, DaemonError::UnsupportedHost(_)));
    }

    #[tokio::test]
    async fn test_connect_missing_socket_is_unavailable() {
        let err = DockerDaemon::connect("unix:///nonexistent/docker.sock")
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::NotAvailable { .. }));
    }
}
