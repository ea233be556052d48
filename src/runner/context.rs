//! Phase-scoped build contexts handed to feature hooks.
//!
//! [`CreateContext`] can only add environment variables and bind mounts to
//! the container definition. [`StartContext`] can only copy files into the
//! created container. Neither can reach the other's capability.

use std::path::{Path, PathBuf};

use crate::container::{AccessMode, BindMount, ContainerHandle, ContainerSpec, EnvVar};
use crate::daemon::DaemonClient;
use crate::error::{CopyError, FeatureError};
use crate::options::Options;
use crate::runner::archive::prepare_copy;

/// Build context for `before_create` hooks.
pub struct CreateContext<'a> {
    options: &'a Options,
    spec: &'a mut ContainerSpec,
}

impl<'a> CreateContext<'a> {
    pub fn new(options: &'a Options, spec: &'a mut ContainerSpec) -> Self {
        Self { options, spec }
    }

    pub fn options(&self) -> &Options {
        self.options
    }

    /// Append an environment assignment.
    pub fn add_env(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), FeatureError> {
        let key = key.into();
        let value = value.into();

        let reason = if key.is_empty() {
            Some("key must not be empty")
        } else if key.contains('=') {
            Some("key must not contain '='")
        } else if key.contains('\0') || value.contains('\0') {
            Some("must not contain NUL bytes")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(FeatureError::InvalidEnv { key, reason });
        }

        self.spec.env.push(EnvVar { key, value });
        Ok(())
    }

    /// Append a bind mount of a host path into the container.
    pub fn add_bind_mount(
        &mut self,
        source: impl Into<String>,
        destination: impl Into<String>,
        mode: AccessMode,
    ) -> Result<(), FeatureError> {
        let source = source.into();
        let destination = destination.into();

        for path in [&source, &destination] {
            if !path.starts_with('/') {
                return Err(FeatureError::InvalidMount {
                    path: path.clone(),
                    reason: "must be an absolute path",
                });
            }
            if path.contains(':') {
                return Err(FeatureError::InvalidMount {
                    path: path.clone(),
                    reason: "must not contain ':'",
                });
            }
        }

        self.spec.mounts.push(BindMount {
            source,
            destination,
            mode,
        });
        Ok(())
    }
}

/// Build context for `before_start` hooks.
pub struct StartContext<'a> {
    options: &'a Options,
    daemon: &'a dyn DaemonClient,
    container: &'a ContainerHandle,
    resources_dir: &'a Path,
}

impl<'a> StartContext<'a> {
    pub fn new(
        options: &'a Options,
        daemon: &'a dyn DaemonClient,
        container: &'a ContainerHandle,
        resources_dir: &'a Path,
    ) -> Self {
        Self {
            options,
            daemon,
            container,
            resources_dir,
        }
    }

    pub fn options(&self) -> &Options {
        self.options
    }

    /// Copy a host file into the created container at `destination`.
    ///
    /// Relative sources resolve against the resources directory. The
    /// destination must not already exist in the container.
    pub async fn copy_file_to_container(
        &self,
        source: impl AsRef<Path>,
        destination: &str,
    ) -> Result<(), CopyError> {
        let source = self.resolve(source.as_ref());
        let prepared = prepare_copy(&source, destination)?;

        tracing::debug!(
            container = %self.container,
            source = %source.display(),
            destination,
            "copying file into container"
        );

        self.daemon
            .upload_archive(self.container, &prepared.dest_dir, prepared.archive)
            .await?;
        Ok(())
    }

    fn resolve(&self, source: &Path) -> PathBuf {
        if source.is_absolute() {
            source.to_path_buf()
        } else {
            self.resources_dir.join(source)
        }
    }
}
