//! Lifecycle of the managed Datadog Agent container.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                               Runner                                      │
//! │                                                                           │
//! │   run()                                                                   │
//! │     │                                                                     │
//! │     ▼                                                                     │
//! │   ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────┐  │
//! │   │ Remove Stale │────▶│ Pull Image   │────▶│ Create                   │  │
//! │   │ (by label)   │     │              │     │ (BeforeCreate hooks)     │  │
//! │   └──────────────┘     └──────────────┘     └──────────────────────────┘  │
//! │                                                        │                  │
//! │                                                        ▼                  │
//! │   ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────┐  │
//! │   │ Wait Until   │◀────│ Attach &     │◀────│ Start                    │  │
//! │   │ Stopped      │     │ Relay Output │     │ (BeforeStart hooks)      │  │
//! │   └──────────────┘     └──────────────┘     └──────────────────────────┘  │
//! │                                                                           │
//! │   stop():  Stop (grace period, failure logged) ──▶ Force Remove           │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Hooks run sequentially in the order the features were registered. The
//! first hook error aborts its phase and the rest of the run. Nothing is
//! rolled back: a container left behind by a failed start is removed by the
//! stale-container pass of the next run.

pub mod archive;
pub mod context;
pub mod shutdown;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;

use crate::container::{ContainerHandle, ContainerSpec, managed_label_filter};
use crate::daemon::{DaemonClient, OutputStream, PullProgress};
use crate::error::{Result, RunnerError};
use crate::feature::Feature;
use crate::options::Options;
use crate::runner::context::{CreateContext, StartContext};

pub use shutdown::{ShutdownReason, run_until_shutdown, termination_signal};

/// Grace period given to the agent before it is killed on stop.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(15);
/// Hard limit on the whole stop-and-remove sequence.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// State of the managed container's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Not started yet.
    Idle,
    /// Removing containers left over from a previous run.
    RemovingStale,
    /// Pulling the agent image.
    Pulling,
    /// Running BeforeCreate hooks and creating the container.
    Creating,
    /// Running BeforeStart hooks and starting the container.
    Starting,
    /// Container running, output attached.
    Running,
    /// Stopping and removing the container.
    Stopping,
    /// Container removed.
    Removed,
    /// A lifecycle phase failed.
    Failed,
}

/// Drives the agent container through its lifecycle.
pub struct Runner {
    options: Arc<Options>,
    features: Vec<Feature>,
    daemon: Arc<dyn DaemonClient>,
    resources_dir: PathBuf,
    stop_grace: Duration,
    state: RwLock<RunnerState>,
    container: RwLock<Option<ContainerHandle>>,
}

impl Runner {
    /// Get the current state.
    pub async fn state(&self) -> RunnerState {
        *self.state.read().await
    }

    /// The container created by this run, if any.
    pub async fn container(&self) -> Option<ContainerHandle> {
        self.container.read().await.clone()
    }

    /// Active features in application order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    async fn set_state(&self, state: RunnerState) {
        let mut current = self.state.write().await;
        tracing::debug!(from = ?*current, to = ?state, "runner state change");
        *current = state;
    }

    /// Start the agent and block until its container stops.
    pub async fn run(&self) -> Result<()> {
        tracing::info!("starting datadog agent");

        let result = self.run_phases().await;
        if result.is_err() {
            self.set_state(RunnerState::Failed).await;
        }
        result
    }

    async fn run_phases(&self) -> Result<()> {
        self.remove_existing_containers().await?;
        self.pull_image().await?;
        let container = self.create_container().await?;
        self.start_container(&container).await?;

        self.set_state(RunnerState::Running).await;
        let output = self
            .daemon
            .attach_output(&container)
            .await
            .map_err(RunnerError::Attach)?;
        relay_output(output, &mut tokio::io::stdout()).await;

        match self.daemon.wait_until_stopped(&container).await {
            Ok(exit_code) => {
                tracing::info!(container = %container, exit_code, "detected container has stopped");
            }
            Err(e) => {
                tracing::error!(container = %container, error = %e, "error waiting for container to stop");
            }
        }

        Ok(())
    }

    async fn remove_existing_containers(&self) -> Result<()> {
        self.set_state(RunnerState::RemovingStale).await;

        let existing = self
            .daemon
            .list_containers_with_label(&managed_label_filter())
            .await
            .map_err(RunnerError::ListStale)?;

        for id in existing {
            tracing::warn!(id = %id, "removing existing datadog agent container");
            self.daemon
                .remove_container(&id)
                .await
                .map_err(|source| RunnerError::RemoveStale {
                    id: id.clone(),
                    source,
                })?;
        }

        Ok(())
    }

    async fn pull_image(&self) -> Result<()> {
        self.set_state(RunnerState::Pulling).await;

        let image = self.options.image_ref();
        tracing::info!(image = %image, "pulling image");

        // Progress lines are small; they are written synchronously from the
        // pull callback.
        let mut stdout = std::io::stdout();
        let mut on_progress = |progress: PullProgress| {
            if let Err(e) = write_progress(&mut stdout, &progress) {
                tracing::error!(error = %e, "failed to copy image pull to stdout");
            }
        };

        self.daemon
            .pull_image(&image, &mut on_progress)
            .await
            .map_err(|source| RunnerError::Pull { image, source })
    }

    /// Fold every feature's BeforeCreate hook over a fresh base definition.
    pub fn build_container_spec(&self) -> Result<ContainerSpec> {
        let mut spec = ContainerSpec::base(&self.options.container_name, self.options.image_ref());
        self.apply_create_hooks(&mut spec)?;
        Ok(spec)
    }

    /// Run BeforeCreate hooks in order, stopping at the first failure.
    ///
    /// On error `spec` keeps whatever the hooks before the failing one added.
    fn apply_create_hooks(&self, spec: &mut ContainerSpec) -> Result<()> {
        let mut ctx = CreateContext::new(&self.options, spec);

        for feature in &self.features {
            tracing::debug!(feature = %feature, "applying BeforeCreate hook");
            feature
                .before_create(&mut ctx)
                .map_err(|source| RunnerError::CreateHook {
                    feature: feature.name(),
                    source,
                })?;
        }

        Ok(())
    }

    async fn create_container(&self) -> Result<ContainerHandle> {
        self.set_state(RunnerState::Creating).await;

        let spec = self.build_container_spec()?;

        tracing::info!(name = %spec.name, "creating datadog agent container");
        let container = self
            .daemon
            .create_container(&spec)
            .await
            .map_err(RunnerError::Create)?;

        *self.container.write().await = Some(container.clone());
        Ok(container)
    }

    async fn start_container(&self, container: &ContainerHandle) -> Result<()> {
        self.set_state(RunnerState::Starting).await;

        let ctx = StartContext::new(
            &self.options,
            self.daemon.as_ref(),
            container,
            &self.resources_dir,
        );
        for feature in &self.features {
            tracing::debug!(feature = %feature, "applying BeforeStart hook");
            feature
                .before_start(&ctx)
                .await
                .map_err(|source| RunnerError::StartHook {
                    feature: feature.name(),
                    source,
                })?;
        }

        tracing::info!(container = %container, "starting datadog agent container");
        self.daemon
            .start_container(container)
            .await
            .map_err(RunnerError::Start)
    }

    /// Stop and remove the agent container.
    ///
    /// A failed stop is logged and removal is still attempted; a failed
    /// removal is returned.
    pub async fn stop(&self) -> Result<()> {
        let Some(container) = self.container().await else {
            tracing::info!("no datadog agent container to stop");
            return Ok(());
        };

        self.set_state(RunnerState::Stopping).await;

        tracing::info!(container = %container, "stopping datadog agent container");
        if let Err(e) = self.daemon.stop_container(&container, self.stop_grace).await {
            tracing::warn!(container = %container, error = %e, "failed to stop agent container");
        }

        tracing::info!(container = %container, "removing datadog agent container");
        self.daemon
            .remove_container(container.id())
            .await
            .map_err(|source| RunnerError::Remove {
                id: container.id().to_string(),
                source,
            })?;

        *self.container.write().await = None;
        self.set_state(RunnerState::Removed).await;
        Ok(())
    }

    /// [`stop`](Self::stop) bounded by a hard timeout.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.stop())
            .await
            .map_err(|_| RunnerError::ShutdownTimeout(timeout))?
    }
}

/// Write one pull progress message as a JSON line.
fn write_progress(out: &mut impl Write, progress: &PullProgress) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, progress)?;
    out.write_all(b"\n")
}

/// Copy container output to `out` until the stream ends.
///
/// Errors are logged and end the relay; they never fail the run.
pub async fn relay_output<W: AsyncWrite + Unpin>(mut output: OutputStream, out: &mut W) {
    while let Some(chunk) = output.next().await {
        let result = match chunk {
            Ok(bytes) => out.write_all(&bytes).await,
            Err(e) => {
                tracing::error!(error = %e, "error reading container output");
                break;
            }
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "error copying container output to stdout");
            break;
        }
    }

    if let Err(e) = out.flush().await {
        tracing::error!(error = %e, "error flushing container output");
    }
}

/// Builder for creating a runner.
pub struct RunnerBuilder {
    options: Arc<Options>,
    daemon: Arc<dyn DaemonClient>,
    features: Vec<Feature>,
    resources_dir: PathBuf,
    stop_grace: Duration,
}

impl RunnerBuilder {
    /// Create a new builder with no optional features.
    pub fn new(options: impl Into<Arc<Options>>, daemon: Arc<dyn DaemonClient>) -> Self {
        Self {
            options: options.into(),
            daemon,
            features: Vec::new(),
            resources_dir: PathBuf::from("resources"),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Add a feature. Adding the same feature twice has no effect.
    pub fn feature(mut self, feature: Feature) -> Self {
        if !self.features.contains(&feature) {
            self.features.push(feature);
        }
        self
    }

    /// Add several features in order.
    pub fn features(self, features: impl IntoIterator<Item = Feature>) -> Self {
        features.into_iter().fold(self, Self::feature)
    }

    /// Add every feature in the default order.
    pub fn default_features(self) -> Self {
        self.features(Feature::ALL)
    }

    /// Directory holding the configuration files copied into the container.
    pub fn resources_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resources_dir = dir.into();
        self
    }

    /// Grace period for stopping the container.
    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Build the runner. Core is always active and runs first if it was not
    /// added explicitly.
    pub fn build(mut self) -> Runner {
        if !self.features.contains(&Feature::Core) {
            self.features.insert(0, Feature::Core);
        }

        Runner {
            options: self.options,
            features: self.features,
            daemon: self.daemon,
            resources_dir: self.resources_dir,
            stop_grace: self.stop_grace,
            state: RwLock::new(RunnerState::Idle),
            container: RwLock::new(None),
        }
    }
}
