//! Test doubles for exercising the runner without a Docker daemon.
//!
//! Provides [`FakeDaemon`], a [`DaemonClient`] that records every call and
//! can be told to fail specific operations.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use datadog_agent_manager::options::Options;
//! use datadog_agent_manager::runner::RunnerBuilder;
//! use datadog_agent_manager::testing::{DaemonOp, FakeDaemon};
//!
//! # async fn example() {
//! let daemon = Arc::new(FakeDaemon::new().with_stale(["old"]).failing(DaemonOp::Stop));
//! let runner = RunnerBuilder::new(Options::default(), daemon.clone()).build();
//! let _ = runner.run().await;
//! println!("{:?}", daemon.calls());
//! # }
//! ```

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::Notify;

use crate::container::{ContainerHandle, ContainerSpec};
use crate::daemon::{DaemonClient, OutputStream, PullProgress};
use crate::error::DaemonError;

/// Daemon operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaemonOp {
    List,
    Remove,
    Pull,
    Create,
    Start,
    Stop,
    Attach,
    Wait,
    Upload,
}

/// A recorded call to the fake daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCall {
    List { label: String },
    Remove { id: String },
    Pull { image: String },
    Create(Box<ContainerSpec>),
    Start { id: String },
    Stop { id: String, grace: Duration },
    Attach { id: String },
    Wait { id: String },
    Upload {
        id: String,
        dest_dir: String,
        /// Top-level entry names in the uploaded archive.
        entries: Vec<String>,
    },
}

/// A recording, in-memory [`DaemonClient`].
pub struct FakeDaemon {
    calls: Mutex<Vec<DaemonCall>>,
    stale: Mutex<Vec<String>>,
    failing: HashSet<DaemonOp>,
    pull_progress: Vec<PullProgress>,
    output: Vec<Bytes>,
    exit_code: i64,
    block_until_stopped: bool,
    stopped: Notify,
    created: Mutex<u32>,
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            stale: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            pull_progress: Vec::new(),
            output: Vec::new(),
            exit_code: 0,
            block_until_stopped: false,
            stopped: Notify::new(),
            created: Mutex::new(0),
        }
    }

    /// Pre-existing managed containers returned by the label listing.
    pub fn with_stale<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *lock(&self.stale) = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Make an operation fail.
    pub fn failing(mut self, op: DaemonOp) -> Self {
        self.failing.insert(op);
        self
    }

    /// Progress messages reported while pulling.
    pub fn with_pull_progress(mut self, progress: Vec<PullProgress>) -> Self {
        self.pull_progress = progress;
        self
    }

    /// Chunks produced by the attached output stream.
    pub fn with_output<I, B>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.output = chunks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    /// Keep the container "running" until it is stopped or removed.
    pub fn blocking_until_stopped(mut self) -> Self {
        self.block_until_stopped = true;
        self
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<DaemonCall> {
        lock(&self.calls).clone()
    }

    /// Specs passed to `create_container`, in order.
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DaemonCall::Create(spec) => Some(*spec),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DaemonCall) {
        lock(&self.calls).push(call);
    }

    fn check(&self, op: DaemonOp) -> Result<(), DaemonError> {
        if self.failing.contains(&op) {
            Err(DaemonError::Request {
                operation: "fake",
                reason: format!("{op:?} failed"),
            })
        } else {
            Ok(())
        }
    }
}

impl Default for FakeDaemon {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn archive_entries(archive: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut archive = tar::Archive::new(archive);
    if let Ok(entries) = archive.entries() {
        for entry in entries.flatten() {
            if let Ok(path) = entry.path() {
                let path = path.to_string_lossy();
                let top = path.trim_end_matches('/').split('/').next().unwrap_or_default();
                if !names.iter().any(|n| n == top) {
                    names.push(top.to_string());
                }
            }
        }
    }
    names
}

#[async_trait]
impl DaemonClient for FakeDaemon {
    async fn ping(&self) -> Result<(), DaemonError> {
        Ok(())
    }

    async fn list_containers_with_label(&self, label: &str) -> Result<Vec<String>, DaemonError> {
        self.record(DaemonCall::List {
            label: label.to_string(),
        });
        self.check(DaemonOp::List)?;
        Ok(lock(&self.stale).clone())
    }

    async fn remove_container(&self, id: &str) -> Result<(), DaemonError> {
        self.record(DaemonCall::Remove { id: id.to_string() });
        self.check(DaemonOp::Remove)?;
        lock(&self.stale).retain(|s| s != id);
        self.stopped.notify_one();
        Ok(())
    }

    async fn pull_image(
        &self,
        image: &str,
        on_progress: &mut (dyn FnMut(PullProgress) + Send),
    ) -> Result<(), DaemonError> {
        self.record(DaemonCall::Pull {
            image: image.to_string(),
        });
        self.check(DaemonOp::Pull)?;
        for progress in &self.pull_progress {
            on_progress(progress.clone());
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, DaemonError> {
        self.record(DaemonCall::Create(Box::new(spec.clone())));
        self.check(DaemonOp::Create)?;
        let mut created = lock(&self.created);
        *created += 1;
        Ok(ContainerHandle::new(format!("container-{}", *created)))
    }

    async fn start_container(&self, container: &ContainerHandle) -> Result<(), DaemonError> {
        self.record(DaemonCall::Start {
            id: container.id().to_string(),
        });
        self.check(DaemonOp::Start)
    }

    async fn stop_container(
        &self,
        container: &ContainerHandle,
        grace: Duration,
    ) -> Result<(), DaemonError> {
        self.record(DaemonCall::Stop {
            id: container.id().to_string(),
            grace,
        });
        self.check(DaemonOp::Stop)?;
        self.stopped.notify_one();
        Ok(())
    }

    async fn attach_output(&self, container: &ContainerHandle) -> Result<OutputStream, DaemonError> {
        self.record(DaemonCall::Attach {
            id: container.id().to_string(),
        });
        self.check(DaemonOp::Attach)?;
        let chunks: Vec<Result<Bytes, DaemonError>> =
            self.output.iter().cloned().map(Ok).collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn wait_until_stopped(&self, container: &ContainerHandle) -> Result<i64, DaemonError> {
        self.record(DaemonCall::Wait {
            id: container.id().to_string(),
        });
        self.check(DaemonOp::Wait)?;
        if self.block_until_stopped {
            self.stopped.notified().await;
        }
        Ok(self.exit_code)
    }

    async fn upload_archive(
        &self,
        container: &ContainerHandle,
        dest_dir: &str,
        archive: Bytes,
    ) -> Result<(), DaemonError> {
        self.record(DaemonCall::Upload {
            id: container.id().to_string(),
            dest_dir: dest_dir.to_string(),
            entries: archive_entries(&archive),
        });
        self.check(DaemonOp::Upload)
    }
}
