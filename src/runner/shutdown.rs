//! Race between a termination signal and the runner finishing on its own.
//!
//! Both sides report into a single-slot channel. Whichever arrives first
//! triggers the shutdown sequence; the other is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::runner::Runner;

/// Why the manager is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or SIGTERM received.
    Signal,
    /// `Runner::run` returned, successfully or not.
    RunnerExited,
}

/// Sending half of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: mpsc::Sender<ShutdownReason>,
}

impl ShutdownTrigger {
    /// Request shutdown. Returns `false` if a request was already made.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        self.tx.try_send(reason).is_ok()
    }
}

/// Receiving half of the shutdown channel.
#[derive(Debug)]
pub struct ShutdownListener {
    rx: mpsc::Receiver<ShutdownReason>,
}

impl ShutdownListener {
    /// Wait for the first shutdown request.
    ///
    /// Returns `None` if every trigger was dropped without requesting.
    pub async fn wait(&mut self) -> Option<ShutdownReason> {
        self.rx.recv().await
    }
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownListener) {
    let (tx, rx) = mpsc::channel(1);
    (ShutdownTrigger { tx }, ShutdownListener { rx })
}

/// Resolves on SIGINT or SIGTERM.
///
/// If a handler cannot be installed the failure is logged and that signal is
/// never reported.
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Run the agent until it exits or `signal` resolves, then stop and remove
/// its container within `timeout`.
///
/// A failed run is logged and still leads to a normal shutdown. Only a
/// failed or timed out shutdown is returned as an error.
pub async fn run_until_shutdown<S>(
    runner: Arc<Runner>,
    signal: S,
    timeout: Duration,
) -> Result<ShutdownReason>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (trigger, mut listener) = shutdown_channel();

    let signal_trigger = trigger.clone();
    let signal_task = tokio::spawn(async move {
        signal.await;
        tracing::info!("received termination signal");
        signal_trigger.request(ShutdownReason::Signal);
    });

    let run_runner = Arc::clone(&runner);
    let run_task = tokio::spawn(async move {
        if let Err(e) = run_runner.run().await {
            tracing::error!(error = %e, "datadog agent run failed");
        }
        trigger.request(ShutdownReason::RunnerExited);
    });

    let reason = listener.wait().await.unwrap_or(ShutdownReason::RunnerExited);
    tracing::info!(reason = ?reason, "shutting down");

    signal_task.abort();
    let result = runner.shutdown(timeout).await;
    run_task.abort();

    result.map(|()| reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerHandle;
    use crate::error::RunnerError;
    use crate::options::{FeatureToggles, Options};
    use crate::runner::{RunnerBuilder, RunnerState};
    use crate::testing::{DaemonCall, DaemonOp, FakeDaemon};

    fn resources() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("conf.d/system_core.d");
        std::fs::create_dir_all(&conf).unwrap();
        std::fs::write(conf.join("conf.yaml"), "instances: []\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_first_request_wins() {
        let (trigger, mut listener) = shutdown_channel();

        assert!(trigger.request(ShutdownReason::RunnerExited));
        assert!(!trigger.clone().request(ShutdownReason::Signal));

        assert_eq!(listener.wait().await, Some(ShutdownReason::RunnerExited));
    }

    #[tokio::test]
    async fn test_listener_sees_dropped_triggers() {
        let (trigger, mut listener) = shutdown_channel();
        drop(trigger);
        assert_eq!(listener.wait().await, None);
    }

    #[tokio::test]
    async fn test_signal_interrupts_running_agent() {
        let daemon = Arc::new(FakeDaemon::new().blocking_until_stopped());
        let resources = resources();
        let runner = Arc::new(
            RunnerBuilder::new(Options::new("k", "s", FeatureToggles::default()), daemon.clone())
                .resources_dir(resources.path())
                .build(),
        );

        let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(run_until_shutdown(
            Arc::clone(&runner),
            async move {
                let _ = signal_rx.await;
            },
            Duration::from_secs(5),
        ));

        // wait for the agent to be running before signalling
        while !daemon
            .calls()
            .iter()
            .any(|c| matches!(c, DaemonCall::Wait { .. }))
        {
            tokio::task::yield_now().await;
        }
        signal_tx.send(()).unwrap();

        let reason = handle.await.unwrap().unwrap();

        assert_eq!(reason, ShutdownReason::Signal);
        assert!(daemon.calls().contains(&DaemonCall::Remove {
            id: "container-1".to_string()
        }));
        assert_eq!(runner.state().await, RunnerState::Removed);
        assert_eq!(runner.container().await, None);
    }

    #[tokio::test]
    async fn test_runner_exit_triggers_shutdown() {
        let daemon = Arc::new(FakeDaemon::new());
        let resources = resources();
        let runner = Arc::new(
            RunnerBuilder::new(Options::new("k", "s", FeatureToggles::default()), daemon.clone())
                .resources_dir(resources.path())
                .build(),
        );

        let reason = run_until_shutdown(runner, std::future::pending(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(reason, ShutdownReason::RunnerExited);
        let calls = daemon.calls();
        assert_eq!(
            calls.last(),
            Some(&DaemonCall::Remove {
                id: "container-1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_failed_run_still_shuts_down_cleanly() {
        let daemon = Arc::new(FakeDaemon::new().failing(DaemonOp::Pull));
        let runner = Arc::new(RunnerBuilder::new(Options::default(), daemon.clone()).build());

        let reason = run_until_shutdown(runner, std::future::pending(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(reason, ShutdownReason::RunnerExited);
        // nothing was created, so nothing to stop
        assert!(!daemon.calls().iter().any(|c| matches!(c, DaemonCall::Stop { .. })));
    }

    #[tokio::test]
    async fn test_remove_failure_surfaces_from_shutdown() {
        let daemon = Arc::new(FakeDaemon::new().failing(DaemonOp::Remove));
        let resources = resources();
        let runner = Arc::new(
            RunnerBuilder::new(Options::new("k", "s", FeatureToggles::default()), daemon)
                .resources_dir(resources.path())
                .build(),
        );

        let err = run_until_shutdown(Arc::clone(&runner), std::future::pending(), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::Remove { .. }));
        assert_eq!(runner.container().await, Some(ContainerHandle::new("container-1")));
    }
}
