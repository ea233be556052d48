//! Datadog Agent manager.
//!
//! Runs the Datadog Agent as a sidecar container next to the host it
//! monitors. The add-on options select which agent features are enabled;
//! each feature contributes environment variables, bind mounts and
//! configuration files to the container through two hooks, one before the
//! container is created and one before it is started.
//!
//! ```text
//! options.json ──▶ Options ──▶ RunnerBuilder ──▶ Runner ──▶ DaemonClient ──▶ Docker
//!                                   ▲
//!                                   │
//!                      Feature (Core, Logging, ProcessCollection,
//!                               SystemProbe, Apm)
//! ```

pub mod cli;
pub mod container;
pub mod daemon;
pub mod error;
pub mod feature;
pub mod options;
pub mod runner;
pub mod testing;
