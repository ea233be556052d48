//! Static definition of the managed agent container.

use std::collections::BTreeMap;
use std::fmt;

/// Label key marking containers owned by this manager.
pub const MANAGED_BY_LABEL_KEY: &str = "managed-by";
/// Label value marking containers owned by this manager.
pub const MANAGED_BY_LABEL_VALUE: &str = "datadog-agent-manager";

/// Label filter selecting managed containers, in daemon filter syntax.
pub fn managed_label_filter() -> String {
    format!("{}={}", MANAGED_BY_LABEL_KEY, MANAGED_BY_LABEL_VALUE)
}

/// Access mode of a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single environment assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// A host path bound into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: String,
    pub destination: String,
    pub mode: AccessMode,
}

impl fmt::Display for BindMount {
    /// Docker `binds` syntax: `source:destination:mode`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.destination, self.mode)
    }
}

/// Everything the daemon needs to create the agent container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub labels: BTreeMap<String, String>,
    pub env: Vec<EnvVar>,
    pub mounts: Vec<BindMount>,
    /// Share the host PID namespace.
    pub host_pid: bool,
    /// Use the host cgroup namespace.
    pub host_cgroupns: bool,
}

impl ContainerSpec {
    /// Base definition before any feature hooks run.
    pub fn base(name: impl Into<String>, image: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(
            MANAGED_BY_LABEL_KEY.to_string(),
            MANAGED_BY_LABEL_VALUE.to_string(),
        );

        Self {
            name: name.into(),
            image: image.into(),
            labels,
            env: Vec::new(),
            mounts: Vec::new(),
            host_pid: true,
            host_cgroupns: true,
        }
    }

    /// Look up an environment value by key.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Environment in `KEY=value` form.
    pub fn env_strings(&self) -> Vec<String> {
        self.env.iter().map(ToString::to_string).collect()
    }

    /// Mounts in `source:destination:mode` form.
    pub fn bind_strings(&self) -> Vec<String> {
        self.mounts.iter().map(ToString::to_string).collect()
    }
}

/// Opaque identifier of a created container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
