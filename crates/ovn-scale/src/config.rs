//! Configuration for the workload runner.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use ovn_scale_exec::{Connector, LocalConnector, SshConnector};
use std::path::PathBuf;
use uuid::Uuid;

/// How remote endpoints are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// The system `ssh` client (default)
    #[default]
    Ssh,
    /// `sh -c` on this host, for single-node sandbox deployments
    Local,
}

impl Transport {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "local" | "localhost" | "sh" => Self::Local,
            _ => Self::Ssh,
        }
    }

    /// Connector opening channels over this transport.
    pub fn connector(&self) -> Box<dyn Connector> {
        match self {
            Self::Ssh => Box::new(SshConnector),
            Self::Local => Box::new(LocalConnector),
        }
    }
}

/// Configuration for one workload run.
#[derive(Debug, Clone)]
pub struct ScaleConfig {
    /// Deployment description (controller, farms, sandboxes).
    pub deployment_path: PathBuf,

    /// Task description (workload arguments).
    pub task_path: PathBuf,

    /// Routed-network iterations to run (default: 1).
    pub iterations: u32,

    /// Transport to the deployment (default: ssh).
    pub transport: Transport,

    /// Task id seeding MAC prefixes; random when unset.
    pub task_id: Option<Uuid>,
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("deployment file not found: {0}")]
    MissingDeployment(PathBuf),

    #[error("task file not found: {0}")]
    MissingTask(PathBuf),

    #[error("iterations must be >= 1")]
    NoIterations,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            deployment_path: PathBuf::from("/etc/ovn-scale/deployment.json"),
            task_path: PathBuf::from("/etc/ovn-scale/task.json"),
            iterations: 1,
            transport: Transport::Ssh,
            task_id: None,
        }
    }
}

impl ScaleConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OVN_SCALE_DEPLOYMENT` | `/etc/ovn-scale/deployment.json` |
    /// | `OVN_SCALE_TASK` | `/etc/ovn-scale/task.json` |
    /// | `OVN_SCALE_ITERATIONS` | `1` |
    /// | `OVN_SCALE_TRANSPORT` | `ssh` (ssh, local) |
    /// | `OVN_SCALE_TASK_ID` | random |
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            deployment_path: std::env::var("OVN_SCALE_DEPLOYMENT")
                .map(PathBuf::from)
                .unwrap_or(default.deployment_path),
            task_path: std::env::var("OVN_SCALE_TASK")
                .map(PathBuf::from)
                .unwrap_or(default.task_path),
            iterations: std::env::var("OVN_SCALE_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.iterations),
            transport: std::env::var("OVN_SCALE_TRANSPORT")
                .map(|v| Transport::parse(&v))
                .unwrap_or(default.transport),
            task_id: std::env::var("OVN_SCALE_TASK_ID")
                .ok()
                .and_then(|v| Uuid::parse_str(&v).ok()),
        }
    }

    /// Check that both input files exist and at least one iteration runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.deployment_path.exists() {
            return Err(ConfigError::MissingDeployment(self.deployment_path.clone()));
        }

        if !self.task_path.exists() {
            return Err(ConfigError::MissingTask(self.task_path.clone()));
        }

        if self.iterations == 0 {
            return Err(ConfigError::NoIterations);
        }

        Ok(())
    }

    /// Validate configuration but only log warnings instead of failing.
    pub fn validate_warn(&self) {
        if let Err(e) = self.validate() {
            tracing::warn!(error = %e, "configuration problem");
        }
    }
}
