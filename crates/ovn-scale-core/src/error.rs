//! Error types for ovn-scale-core.

use ovn_scale_exec::ExecError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for ovn-scale-core operations.
pub type Result<T> = std::result::Result<T, ScaleError>;

/// Errors that can occur while building or driving a topology.
#[derive(Debug, Error)]
pub enum ScaleError {
    /// Malformed or out-of-range arguments, detected before any remote call.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A remote invocation failed.
    #[error(transparent)]
    Exec(ExecError),

    /// A referenced sandbox, farm or credential does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up
        kind: &'static str,
        /// Name that was not found
        name: String,
    },

    /// A convergence wait did not complete in time.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout {
        /// The port or chassis that did not converge
        what: String,
        /// How long the wait ran
        waited: Duration,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScaleError {
    /// Shorthand for [`ScaleError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<ExecError> for ScaleError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::UnknownFarm(name) => Self::NotFound { kind: "farm", name },
            other => Self::Exec(other),
        }
    }
}
