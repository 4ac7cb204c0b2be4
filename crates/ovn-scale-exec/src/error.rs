//! Error types for ovn-scale-exec.

use thiserror::Error;

/// Result type alias for ovn-scale-exec operations.
pub type Result<T> = std::result::Result<T, ExecError>;

/// Errors that can occur while sending commands to a remote endpoint.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The remote invocation exited with a nonzero status.
    #[error("command failed on {endpoint} (exit {exit_code}): {stderr}")]
    Remote {
        /// Endpoint the command was sent to
        endpoint: String,
        /// Full script that was executed
        command: String,
        /// Exit status reported by the channel
        exit_code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// The local process carrying the invocation could not be started.
    #[error("failed to start remote invocation: {0}")]
    Spawn(#[from] std::io::Error),

    /// No credential is registered for the requested farm.
    #[error("farm not found: {0}")]
    UnknownFarm(String),

    /// Daemon-attached addressing was selected without a control socket.
    #[error("daemon install method requires a control socket")]
    MissingDaemonSocket,
}

impl ExecError {
    /// Exit code of a failed remote command, if this is one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Remote { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
