//! Endpoint credentials.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

fn default_port() -> u16 {
    22
}

/// Identifies one remote endpoint (a controller node or a farm host).
///
/// Credentials are resolved once per scenario and never mutated afterwards;
/// the client multiplexer uses them as cache keys.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    /// Host name or address.
    pub host: String,
    /// Login user.
    pub user: String,
    /// SSH port (default: 22).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Private key file.
    #[serde(default)]
    pub key: Option<PathBuf>,
    /// Password, used only when no key is configured.
    #[serde(default)]
    pub password: Option<String>,
}

impl Credential {
    /// Create a key-less credential for `user@host:22`.
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: default_port(),
            key: None,
            password: None,
        }
    }

    /// Set the SSH port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the private key file.
    pub fn with_key(mut self, key: impl Into<PathBuf>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Printable endpoint name, `user@host:port`.
    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

// Keep passwords out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("port", &self.port)
            .field("key", &self.key)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}
