//! Install methods, client kinds and command targets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Container that runs the OVN databases in containerized deployments.
pub const CENTRAL_CONTAINER: &str = "ovn-database";

/// How the control tools are reached on a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InstallMethod {
    /// Source `<sandbox>/sandbox.rc` and run the tool directly.
    #[default]
    #[serde(rename = "sandbox", alias = "direct")]
    Direct,
    /// Run the tool through `docker exec` in the sandbox's container.
    #[serde(rename = "docker", alias = "containerized")]
    Container,
    /// Talk to a long-lived control daemon through its unix socket.
    #[serde(rename = "daemon")]
    Daemon,
}

impl InstallMethod {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sandbox" | "direct" => Some(Self::Direct),
            "docker" | "container" | "containerized" => Some(Self::Container),
            "daemon" => Some(Self::Daemon),
            _ => None,
        }
    }
}

impl fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "sandbox"),
            Self::Container => write!(f, "docker"),
            Self::Daemon => write!(f, "daemon"),
        }
    }
}

/// The closed set of clients a scenario can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKind {
    /// Plain shell commands.
    Ssh,
    /// `ovn-nbctl`, northbound database.
    NbCtl,
    /// `ovn-sbctl`, southbound database.
    SbCtl,
    /// `ovs-vsctl` on a chassis.
    VsCtl,
    /// `ovs-ofctl` on a chassis.
    OfCtl,
}

impl ClientKind {
    /// Control binary, or `None` for raw shell commands.
    pub fn binary(&self) -> Option<&'static str> {
        match self {
            Self::Ssh => None,
            Self::NbCtl => Some("ovn-nbctl"),
            Self::SbCtl => Some("ovn-sbctl"),
            Self::VsCtl => Some("ovs-vsctl"),
            Self::OfCtl => Some("ovs-ofctl"),
        }
    }

    /// Environment variable naming the daemon control socket, for tools that
    /// support a persistent daemon.
    pub fn daemon_env(&self) -> Option<&'static str> {
        match self {
            Self::NbCtl => Some("OVN_NB_DAEMON"),
            Self::SbCtl => Some("OVN_SB_DAEMON"),
            _ => None,
        }
    }

    /// Whether buffered commands can be chained into one tool invocation
    /// with `--`. `ovs-ofctl` and raw shell are joined line by line instead.
    pub fn chains_commands(&self) -> bool {
        matches!(self, Self::NbCtl | Self::SbCtl | Self::VsCtl)
    }

    fn default_container<'a>(&self, sandbox: &'a str) -> &'a str {
        match self {
            Self::NbCtl | Self::SbCtl => CENTRAL_CONTAINER,
            _ => sandbox,
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary().unwrap_or("ovs-ssh"))
    }
}

/// Where a client's commands are addressed on its endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Target {
    /// Sandbox name; also the `sandbox.rc` directory for direct installs.
    pub sandbox: String,
    /// Addressing strategy.
    pub install_method: InstallMethod,
    /// Container hosting the sandbox, for containerized installs.
    pub host_container: Option<String>,
    /// Control socket of a persistent daemon.
    pub daemon_socket: Option<String>,
}

impl Target {
    /// Create a target for `sandbox` using `install_method`.
    pub fn new(sandbox: impl Into<String>, install_method: InstallMethod) -> Self {
        Self {
            sandbox: sandbox.into(),
            install_method,
            host_container: None,
            daemon_socket: None,
        }
    }

    /// Set the host container.
    pub fn host_container(mut self, container: Option<impl Into<String>>) -> Self {
        self.host_container = container.map(Into::into);
        self
    }

    /// Set the daemon control socket.
    pub fn daemon_socket(mut self, socket: Option<impl Into<String>>) -> Self {
        self.daemon_socket = socket.map(Into::into);
        self
    }

    /// Container that commands of `kind` run in.
    pub fn container_for(&self, kind: ClientKind) -> &str {
        self.host_container
            .as_deref()
            .unwrap_or_else(|| kind.default_container(&self.sandbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_method_parsing() {
        assert_eq!(InstallMethod::parse("sandbox"), Some(InstallMethod::Direct));
        assert_eq!(InstallMethod::parse("DOCKER"), Some(InstallMethod::Container));
        assert_eq!(InstallMethod::parse("daemon"), Some(InstallMethod::Daemon));
        assert_eq!(InstallMethod::parse("ansible"), None);
    }

    #[test]
    fn test_install_method_serde_names() {
        let m: InstallMethod = serde_json::from_str("\"docker\"").unwrap();
        assert_eq!(m, InstallMethod::Container);
        let m: InstallMethod = serde_json::from_str("\"direct\"").unwrap();
        assert_eq!(m, InstallMethod::Direct);
        assert_eq!(serde_json::to_string(&InstallMethod::Direct).unwrap(), "\"sandbox\"");
    }

    #[test]
    fn test_container_selection() {
        let target = Target::new("sandbox-3", InstallMethod::Container);
        assert_eq!(target.container_for(ClientKind::NbCtl), CENTRAL_CONTAINER);
        assert_eq!(target.container_for(ClientKind::VsCtl), "sandbox-3");

        let target = target.host_container(Some("ovn-chassis-3"));
        assert_eq!(target.container_for(ClientKind::NbCtl), "ovn-chassis-3");
        assert_eq!(target.container_for(ClientKind::Ssh), "ovn-chassis-3");
    }
}
