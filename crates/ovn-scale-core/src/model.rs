//! In-memory topology objects.
//!
//! These are return values of topology calls. They mirror what was created
//! remotely; deleting the remote resource does not touch them.

use ipnet::Ipv4Net;
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A node running a virtual switch, owned by exactly one farm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sandbox {
    /// Sandbox name; also its chassis name.
    pub name: String,
    /// Farm that owns this sandbox.
    pub farm: String,
    /// Free-form tag from the deployment.
    #[serde(default)]
    pub tag: Option<String>,
    /// Container hosting the sandbox, for containerized installs.
    #[serde(default)]
    pub host_container: Option<String>,
}

impl Sandbox {
    /// Create a sandbox record.
    pub fn new(name: impl Into<String>, farm: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            farm: farm.into(),
            tag: None,
            host_container: None,
        }
    }

    /// Set the host container.
    pub fn with_host_container(mut self, container: impl Into<String>) -> Self {
        self.host_container = Some(container.into());
        self
    }

    /// Chassis name the control plane knows this sandbox by.
    pub fn chassis(&self) -> &str {
        self.host_container.as_deref().unwrap_or(&self.name)
    }
}

/// A logical switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalSwitch {
    /// Switch name.
    pub name: String,
    /// Subnet, when addressing is CIDR driven.
    pub cidr: Option<Ipv4Net>,
    /// Names of ports created on this switch.
    #[serde(default)]
    pub ports: Vec<String>,
}

impl LogicalSwitch {
    /// Create a switch handle.
    pub fn new(name: impl Into<String>, cidr: Option<Ipv4Net>) -> Self {
        Self {
            name: name.into(),
            cidr,
            ports: Vec::new(),
        }
    }
}

/// A logical router.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalRouter {
    /// Router name.
    pub name: String,
}

impl LogicalRouter {
    /// Create a router handle.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A logical switch port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalPort {
    /// Port name; also the interface name once bound.
    pub name: String,
    /// Switch the port was created on.
    pub switch: String,
    /// Port MAC.
    pub mac: MacAddress,
    /// Address with the network's prefix length.
    pub ip: Option<Ipv4Net>,
    /// Default gateway on the port's network.
    pub gateway: Option<Ipv4Addr>,
    /// Upstream gateway beyond the gateway router, if one was wired.
    pub external_gateway: Option<Ipv4Addr>,
}

impl LogicalPort {
    /// Address a reachability ping from this port should target.
    pub fn ping_target(&self) -> Option<Ipv4Addr> {
        self.external_gateway.or(self.gateway)
    }
}

/// Resources created by one gateway-router wiring, plus the addresses later
/// needed to program its routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayTopologyUnit {
    /// Overlay network behind the router.
    pub network: LogicalSwitch,
    /// Distributed router the network is attached to.
    pub router: LogicalRouter,
    /// Switch joining `router` to `gateway_router`.
    pub join_switch: LogicalSwitch,
    /// Router pinned to a chassis.
    pub gateway_router: LogicalRouter,
    /// Switch on the external side of `gateway_router`.
    pub external_switch: LogicalSwitch,
    /// Gateway router's external address; SNAT source.
    pub gateway_ip: Ipv4Addr,
    /// Upstream next hop on the external network.
    pub default_gateway_ip: Ipv4Addr,
    /// `router`'s address on the join switch.
    pub router_port_gateway_ip: Ipv4Addr,
    /// `gateway_router`'s address on the join switch.
    pub join_ip: Ipv4Addr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chassis_prefers_host_container() {
        let sb = Sandbox::new("sandbox-1", "farm-0");
        assert_eq!(sb.chassis(), "sandbox-1");
        let sb = sb.with_host_container("ovn-chassis-1");
        assert_eq!(sb.chassis(), "ovn-chassis-1");
    }

    #[test]
    fn test_ping_target_prefers_external_gateway() {
        let mut port = LogicalPort {
            name: "lp_10.0.0.1".into(),
            switch: "lswitch_10.0.0.0/24".into(),
            mac: MacAddress::new([0x0a, 0, 0, 0, 0, 1]),
            ip: Some("10.0.0.1/24".parse().unwrap()),
            gateway: Some(Ipv4Addr::new(10, 0, 0, 254)),
            external_gateway: None,
        };
        assert_eq!(port.ping_target(), Some(Ipv4Addr::new(10, 0, 0, 254)));
        port.external_gateway = Some(Ipv4Addr::new(172, 16, 0, 253));
        assert_eq!(port.ping_target(), Some(Ipv4Addr::new(172, 16, 0, 253)));
    }

    #[test]
    fn test_sandbox_deserializes_without_optionals() {
        let sb: Sandbox = serde_json::from_str(r#"{"name":"sb-0","farm":"farm-0"}"#).unwrap();
        assert_eq!(sb, Sandbox::new("sb-0", "farm-0"));
    }
}
