//! Workload arguments.
//!
//! Every struct deserializes from the task file with per-field defaults and
//! exposes `validate()`, which reports configuration errors before any remote
//! call is made.

use crate::binding::WaitPolicy;
use crate::error::{Result, ScaleError};
use ipnet::Ipv4Net;
use ovn_scale_exec::commands::nbctl::SslFiles;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn check_batch(what: &str, batch: Option<u32>) -> Result<()> {
    if batch == Some(0) {
        return Err(ScaleError::config(format!("{what}.batch must be >= 1")));
    }
    Ok(())
}

/// Logical switch creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchCreateArgs {
    /// Number of switches.
    pub amount: u32,
    /// Switches per invocation (default: all of them).
    pub batch: Option<u32>,
    /// First subnet; switch `i` gets the `i`-th successive subnet.
    pub start_cidr: Option<Ipv4Net>,
    /// Attach a `localnet` port for this physical network to every switch.
    pub physical_network: Option<String>,
}

impl Default for SwitchCreateArgs {
    fn default() -> Self {
        Self {
            amount: 1,
            batch: None,
            start_cidr: None,
            physical_network: None,
        }
    }
}

impl SwitchCreateArgs {
    /// Effective batch size.
    pub fn batch_size(&self) -> u32 {
        self.batch.unwrap_or(self.amount).max(1)
    }

    /// Validate the arguments.
    pub fn validate(&self) -> Result<()> {
        check_batch("lswitch_create_args", self.batch)
    }
}

/// Logical router creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterCreateArgs {
    /// Number of routers.
    pub amount: u32,
    /// Routers per invocation.
    pub batch: u32,
}

impl Default for RouterCreateArgs {
    fn default() -> Self {
        Self { amount: 1, batch: 1 }
    }
}

impl RouterCreateArgs {
    /// Validate the arguments.
    pub fn validate(&self) -> Result<()> {
        check_batch("router_create_args", Some(self.batch))
    }
}

/// Logical port creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortCreateArgs {
    /// Ports per switch.
    pub amount: u32,
    /// Host offset of the first port inside the switch's subnet.
    pub ip_shift: u32,
    /// Ports per invocation (default: all of them).
    pub batch: Option<u32>,
    /// Pin each port's port security to its MAC.
    pub port_security: bool,
}

impl Default for PortCreateArgs {
    fn default() -> Self {
        Self {
            amount: 1,
            ip_shift: 1,
            batch: None,
            port_security: true,
        }
    }
}

impl PortCreateArgs {
    /// Effective batch size.
    pub fn batch_size(&self) -> u32 {
        self.batch.unwrap_or(self.amount).max(1)
    }

    /// Validate the arguments.
    pub fn validate(&self) -> Result<()> {
        check_batch("lport_create_args", self.batch)
    }
}

fn default_physnet() -> String {
    "providernet".to_string()
}

/// Router connection and gateway-router wiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkCreateArgs {
    /// Networks attached to each router; 0 leaves networks unattached.
    pub networks_per_router: u32,
    /// Put a gateway router behind every network.
    pub gw_router_per_network: bool,
    /// First join-switch subnet.
    pub start_gw_cidr: Option<Ipv4Net>,
    /// First external-switch subnet.
    pub start_ext_cidr: Option<Ipv4Net>,
    /// Aggregate of every overlay network, used for return routes and SNAT.
    pub cluster_cidr: Option<Ipv4Net>,
    /// Physical network of the external switches.
    pub physnet: String,
}

impl Default for NetworkCreateArgs {
    fn default() -> Self {
        Self {
            networks_per_router: 0,
            gw_router_per_network: false,
            start_gw_cidr: None,
            start_ext_cidr: None,
            cluster_cidr: None,
            physnet: default_physnet(),
        }
    }
}

impl NetworkCreateArgs {
    /// Validate the arguments.
    pub fn validate(&self) -> Result<()> {
        if !self.gw_router_per_network {
            return Ok(());
        }
        if self.networks_per_router == 0 {
            return Err(ScaleError::config(
                "gw_router_per_network requires networks_per_router > 0",
            ));
        }
        if self.start_gw_cidr.is_none() || self.start_ext_cidr.is_none() {
            return Err(ScaleError::config(
                "gw_router_per_network requires start_gw_cidr and start_ext_cidr",
            ));
        }
        if self.cluster_cidr.is_none() {
            return Err(ScaleError::config(
                "gw_router_per_network requires cluster_cidr",
            ));
        }
        Ok(())
    }
}

fn default_bridge() -> String {
    "br-int".to_string()
}

/// Port binding and the wait that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortBindArgs {
    /// Bind as internal interfaces.
    pub internal: bool,
    /// Wrap internal interfaces in a namespace acting as a VM.
    pub internal_vm: bool,
    /// Wait for the bindings to come up.
    pub wait_up: bool,
    /// `hv`, `sb`, `ping`, `lsp` or `none`.
    pub wait_sync: String,
    /// Deadline for `ping`.
    pub wait_timeout_s: u64,
    /// Integration bridge.
    #[serde(default = "default_bridge")]
    pub bridge: String,
}

impl Default for PortBindArgs {
    fn default() -> Self {
        Self {
            internal: false,
            internal_vm: true,
            wait_up: false,
            wait_sync: "hv".to_string(),
            wait_timeout_s: 20,
            bridge: default_bridge(),
        }
    }
}

impl PortBindArgs {
    /// Parsed wait policy.
    pub fn wait_policy(&self) -> Result<WaitPolicy> {
        WaitPolicy::parse(&self.wait_sync)
    }

    /// Wait deadline.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_s)
    }

    /// Whether ports get a namespace of their own.
    pub fn fake_vms(&self) -> bool {
        self.internal && self.internal_vm
    }

    /// Validate the arguments.
    pub fn validate(&self) -> Result<()> {
        let policy = self.wait_policy()?;
        if self.wait_up && policy == WaitPolicy::Ping && !self.fake_vms() {
            return Err(ScaleError::config(
                "wait_sync=ping requires internal ports with internal_vm",
            ));
        }
        Ok(())
    }
}

const DEFAULT_ACL_MATCH: &str = "{direction} == {lport} && ip4 && udp && udp.src == {l4_port}";

/// ACL creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclCreateArgs {
    /// `to-lport` or `from-lport`.
    pub direction: String,
    /// ACL priority.
    pub priority: u32,
    /// ACL action.
    pub action: String,
    /// Address set referenced by `{address_set}` in the match.
    pub address_set: String,
    /// Match template with `{direction}`, `{lport}`, `{address_set}` and
    /// `{l4_port}` placeholders.
    #[serde(rename = "match")]
    pub match_template: String,
    /// Log matching packets.
    pub log: bool,
    /// ACLs per port; the `n`-th gets `l4_port = 100 + n`.
    pub acls_per_port: u32,
}

impl Default for AclCreateArgs {
    fn default() -> Self {
        Self {
            direction: "to-lport".to_string(),
            priority: 1000,
            action: "allow".to_string(),
            address_set: String::new(),
            match_template: DEFAULT_ACL_MATCH.to_string(),
            log: false,
            acls_per_port: 1,
        }
    }
}

impl AclCreateArgs {
    /// Render the match for `port` and its `n`-th ACL.
    pub fn render_match(&self, port: &str, n: u32) -> String {
        let field = if self.direction == "from-lport" {
            "inport"
        } else {
            "outport"
        };
        self.match_template
            .replace("{direction}", field)
            .replace("{lport}", port)
            .replace("{address_set}", &self.address_set)
            .replace("{l4_port}", &(100 + n).to_string())
    }

    /// Validate the arguments.
    pub fn validate(&self) -> Result<()> {
        match self.direction.as_str() {
            "to-lport" | "from-lport" => Ok(()),
            other => Err(ScaleError::config(format!("unknown ACL direction: {other}"))),
        }
    }
}

/// Datapaths created once per task and shared by every iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatapathArgs {
    /// Routers to create.
    pub router_create_args: RouterCreateArgs,
    /// Switches to create.
    pub lswitch_create_args: SwitchCreateArgs,
    /// Attach switches to routers, this many per router.
    pub networks_per_router: u32,
}

impl Default for DatapathArgs {
    fn default() -> Self {
        Self {
            router_create_args: RouterCreateArgs {
                amount: 0,
                ..RouterCreateArgs::default()
            },
            lswitch_create_args: SwitchCreateArgs {
                amount: 0,
                ..SwitchCreateArgs::default()
            },
            networks_per_router: 0,
        }
    }
}

impl DatapathArgs {
    /// Validate the arguments.
    pub fn validate(&self) -> Result<()> {
        self.router_create_args.validate()?;
        self.lswitch_create_args.validate()
    }
}

/// Persistent `ovn-nbctl` daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NbctlDaemonArgs {
    /// Start the daemon.
    pub daemon_mode: bool,
    /// Northbound database address.
    pub remote: Option<String>,
    /// Protocol prefixed to `remote` (`tcp`, `ssl`).
    pub prot: Option<String>,
    /// TLS private key.
    pub privkey: Option<String>,
    /// TLS certificate.
    pub cert: Option<String>,
    /// TLS CA certificate.
    pub cacert: Option<String>,
}

impl Default for NbctlDaemonArgs {
    fn default() -> Self {
        Self {
            daemon_mode: true,
            remote: None,
            prot: None,
            privkey: None,
            cert: None,
            cacert: None,
        }
    }
}

impl NbctlDaemonArgs {
    /// `--db` value, if a remote is configured.
    pub fn db(&self) -> Option<String> {
        let remote = self.remote.as_deref()?;
        Some(match self.prot.as_deref() {
            Some(prot) => format!("{prot}:{remote}"),
            None => remote.to_string(),
        })
    }

    /// TLS files, if all three are configured.
    pub fn ssl(&self) -> Option<SslFiles<'_>> {
        Some(SslFiles {
            private_key: self.privkey.as_deref()?,
            certificate: self.cert.as_deref()?,
            ca_cert: self.cacert.as_deref()?,
        })
    }

    /// Validate the arguments.
    pub fn validate(&self) -> Result<()> {
        let given = [&self.privkey, &self.cert, &self.cacert]
            .iter()
            .filter(|f| f.is_some())
            .count();
        if given != 0 && given != 3 {
            return Err(ScaleError::config(
                "privkey, cert and cacert must be given together",
            ));
        }
        Ok(())
    }
}
