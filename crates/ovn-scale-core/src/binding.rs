//! Port binding and convergence waits.

use crate::args::PortBindArgs;
use crate::error::{Result, ScaleError};
use crate::mac::mac_string;
use crate::model::{LogicalPort, LogicalSwitch, Sandbox};
use crate::scenario::Scenario;
use ovn_scale_exec::commands::db::{self, ColumnValue};
use ovn_scale_exec::commands::{nbctl, vsctl, Command};
use ovn_scale_exec::{ClientKind, ExecError};
use rand::Rng;
use std::collections::BTreeMap;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// `wait-until` commands sent per invocation while waiting on ports.
const LSP_WAIT_FLUSH_EVERY: usize = 400;

/// Pause between reachability pings.
const PING_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// What a `--wait` sync barrier waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    /// Every hypervisor caught up.
    Hv,
    /// The southbound database caught up.
    Sb,
}

impl SyncTarget {
    /// `--wait` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hv => "hv",
            Self::Sb => "sb",
        }
    }
}

/// How to decide that bound ports are ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// `wait-until` each port is up.
    Lsp,
    /// One sync barrier.
    Sync(SyncTarget),
    /// Ping each port's gateway from inside its namespace.
    Ping,
}

impl WaitPolicy {
    /// Parse `hv`, `sb`, `ping`, `lsp` or `none` (an alias of `lsp`).
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hv" => Ok(Self::Sync(SyncTarget::Hv)),
            "sb" => Ok(Self::Sync(SyncTarget::Sb)),
            "ping" => Ok(Self::Ping),
            "lsp" | "none" => Ok(Self::Lsp),
            other => Err(ScaleError::config(format!(
                "unknown wait_sync value {other:?}, expected one of hv, sb, ping, lsp, none"
            ))),
        }
    }
}

impl fmt::Display for WaitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lsp => f.write_str("lsp"),
            Self::Sync(target) => f.write_str(target.as_str()),
            Self::Ping => f.write_str("ping"),
        }
    }
}

/// A logical port bound on a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundPort {
    /// The port.
    pub port: LogicalPort,
    /// Where it is bound.
    pub sandbox: Sandbox,
}

/// A switch and the sandboxes its ports may be bound on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalNetwork {
    /// The switch.
    pub switch: LogicalSwitch,
    /// Candidate sandboxes.
    pub sandboxes: Vec<Sandbox>,
}

/// Ports per sandbox when slicing: `ports / sandboxes` rounded up.
pub fn slice_size(ports: usize, sandboxes: usize) -> usize {
    if sandboxes == 0 {
        return 0;
    }
    (ports + sandboxes - 1) / sandboxes
}

/// Assign port indices to sandbox indices.
///
/// With fewer ports than sandboxes each port goes to an independently chosen
/// random sandbox. Otherwise sandbox `i` takes the `i`-th contiguous slice of
/// [`slice_size`] ports. The result has one entry per sandbox.
pub fn assign_ports<R: Rng + ?Sized>(
    ports: usize,
    sandboxes: usize,
    rng: &mut R,
) -> Result<Vec<Vec<usize>>> {
    if sandboxes == 0 {
        if ports == 0 {
            return Ok(Vec::new());
        }
        return Err(ScaleError::config("no sandboxes to bind ports on"));
    }
    let mut assigned = vec![Vec::new(); sandboxes];
    if ports < sandboxes {
        for port in 0..ports {
            assigned[rng.gen_range(0..sandboxes)].push(port);
        }
    } else {
        let size = slice_size(ports, sandboxes);
        for port in 0..ports {
            assigned[port / size].push(port);
        }
    }
    Ok(assigned)
}

/// Spread `networks` over `sandboxes`.
///
/// With `per_sandbox == 0` every network may use every sandbox. Otherwise
/// networks are grouped `per_sandbox` at a time and each group gets an equal
/// contiguous share of the sandboxes; both divisions must be exact.
pub fn allocate_networks_on_sandboxes(
    networks: Vec<LogicalSwitch>,
    sandboxes: &[Sandbox],
    per_sandbox: u32,
) -> Result<Vec<LogicalNetwork>> {
    if per_sandbox == 0 {
        return Ok(networks
            .into_iter()
            .map(|switch| LogicalNetwork {
                switch,
                sandboxes: sandboxes.to_vec(),
            })
            .collect());
    }
    let per_sandbox = per_sandbox as usize;
    if networks.len() % per_sandbox != 0 {
        return Err(ScaleError::config(format!(
            "number of networks {} is not divisible by networks per sandbox {per_sandbox}",
            networks.len()
        )));
    }
    let groups = networks.len() / per_sandbox;
    if groups == 0 {
        return Ok(Vec::new());
    }
    if sandboxes.len() < groups {
        return Err(ScaleError::config(format!(
            "number of sandboxes {} is less than number of network groups {groups}",
            sandboxes.len()
        )));
    }
    if sandboxes.len() % groups != 0 {
        return Err(ScaleError::config(format!(
            "number of sandboxes {} is not divisible by network groups {groups}",
            sandboxes.len()
        )));
    }
    let spread = sandboxes.len() / groups;
    Ok(networks
        .into_iter()
        .enumerate()
        .map(|(i, switch)| {
            let group = i / per_sandbox;
            LogicalNetwork {
                switch,
                sandboxes: sandboxes[group * spread..(group + 1) * spread].to_vec(),
            }
        })
        .collect())
}

/// Shell lines turning internal interface `port` into a namespaced VM.
fn internal_vm_commands(port: &LogicalPort, sandbox: &Sandbox) -> Result<Vec<Command>> {
    let p = &port.name;
    let (Some(ip), Some(gateway)) = (port.ip, port.gateway) else {
        return Err(ScaleError::config(format!(
            "port {p} needs an address and a gateway to run as a VM"
        )));
    };
    let mut lines = Vec::with_capacity(7);
    if sandbox.host_container.is_none() {
        lines.push(format!("ethtool -K {p} tx off &> /dev/null"));
    }
    lines.push(format!("ip netns add {p}"));
    lines.push(format!("ip link set {p} netns {p}"));
    lines.push(format!(
        "ip netns exec {p} ip link set {p} address {}",
        mac_string(&port.mac)
    ));
    lines.push(format!("ip netns exec {p} ip addr add {ip} dev {p}"));
    lines.push(format!("ip netns exec {p} ip link set {p} up"));
    lines.push(format!("ip netns exec {p} ip route add default via {gateway}"));
    Ok(lines.into_iter().map(Command::shell).collect())
}

fn netns_del(port: &str) -> Command {
    Command::shell(format!("ip netns del {port}"))
}

impl Scenario {
    /// Bind `ports` on `sandboxes`, one invocation per sandbox.
    ///
    /// Internal ports with `internal_vm` are moved into a namespace of their
    /// own and remembered for pings and teardown.
    pub fn bind_ports(
        &mut self,
        ports: &[LogicalPort],
        sandboxes: &[Sandbox],
        args: &PortBindArgs,
    ) -> Result<Vec<BoundPort>> {
        let assignment = assign_ports(ports.len(), sandboxes.len(), &mut rand::thread_rng())?;
        if args.fake_vms() {
            for port in ports {
                if port.ip.is_none() || port.gateway.is_none() {
                    return Err(ScaleError::config(format!(
                        "port {} needs an address and a gateway to run as a VM",
                        port.name
                    )));
                }
            }
        }

        let mut bound = Vec::with_capacity(ports.len());
        for (sandbox, indices) in sandboxes.iter().zip(&assignment) {
            if indices.is_empty() {
                continue;
            }
            info!(sandbox = %sandbox.name, farm = %sandbox.farm, ports = indices.len(), "binding ports");
            let mut batch = self.sandbox_client(sandbox, ClientKind::VsCtl)?.begin_batch();
            for &i in indices {
                batch.run(vsctl::add_port(&args.bridge, &ports[i].name, true));
                batch.run(vsctl::bind_interface(&ports[i].name, args.internal));
            }
            batch.commit()?;
            bound.extend(indices.iter().map(|&i| BoundPort {
                port: ports[i].clone(),
                sandbox: sandbox.clone(),
            }));
        }

        if args.fake_vms() {
            for entry in &bound {
                let commands = internal_vm_commands(&entry.port, &entry.sandbox)?;
                let mut batch = self
                    .sandbox_client(&entry.sandbox, ClientKind::Ssh)?
                    .begin_batch();
                for cmd in commands {
                    batch.run(cmd);
                }
                batch.commit()?;
                self.internal_ports.push(entry.clone());
                debug!(port = %entry.port.name, sandbox = %entry.sandbox.name, "internal VM ready");
            }
        }
        Ok(bound)
    }

    /// Bind `ports` and, with `wait_up`, wait for them.
    ///
    /// The wait policy is validated before anything is bound.
    pub fn bind_ports_and_wait(
        &mut self,
        ports: &[LogicalPort],
        sandboxes: &[Sandbox],
        args: &PortBindArgs,
    ) -> Result<Vec<BoundPort>> {
        args.validate()?;
        let policy = args.wait_policy()?;
        let bound = self.bind_ports(ports, sandboxes, args)?;
        if args.wait_up {
            self.wait_ready(ports, policy, args.wait_timeout())?;
        }
        Ok(bound)
    }

    /// Wait until `ports` are ready according to `policy`.
    ///
    /// `timeout` bounds the whole call and only applies to [`WaitPolicy::Ping`].
    pub fn wait_ready(
        &mut self,
        ports: &[LogicalPort],
        policy: WaitPolicy,
        timeout: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        let deadline = started + timeout;
        info!(policy = %policy, ports = ports.len(), "waiting for ports");
        match policy {
            WaitPolicy::Lsp => {
                let mut batch = self.nbctl()?.begin_batch();
                for (i, port) in ports.iter().enumerate() {
                    batch.run(db::wait_until(
                        "Logical_Switch_Port",
                        &port.name,
                        &[ColumnValue::eq("up", true)],
                    ));
                    if (i + 1) % LSP_WAIT_FLUSH_EVERY == 0 {
                        batch.flush()?;
                    }
                }
                batch.commit()?;
            }
            WaitPolicy::Sync(target) => {
                self.nbctl()?.run(nbctl::sync(target.as_str()))?;
            }
            WaitPolicy::Ping => {
                for port in ports {
                    self.ping_port(port, started, deadline)?;
                }
            }
        }
        Ok(())
    }

    fn ping_port(&mut self, port: &LogicalPort, started: Instant, deadline: Instant) -> Result<()> {
        let sandbox = self
            .internal_ports
            .iter()
            .find(|bp| bp.port.name == port.name)
            .map(|bp| bp.sandbox.clone())
            .ok_or_else(|| ScaleError::NotFound {
                kind: "internal port",
                name: port.name.clone(),
            })?;
        let dest = port.ping_target().ok_or_else(|| {
            ScaleError::config(format!("port {} has no gateway to ping", port.name))
        })?;
        let ping = Command::shell(format!(
            "ip netns exec {} ping -q -c 1 -W 0.1 {dest}",
            port.name
        ));

        let client = self.sandbox_client(&sandbox, ClientKind::Ssh)?;
        loop {
            match client.query(ping.clone()) {
                Ok(_) => return Ok(()),
                Err(ExecError::Remote { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                warn!(port = %port.name, dest = %dest, "port cannot reach its gateway");
                return Err(ScaleError::Timeout {
                    what: format!("port {} to reach {dest}", port.name),
                    waited: started.elapsed(),
                });
            }
            thread::sleep(PING_RETRY_INTERVAL);
        }
    }

    /// Remove the namespaces and interfaces of internal ports bound on
    /// `sandboxes`, best effort, one invocation per sandbox and tool.
    pub fn cleanup_internal_ports(&mut self, sandboxes: &[Sandbox]) -> Result<()> {
        let mut by_sandbox: BTreeMap<String, (Sandbox, Vec<String>)> = BTreeMap::new();
        let (selected, kept): (Vec<BoundPort>, Vec<BoundPort>) =
            std::mem::take(&mut self.internal_ports)
                .into_iter()
                .partition(|bp| sandboxes.iter().any(|sb| sb.name == bp.sandbox.name));
        self.internal_ports = kept;
        for bp in selected {
            by_sandbox
                .entry(bp.sandbox.name.clone())
                .or_insert_with(|| (bp.sandbox.clone(), Vec::new()))
                .1
                .push(bp.port.name);
        }

        for (name, (sandbox, ports)) in &by_sandbox {
            info!(sandbox = %name, ports = ports.len(), "removing internal ports");
            let mut batch = self.sandbox_client(sandbox, ClientKind::VsCtl)?.begin_batch();
            for port in ports {
                batch.run(vsctl::del_port(port));
            }
            batch.commit_best_effort()?;

            let mut batch = self.sandbox_client(sandbox, ClientKind::Ssh)?.begin_batch();
            for port in ports {
                batch.run(netns_del(port));
            }
            batch.commit_best_effort()?;
        }
        Ok(())
    }

    /// Remove every internal `lp` interface found on `sandbox`, whether or
    /// not this scenario created it. Best effort.
    pub fn purge_internal_ports(&mut self, sandbox: &Sandbox) -> Result<usize> {
        let listed = self
            .sandbox_client(sandbox, ClientKind::VsCtl)?
            .run_best_effort(vsctl::find_internal_interfaces())?
            .unwrap_or_default();
        let names: Vec<&str> = listed
            .lines()
            .map(str::trim)
            .filter(|name| name.contains("lp"))
            .collect();
        if names.is_empty() {
            return Ok(0);
        }
        info!(sandbox = %sandbox.name, ports = names.len(), "purging internal ports");

        let mut batch = self.sandbox_client(sandbox, ClientKind::VsCtl)?.begin_batch();
        for name in &names {
            batch.run(vsctl::del_port(name));
        }
        batch.commit_best_effort()?;

        let mut batch = self.sandbox_client(sandbox, ClientKind::Ssh)?.begin_batch();
        for name in &names {
            batch.run(netns_del(name));
        }
        batch.commit_best_effort()?;
        self.internal_ports.retain(|bp| {
            bp.sandbox.name != sandbox.name || !names.contains(&bp.port.name.as_str())
        });
        Ok(names.len())
    }
}
