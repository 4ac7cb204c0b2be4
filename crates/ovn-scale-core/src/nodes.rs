//! Node-level helpers: chassis address planning, chassis and flow queries,
//! the persistent nbctl daemon and ad-hoc commands on sandboxes.

use crate::args::NbctlDaemonArgs;
use crate::error::{Result, ScaleError};
use crate::model::Sandbox;
use crate::scenario::Scenario;
use ipnet::Ipv4Net;
use ovn_scale_exec::commands::{nbctl, ofctl, sbctl, Command};
use ovn_scale_exec::{ClientKind, CtlClient};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const CHASSIS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where chassis that do not fit evenly into the groups go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// The first group takes them.
    ClampToFirst,
    /// The last group takes them.
    ClampToLast,
    /// The chassis count must divide evenly.
    #[default]
    Reject,
}

/// One emulated chassis address and its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChassisIp {
    /// Chassis address.
    pub ip: Ipv4Addr,
    /// Group (farm) index.
    pub group: usize,
}

/// Address block of one farm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FarmPlan {
    /// Farm index.
    pub index: usize,
    /// Sandboxes the farm hosts.
    pub sandboxes: usize,
    /// First address of the farm's block.
    pub start_ip: Ipv4Addr,
}

/// Result of [`plan_chassis_ips`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChassisPlan {
    /// Prefix length of the planned subnet.
    pub prefix_len: u8,
    /// Every chassis, in address order.
    pub chassis: Vec<ChassisIp>,
    /// Every farm, in index order.
    pub farms: Vec<FarmPlan>,
}

/// Spread `num_ip` chassis addresses, taken from `start_cidr`'s address
/// onward, over `group_size` farms.
///
/// Each farm hosts `num_ip / group_size` chassis; the remainder is placed
/// according to `overflow`. Farm blocks are laid out from the same start
/// address, each one address followed by room for its sandboxes.
pub fn plan_chassis_ips(
    start_cidr: &Ipv4Net,
    group_size: usize,
    num_ip: usize,
    overflow: OverflowPolicy,
) -> Result<ChassisPlan> {
    if group_size == 0 {
        return Err(ScaleError::config("group_size must be >= 1"));
    }
    let per_host = num_ip / group_size;
    if per_host == 0 {
        return Err(ScaleError::config(format!(
            "{num_ip} chassis cannot fill {group_size} groups"
        )));
    }
    let extra = num_ip - per_host * group_size;
    let overflow_group = match overflow {
        _ if extra == 0 => 0,
        OverflowPolicy::ClampToFirst => 0,
        OverflowPolicy::ClampToLast => group_size - 1,
        OverflowPolicy::Reject => {
            return Err(ScaleError::config(format!(
                "{num_ip} chassis do not divide into {group_size} groups"
            )))
        }
    };

    let first = u32::from(start_cidr.addr());
    let available = u64::from(u32::from(start_cidr.broadcast())) - u64::from(first) + 1;
    let nth = |offset: usize| -> Result<Ipv4Addr> {
        if offset as u64 >= available {
            return Err(ScaleError::config(format!(
                "{start_cidr} runs out of addresses at offset {offset}"
            )));
        }
        Ok(Ipv4Addr::from(first + offset as u32))
    };

    let chassis = (0..num_ip)
        .map(|i| {
            let group = i / per_host;
            let group = if group >= group_size { overflow_group } else { group };
            Ok(ChassisIp { ip: nth(i)?, group })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut farms = Vec::with_capacity(group_size);
    let mut cursor = 0;
    for index in 0..group_size {
        let sandboxes = per_host + if index == overflow_group { extra } else { 0 };
        farms.push(FarmPlan {
            index,
            sandboxes,
            start_ip: nth(cursor)?,
        });
        cursor += 1 + sandboxes;
    }

    Ok(ChassisPlan {
        prefix_len: start_cidr.prefix_len(),
        chassis,
        farms,
    })
}

/// Options of an ad-hoc command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Option introducing a pid, e.g. `-p`.
    pub pid_opt: Option<String>,
    /// Process whose pid (`pidof -s`) follows `pid_opt`.
    pub pid_process: Option<String>,
    /// Run the command in the background.
    pub background: bool,
}

/// Run `cmd` on `client`, resolving a pid first if asked to.
fn run_with_options(client: &mut CtlClient, cmd: &str, opts: &RunOptions) -> Result<String> {
    let pid = match &opts.pid_process {
        Some(process) => {
            let out = client.query(Command::shell(format!("pidof -s {process}")))?;
            Some(out.trim().to_string())
        }
        None => None,
    };
    let mut line = cmd.to_string();
    if let (Some(pid_opt), Some(pid)) = (&opts.pid_opt, pid.filter(|p| !p.is_empty())) {
        line = format!("{line} {pid_opt} {pid}");
    }
    if opts.background {
        line.push_str(" &");
    }
    let out = client.query(Command::shell(line))?;
    Ok(out.trim_end().to_string())
}

impl Scenario {
    /// Poll the southbound database until chassis `name` registers.
    pub fn wait_chassis(&mut self, name: &str, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let deadline = started + timeout;
        let client = self.controller(ClientKind::SbCtl)?;
        loop {
            let found = client.query(sbctl::find_chassis(name))?;
            if !found.trim().is_empty() {
                debug!(chassis = name, waited = ?started.elapsed(), "chassis registered");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ScaleError::Timeout {
                    what: format!("chassis {name}"),
                    waited: started.elapsed(),
                });
            }
            thread::sleep(CHASSIS_POLL_INTERVAL);
        }
    }

    /// Number of OpenFlow flows on `bridge` of each sandbox.
    pub fn count_openflows(
        &mut self,
        sandboxes: &[Sandbox],
        bridge: &str,
    ) -> Result<Vec<(String, usize)>> {
        let mut counts = Vec::with_capacity(sandboxes.len());
        for sandbox in sandboxes {
            let dump = self
                .sandbox_client(sandbox, ClientKind::OfCtl)?
                .query(ofctl::dump_flows(bridge))?;
            let count = ofctl::count_flows(&dump);
            debug!(sandbox = %sandbox.name, bridge, flows = count, "openflow count");
            counts.push((sandbox.name.clone(), count));
        }
        Ok(counts)
    }

    /// Start a persistent nbctl daemon on the controller and route further
    /// northbound commands through it.
    ///
    /// Returns the control socket, or `None` when `daemon_mode` is off.
    pub fn start_nbctl_daemon(&mut self, args: &NbctlDaemonArgs) -> Result<Option<String>> {
        args.validate()?;
        if !args.daemon_mode {
            return Ok(None);
        }
        if let Some(socket) = &self.ctx.daemon_socket {
            warn!(socket = %socket, "nbctl daemon already running");
            return Ok(Some(socket.clone()));
        }
        let db = args.db();
        let client = self.nbctl()?;
        let endpoint = client.endpoint().to_string();
        let out = client.query(nbctl::start_daemon(db.as_deref(), args.ssl()))?;
        let socket = out.trim();
        if socket.is_empty() {
            return Err(ScaleError::NotFound {
                kind: "nbctl daemon socket",
                name: endpoint,
            });
        }
        info!(socket, "nbctl daemon started");
        self.ctx.daemon_socket = Some(socket.to_string());
        Ok(Some(socket.to_string()))
    }

    /// Stop the nbctl daemon, best effort. No-op when none is running.
    pub fn stop_nbctl_daemon(&mut self) -> Result<()> {
        let Some(socket) = self.ctx.daemon_socket.take() else {
            return Ok(());
        };
        info!(socket = %socket, "stopping nbctl daemon");
        let container = self
            .ctx
            .controller_target(ClientKind::NbCtl)
            .container_for(ClientKind::NbCtl)
            .to_string();
        let client = self.controller(ClientKind::Ssh)?;
        let target = client.target().clone().host_container(Some(container));
        client.set_target(target);
        client.run_best_effort(Command::shell(format!("ovs-appctl -t {socket} exit")))?;
        Ok(())
    }

    /// Run a shell command on `sandbox` and return its trimmed stdout.
    pub fn run_farm_command(
        &mut self,
        sandbox: &Sandbox,
        cmd: &str,
        opts: &RunOptions,
    ) -> Result<String> {
        info!(sandbox = %sandbox.name, command = cmd, "running command");
        let client = self.sandbox_client(sandbox, ClientKind::Ssh)?;
        run_with_options(client, cmd, opts)
    }

    /// Run a shell command on the controller sandbox and return its trimmed
    /// stdout.
    pub fn run_controller_command(&mut self, cmd: &str, opts: &RunOptions) -> Result<String> {
        info!(sandbox = %self.ctx.controller_sandbox, command = cmd, "running command");
        let client = self.controller(ClientKind::Ssh)?;
        run_with_options(client, cmd, opts)
    }
}
