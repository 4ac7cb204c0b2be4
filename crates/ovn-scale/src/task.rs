//! Task description and the workload it drives.

use anyhow::Context;
use ovn_scale_core::{
    port_addresses, AclCreateArgs, DatapathArgs, LogicalSwitch, NbctlDaemonArgs, RoutedNetwork,
    RoutedNetworkArgs, Scenario,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Everything a run does, as read from the task file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDescription {
    /// Routers and switches created once.
    pub datapaths: DatapathArgs,
    /// Route northbound commands through a persistent daemon.
    pub nbctl_daemon: Option<NbctlDaemonArgs>,
    /// Per-iteration workload.
    pub routed_network: RoutedNetworkArgs,
    /// ACLs added for every port of every iteration. A named address set is
    /// created up front and filled with every created port's address.
    pub acls: Option<AclCreateArgs>,
    /// Delete what was created once all iterations finished.
    pub cleanup: bool,
}

impl Default for TaskDescription {
    fn default() -> Self {
        Self {
            datapaths: DatapathArgs::default(),
            nbctl_daemon: None,
            routed_network: RoutedNetworkArgs::default(),
            acls: None,
            cleanup: true,
        }
    }
}

impl TaskDescription {
    /// Load and validate a task file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading task file {}", path.display()))?;
        let task: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing task file {}", path.display()))?;
        task.validate()?;
        Ok(task)
    }

    /// Validate every section.
    pub fn validate(&self) -> ovn_scale_core::Result<()> {
        self.datapaths.validate()?;
        if let Some(daemon) = &self.nbctl_daemon {
            daemon.validate()?;
        }
        self.routed_network.validate()?;
        if let Some(acls) = &self.acls {
            acls.validate()?;
        }
        Ok(())
    }
}

/// Totals of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    /// Wall time of each iteration.
    pub iterations: Vec<Duration>,
    /// Switches created by iterations.
    pub switches: usize,
    /// Gateway routers wired.
    pub gateways: usize,
    /// Ports created.
    pub ports: usize,
    /// Ports bound on sandboxes.
    pub bound: usize,
}

impl TaskReport {
    fn record(&mut self, network: &RoutedNetwork, elapsed: Duration) {
        self.iterations.push(elapsed);
        self.switches += network.switches.len();
        self.gateways += network.gateways.len();
        self.ports += network.ports.len();
        self.bound += network.bound.len();
    }
}

/// Run `task` for `iterations` iterations on `scenario`.
///
/// The nbctl daemon, when configured, is stopped whether or not the run
/// succeeds.
pub fn run_task(
    scenario: &mut Scenario,
    task: &TaskDescription,
    iterations: u32,
) -> anyhow::Result<TaskReport> {
    task.validate()?;
    if let Some(daemon) = &task.nbctl_daemon {
        scenario
            .start_nbctl_daemon(daemon)
            .context("starting nbctl daemon")?;
    }

    let result = run_iterations(scenario, task, iterations);

    if let Err(e) = scenario.stop_nbctl_daemon() {
        warn!(error = %e, "failed to stop nbctl daemon");
    }
    result
}

fn run_iterations(
    scenario: &mut Scenario,
    task: &TaskDescription,
    iterations: u32,
) -> anyhow::Result<TaskReport> {
    let datapaths = scenario
        .setup_datapaths(&task.datapaths)
        .context("creating datapaths")?;

    let address_set = task
        .acls
        .as_ref()
        .map(|acls| acls.address_set.as_str())
        .filter(|name| !name.is_empty());
    if let Some(name) = address_set {
        scenario
            .create_address_set(name, &[])
            .with_context(|| format!("creating address set {name}"))?;
    }

    let mut report = TaskReport::default();
    let mut created: Vec<LogicalSwitch> = datapaths.switches.clone();
    for iteration in 0..iterations {
        scenario.set_iteration(iteration);
        let started = Instant::now();
        let network = scenario
            .create_routed_network(&datapaths.routers, &task.routed_network)
            .with_context(|| format!("iteration {iteration}"))?;

        if let Some(name) = address_set {
            let addrs = port_addresses(&network.ports);
            let addrs: Vec<&str> = addrs.iter().map(String::as_str).collect();
            scenario.address_set_add_addrs(name, &addrs)?;
        }
        if let Some(acls) = &task.acls {
            for switch in &network.switches {
                let ports: Vec<_> = network
                    .ports
                    .iter()
                    .filter(|p| p.switch == switch.name)
                    .cloned()
                    .collect();
                scenario.create_acls(switch, &ports, acls)?;
            }
        }

        let elapsed = started.elapsed();
        info!(
            iteration,
            elapsed_ms = elapsed.as_millis() as u64,
            switches = network.switches.len(),
            ports = network.ports.len(),
            "iteration complete"
        );
        report.record(&network, elapsed);

        created.extend(network.switches);
        for unit in network.gateways {
            created.push(unit.join_switch);
            created.push(unit.external_switch);
        }
    }

    if task.cleanup {
        cleanup(scenario, &created)?;
        if let Some(name) = address_set {
            scenario.remove_address_set(name)?;
        }
    }
    Ok(report)
}

fn cleanup(scenario: &mut Scenario, switches: &[LogicalSwitch]) -> anyhow::Result<()> {
    info!(switches = switches.len(), "cleaning up");
    let sandboxes = scenario.context().sandboxes.clone();
    scenario.cleanup_internal_ports(&sandboxes)?;
    scenario.delete_switches(switches)?;
    let routers = scenario.delete_routers()?;
    info!(routers, "cleanup complete");
    Ok(())
}
