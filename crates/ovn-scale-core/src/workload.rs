//! Whole workloads composed from topology and binding operations.

use crate::addressing::nth_subnet;
use crate::args::{
    DatapathArgs, NetworkCreateArgs, PortBindArgs, PortCreateArgs, SwitchCreateArgs,
};
use crate::binding::{allocate_networks_on_sandboxes, BoundPort};
use crate::error::{Result, ScaleError};
use crate::model::{GatewayTopologyUnit, LogicalPort, LogicalRouter, LogicalSwitch, Sandbox};
use crate::scenario::Scenario;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Routers and switches shared by every iteration of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Datapaths {
    /// Routers.
    pub routers: Vec<LogicalRouter>,
    /// Switches.
    pub switches: Vec<LogicalSwitch>,
}

/// Arguments of one routed-network iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutedNetworkArgs {
    /// Switches created per iteration.
    pub lswitch_create_args: SwitchCreateArgs,
    /// Router and gateway wiring.
    pub lnetwork_create_args: NetworkCreateArgs,
    /// Ports per switch.
    pub lport_create_args: PortCreateArgs,
    /// Binding and wait.
    pub port_bind_args: PortBindArgs,
    /// Create, bind and wait for ports; without it only datapaths are built.
    pub create_mgmt_port: bool,
}

impl Default for RoutedNetworkArgs {
    fn default() -> Self {
        Self {
            lswitch_create_args: SwitchCreateArgs::default(),
            lnetwork_create_args: NetworkCreateArgs::default(),
            lport_create_args: PortCreateArgs::default(),
            port_bind_args: PortBindArgs::default(),
            create_mgmt_port: true,
        }
    }
}

impl RoutedNetworkArgs {
    /// Validate every part.
    pub fn validate(&self) -> Result<()> {
        self.lswitch_create_args.validate()?;
        self.lnetwork_create_args.validate()?;
        self.lport_create_args.validate()?;
        self.port_bind_args.validate()
    }
}

/// What one routed-network iteration built.
#[derive(Debug, Clone, Default)]
pub struct RoutedNetwork {
    /// Switches of this iteration.
    pub switches: Vec<LogicalSwitch>,
    /// Gateway wiring, one unit per switch when enabled.
    pub gateways: Vec<GatewayTopologyUnit>,
    /// Ports created on the switches.
    pub ports: Vec<LogicalPort>,
    /// Where the ports were bound.
    pub bound: Vec<BoundPort>,
}

impl Scenario {
    /// Create the routers and switches every iteration shares, connecting
    /// them when `networks_per_router` is set.
    pub fn setup_datapaths(&mut self, args: &DatapathArgs) -> Result<Datapaths> {
        args.validate()?;
        let routers = self.create_routers(&args.router_create_args)?;
        let switches = self.create_switches(&args.lswitch_create_args)?;
        if args.networks_per_router > 0 {
            self.connect_networks_to_routers(&switches, &routers, args.networks_per_router)?;
        }
        info!(
            routers = routers.len(),
            switches = switches.len(),
            "datapaths ready"
        );
        Ok(Datapaths { routers, switches })
    }

    /// Sandboxes serving this iteration's networks: network `i` of iteration
    /// `k` lands on sandbox `(k * amount + i) mod n`.
    pub fn iteration_sandboxes(&self, amount: u32) -> Vec<Sandbox> {
        let all = &self.ctx.sandboxes;
        if all.is_empty() {
            return Vec::new();
        }
        let start = self.ctx.iteration as usize * amount as usize;
        (start..start + amount as usize)
            .map(|i| all[i % all.len()].clone())
            .collect()
    }

    /// One iteration of the routed-network workload.
    ///
    /// Subnets start `iteration * amount` subnets after each configured
    /// start, so iterations never overlap.
    pub fn create_routed_network(
        &mut self,
        routers: &[LogicalRouter],
        args: &RoutedNetworkArgs,
    ) -> Result<RoutedNetwork> {
        args.validate()?;
        let amount = args.lswitch_create_args.amount;
        let offset = self.ctx.iteration.checked_mul(amount).ok_or_else(|| {
            ScaleError::config(format!(
                "iteration {} with {amount} switches overflows the subnet offset",
                self.ctx.iteration
            ))
        })?;
        let sandboxes = self.iteration_sandboxes(amount);
        let net_args = &args.lnetwork_create_args;
        if (net_args.gw_router_per_network || args.create_mgmt_port)
            && sandboxes.is_empty()
            && amount > 0
        {
            return Err(ScaleError::config("deployment has no sandboxes"));
        }

        let mut switch_args = args.lswitch_create_args.clone();
        switch_args.start_cidr = switch_args
            .start_cidr
            .map(|start| nth_subnet(&start, offset))
            .transpose()?;
        info!(
            iteration = self.ctx.iteration,
            switches = amount,
            "creating routed network"
        );
        let mut switches = self.create_switches(&switch_args)?;

        let mut attached = Vec::new();
        if net_args.networks_per_router > 0 {
            attached =
                self.connect_networks_to_routers(&switches, routers, net_args.networks_per_router)?;
        }

        let mut gateways = Vec::new();
        if net_args.gw_router_per_network {
            let mut iteration_args = net_args.clone();
            iteration_args.start_gw_cidr = iteration_args
                .start_gw_cidr
                .map(|start| nth_subnet(&start, offset))
                .transpose()?;
            iteration_args.start_ext_cidr = iteration_args
                .start_ext_cidr
                .map(|start| nth_subnet(&start, offset))
                .transpose()?;
            gateways =
                self.connect_networks_to_gw_routers(&switches, &attached, &sandboxes, &iteration_args)?;
            let external: Vec<LogicalSwitch> =
                gateways.iter().map(|u| u.external_switch.clone()).collect();
            self.create_phynet(&external, &iteration_args.physnet, 1)?;
            self.program_gateway_routes(&gateways, iteration_args.cluster_cidr.as_ref())?;
        }

        let mut network = RoutedNetwork {
            gateways,
            ..RoutedNetwork::default()
        };
        if args.create_mgmt_port {
            for (i, switch) in switches.iter_mut().enumerate() {
                let external_gateway = network.gateways.get(i).map(|u| u.default_gateway_ip);
                network.ports.extend(self.create_ports_with_gateway(
                    switch,
                    &args.lport_create_args,
                    external_gateway,
                )?);
            }
            network.bound =
                self.bind_ports_and_wait(&network.ports, &sandboxes, &args.port_bind_args)?;
        }
        network.switches = switches;
        Ok(network)
    }

    /// Create networks, spread them over the deployment's sandboxes and
    /// bind `port_args.amount` ports per network on its sandboxes.
    pub fn create_and_bind_ports(
        &mut self,
        network_args: &SwitchCreateArgs,
        networks_per_sandbox: u32,
        port_args: &PortCreateArgs,
        bind_args: &PortBindArgs,
    ) -> Result<Vec<BoundPort>> {
        network_args.validate()?;
        port_args.validate()?;
        bind_args.validate()?;
        if port_args.amount == 0 {
            return Err(ScaleError::config("ports_per_network must be >= 1"));
        }
        let switches = self.create_networks(network_args)?;
        let sandboxes = self.ctx.sandboxes.clone();
        let networks = allocate_networks_on_sandboxes(switches, &sandboxes, networks_per_sandbox)?;

        let mut bound = Vec::new();
        for mut network in networks {
            let ports = self.create_ports(&mut network.switch, port_args)?;
            bound.extend(self.bind_ports(&ports, &network.sandboxes, bind_args)?);
        }
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioContext;
    use ovn_scale_exec::testing::RecordingConnector;
    use ovn_scale_exec::{ClientMultiplexer, Credential};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn scenario(rec: &RecordingConnector, sandboxes: usize, iteration: u32) -> Scenario {
        let clients = ClientMultiplexer::new(
            Box::new(rec.clone()),
            Credential::new("root", "ctl"),
            HashMap::from([("farm-0".to_string(), Credential::new("root", "f0"))]),
        );
        let sbs = (0..sandboxes)
            .map(|i| Sandbox::new(format!("sb-{i}"), "farm-0"))
            .collect();
        let ctx = ScenarioContext::new(Uuid::new_v4())
            .with_sandboxes(sbs)
            .with_iteration(iteration);
        Scenario::new(clients, ctx)
    }

    #[test]
    fn test_iteration_sandboxes_wrap() {
        let rec = RecordingConnector::new();
        let sc = scenario(&rec, 3, 1);
        let names: Vec<String> = sc.iteration_sandboxes(2).into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["sb-2", "sb-0"]);
    }

    #[test]
    fn test_subnet_offset_overflow_rejected() {
        let rec = RecordingConnector::new();
        let mut sc = scenario(&rec, 1, u32::MAX);
        let args = RoutedNetworkArgs {
            lswitch_create_args: SwitchCreateArgs {
                amount: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = sc.create_routed_network(&[], &args).unwrap_err();
        assert!(matches!(err, ScaleError::Config(msg) if msg.contains("overflows")));
        assert!(rec.invocations().is_empty());
    }

    #[test]
    fn test_setup_datapaths_defaults_create_nothing() {
        let rec = RecordingConnector::new();
        let mut sc = scenario(&rec, 1, 0);
        let dp = sc.setup_datapaths(&DatapathArgs::default()).unwrap();
        assert_eq!(dp, Datapaths::default());
        assert!(rec.invocations().is_empty());
    }

    #[test]
    fn test_routed_network_offsets_by_iteration() {
        let rec = RecordingConnector::new();
        let mut sc = scenario(&rec, 2, 2);
        let args = RoutedNetworkArgs {
            lswitch_create_args: SwitchCreateArgs {
                amount: 2,
                start_cidr: Some("10.0.0.0/24".parse().unwrap()),
                ..Default::default()
            },
            create_mgmt_port: false,
            ..Default::default()
        };
        let network = sc.create_routed_network(&[], &args).unwrap();
        let names: Vec<&str> = network.switches.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["lswitch_10.0.4.0/24", "lswitch_10.0.5.0/24"]);
        assert!(network.ports.is_empty());
    }

    #[test]
    fn test_create_and_bind_ports_uses_network_sandboxes() {
        let rec = RecordingConnector::new();
        let mut sc = scenario(&rec, 2, 0);
        let bound = sc
            .create_and_bind_ports(
                &SwitchCreateArgs {
                    amount: 2,
                    start_cidr: Some("10.0.0.0/24".parse().unwrap()),
                    ..Default::default()
                },
                1,
                &PortCreateArgs { amount: 2, ..Default::default() },
                &PortBindArgs::default(),
            )
            .unwrap();
        assert_eq!(bound.len(), 4);
        assert!(bound[..2].iter().all(|b| b.sandbox.name == "sb-0"));
        assert!(bound[2..].iter().all(|b| b.sandbox.name == "sb-1"));
        assert_eq!(rec.scripts_for("root@f0:22").len(), 2);
    }
}
