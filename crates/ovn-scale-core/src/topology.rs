//! Topology generation.
//!
//! Every operation validates and allocates first, then issues its commands
//! through one batch session on the controller's nbctl client, so a
//! validation failure never reaches the remote side.

use crate::addressing::{allocate_hosts, gateway_ip, nth_subnet};
use crate::args::{AclCreateArgs, NetworkCreateArgs, PortCreateArgs, RouterCreateArgs, SwitchCreateArgs};
use crate::error::{Result, ScaleError};
use crate::mac::mac_string;
use crate::model::{GatewayTopologyUnit, LogicalPort, LogicalRouter, LogicalSwitch, Sandbox};
use crate::scenario::Scenario;
use ipnet::Ipv4Net;
use ovn_scale_exec::commands::db::{self, ColumnValue};
use ovn_scale_exec::commands::{nbctl, Command};
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// Priority of the source-based reroute policies on distributed routers.
const REROUTE_PRIORITY: u32 = 10;

fn require_cidr(switch: &LogicalSwitch) -> Result<Ipv4Net> {
    switch
        .cidr
        .ok_or_else(|| ScaleError::config(format!("network {} has no cidr", switch.name)))
}

fn host_net(ip: Ipv4Addr, cidr: &Ipv4Net) -> Result<Ipv4Net> {
    Ipv4Net::new(ip, cidr.prefix_len()).map_err(|e| ScaleError::config(e.to_string()))
}

/// Commands attaching `router` to `switch` through `lrp`/`rp`.
fn router_port_commands(
    router: &str,
    switch: &str,
    lrp: &str,
    rp: &str,
    mac: &str,
    network: &Ipv4Net,
) -> [Command; 5] {
    let network = network.to_string();
    [
        nbctl::lrp_add(router, lrp, mac, &[network.as_str()]),
        nbctl::lsp_add(switch, rp),
        nbctl::lsp_set_type(rp, "router"),
        nbctl::lsp_set_addresses(rp, &[&["router"]]),
        nbctl::lsp_set_options(rp, &[("router-port", lrp)]),
    ]
}

/// Sizes of the network groups attached to successive routers: the
/// remainder first, then full groups of `per_router`.
fn router_group_sizes(networks: usize, per_router: usize) -> Vec<usize> {
    let remainder = networks % per_router;
    (remainder != 0)
        .then_some(remainder)
        .into_iter()
        .chain(std::iter::repeat(per_router).take(networks / per_router))
        .collect()
}

impl Scenario {
    /// Create `args.amount` switches, flushing every `args.batch_size()`.
    pub fn create_switches(&mut self, args: &SwitchCreateArgs) -> Result<Vec<LogicalSwitch>> {
        args.validate()?;
        let mut switches = Vec::with_capacity(args.amount as usize);
        for i in 0..args.amount {
            let cidr = args.start_cidr.map(|start| nth_subnet(&start, i)).transpose()?;
            let name = match cidr {
                Some(cidr) => format!("lswitch_{cidr}"),
                None => self.names.generate("lswitch"),
            };
            switches.push(LogicalSwitch::new(name, cidr));
        }
        info!(count = switches.len(), "creating logical switches");

        let mut batch = self.nbctl()?.begin_batch();
        for group in switches.chunks(args.batch_size() as usize) {
            for switch in group {
                batch.run(nbctl::ls_add(&switch.name));
            }
            batch.flush()?;
        }
        batch.commit()?;
        Ok(switches)
    }

    /// Create switches and, with a physical network configured, their
    /// provider-network ports.
    pub fn create_networks(&mut self, args: &SwitchCreateArgs) -> Result<Vec<LogicalSwitch>> {
        let switches = self.create_switches(args)?;
        if let Some(physnet) = &args.physical_network {
            self.create_phynet(&switches, physnet, args.batch_size())?;
        }
        Ok(switches)
    }

    /// Add a `localnet` port `provnet-<switch>` bound to `physnet` on every
    /// switch, flushing every `batch` switches.
    pub fn create_phynet(
        &mut self,
        switches: &[LogicalSwitch],
        physnet: &str,
        batch_size: u32,
    ) -> Result<()> {
        info!(count = switches.len(), physnet, "creating provider network ports");
        let mut batch = self.nbctl()?.begin_batch();
        for group in switches.chunks(batch_size.max(1) as usize) {
            for switch in group {
                let port = format!("provnet-{}", switch.name);
                batch.run(nbctl::lsp_add(&switch.name, &port));
                batch.run(nbctl::lsp_set_addresses(&port, &[&["unknown"]]));
                batch.run(nbctl::lsp_set_type(&port, "localnet"));
                batch.run(nbctl::lsp_set_options(&port, &[("network_name", physnet)]));
            }
            batch.flush()?;
        }
        batch.commit()?;
        Ok(())
    }

    /// Create `args.amount` randomly named routers.
    pub fn create_routers(&mut self, args: &RouterCreateArgs) -> Result<Vec<LogicalRouter>> {
        args.validate()?;
        let routers: Vec<LogicalRouter> = (0..args.amount)
            .map(|_| LogicalRouter::new(self.names.generate("lrouter")))
            .collect();
        info!(count = routers.len(), "creating logical routers");

        let mut batch = self.nbctl()?.begin_batch();
        for group in routers.chunks(args.batch as usize) {
            for router in group {
                batch.run(nbctl::lr_add(&router.name));
            }
            batch.flush()?;
        }
        batch.commit()?;
        Ok(routers)
    }

    /// Attach `network` to `router`. The router port takes the last host
    /// address of the network; it is returned.
    pub fn connect_network_to_router(
        &mut self,
        router: &LogicalRouter,
        network: &LogicalSwitch,
    ) -> Result<Ipv4Addr> {
        let cidr = require_cidr(network)?;
        let gw = gateway_ip(&cidr, 1)?;
        let mac = mac_string(&self.macs.generate());
        let commands = router_port_commands(
            &router.name,
            &network.name,
            &format!("lrp-{}", network.name),
            &format!("rp-{}", network.name),
            &mac,
            &host_net(gw, &cidr)?,
        );
        debug!(router = %router.name, network = %network.name, gateway = %gw, "connecting network");

        let mut batch = self.nbctl()?.begin_batch();
        for cmd in commands {
            batch.run(cmd);
        }
        batch.commit()?;
        Ok(gw)
    }

    /// Attach `networks` to `routers`, `per_router` at a time. A partial
    /// group goes to the first router; routers are reused round-robin when
    /// there are more groups than routers.
    ///
    /// Returns the router each network was attached to.
    pub fn connect_networks_to_routers(
        &mut self,
        networks: &[LogicalSwitch],
        routers: &[LogicalRouter],
        per_router: u32,
    ) -> Result<Vec<LogicalRouter>> {
        if per_router == 0 {
            return Err(ScaleError::config("networks_per_router must be >= 1"));
        }
        if routers.is_empty() && !networks.is_empty() {
            return Err(ScaleError::config("no routers to connect networks to"));
        }
        let mut assigned = Vec::with_capacity(networks.len());
        let mut remaining = networks;
        for (j, size) in router_group_sizes(networks.len(), per_router as usize)
            .into_iter()
            .enumerate()
        {
            let router = &routers[j % routers.len()];
            let (group, rest) = remaining.split_at(size);
            for network in group {
                self.connect_network_to_router(router, network)?;
                assigned.push(router.clone());
            }
            remaining = rest;
        }
        Ok(assigned)
    }

    /// Create ports on `switch`.
    pub fn create_ports(
        &mut self,
        switch: &mut LogicalSwitch,
        args: &PortCreateArgs,
    ) -> Result<Vec<LogicalPort>> {
        self.create_ports_with_gateway(switch, args, None)
    }

    /// Create ports on `switch` whose traffic leaves through
    /// `external_gateway`.
    ///
    /// Addresses are consecutive from `ip_shift` hosts into the switch's
    /// subnet; when the subnet is too small nothing is sent.
    pub fn create_ports_with_gateway(
        &mut self,
        switch: &mut LogicalSwitch,
        args: &PortCreateArgs,
        external_gateway: Option<Ipv4Addr>,
    ) -> Result<Vec<LogicalPort>> {
        args.validate()?;
        let mut ports = Vec::with_capacity(args.amount as usize);
        match switch.cidr {
            Some(cidr) => {
                let gateway = gateway_ip(&cidr, 1)?;
                for ip in allocate_hosts(&cidr, args.ip_shift, args.amount)? {
                    ports.push(LogicalPort {
                        name: format!("lp_{ip}"),
                        switch: switch.name.clone(),
                        mac: self.macs.generate(),
                        ip: Some(host_net(ip, &cidr)?),
                        gateway: Some(gateway),
                        external_gateway,
                    });
                }
            }
            None => {
                for _ in 0..args.amount {
                    ports.push(LogicalPort {
                        name: self.names.generate("lp"),
                        switch: switch.name.clone(),
                        mac: self.macs.generate(),
                        ip: None,
                        gateway: None,
                        external_gateway,
                    });
                }
            }
        }
        info!(switch = %switch.name, count = ports.len(), "creating logical ports");

        let mut batch = self.nbctl()?.begin_batch();
        for group in ports.chunks(args.batch_size() as usize) {
            for port in group {
                let mac = mac_string(&port.mac);
                let ip = port.ip.map(|ip| ip.addr().to_string()).unwrap_or_default();
                let entry = [mac.as_str(), ip.as_str()];
                batch.run(nbctl::lsp_add(&switch.name, &port.name));
                batch.run(nbctl::lsp_set_addresses(&port.name, &[&entry[..]]));
                if args.port_security {
                    batch.run(nbctl::lsp_set_port_security(&port.name, &[&[mac.as_str()]]));
                }
            }
            batch.flush()?;
        }
        batch.commit()?;

        switch.ports.extend(ports.iter().map(|p| p.name.clone()));
        Ok(ports)
    }

    /// Put a gateway router pinned to `sandbox` behind `router`:
    ///
    /// ```text
    ///   network ── router ── join-<net> ── gwr-<net> ── ext-<net>
    /// ```
    ///
    /// On each transit subnet the network-facing side takes the last host
    /// address and the far side the one before it.
    pub fn connect_gateway_router(
        &mut self,
        router: &LogicalRouter,
        network: &LogicalSwitch,
        gw_cidr: &Ipv4Net,
        ext_cidr: &Ipv4Net,
        sandbox: &Sandbox,
    ) -> Result<GatewayTopologyUnit> {
        let gw_cidr = gw_cidr.trunc();
        let ext_cidr = ext_cidr.trunc();
        let unit = GatewayTopologyUnit {
            network: network.clone(),
            router: router.clone(),
            join_switch: LogicalSwitch::new(format!("join-{}", network.name), Some(gw_cidr)),
            gateway_router: LogicalRouter::new(format!("gwr-{}", network.name)),
            external_switch: LogicalSwitch::new(format!("ext-{}", network.name), Some(ext_cidr)),
            router_port_gateway_ip: gateway_ip(&gw_cidr, 1)?,
            join_ip: gateway_ip(&gw_cidr, 2)?,
            gateway_ip: gateway_ip(&ext_cidr, 1)?,
            default_gateway_ip: gateway_ip(&ext_cidr, 2)?,
        };
        let join = &unit.join_switch.name;
        let ext = &unit.external_switch.name;
        let gwr = &unit.gateway_router.name;

        let mut commands = vec![
            nbctl::ls_add(join),
            nbctl::ls_add(ext),
            nbctl::lr_add(gwr),
            db::set(
                "Logical_Router",
                gwr,
                &[ColumnValue::map_entry("options", "chassis", sandbox.chassis())],
            ),
        ];
        commands.extend(router_port_commands(
            &router.name,
            join,
            &format!("lrp-{join}"),
            &format!("rp-{join}"),
            &mac_string(&self.macs.generate()),
            &host_net(unit.router_port_gateway_ip, &gw_cidr)?,
        ));
        commands.extend(router_port_commands(
            gwr,
            join,
            &format!("lrp-gw-{join}"),
            &format!("rp-gw-{join}"),
            &mac_string(&self.macs.generate()),
            &host_net(unit.join_ip, &gw_cidr)?,
        ));
        commands.extend(router_port_commands(
            gwr,
            ext,
            &format!("lrp-{ext}"),
            &format!("rp-{ext}"),
            &mac_string(&self.macs.generate()),
            &host_net(unit.gateway_ip, &ext_cidr)?,
        ));
        info!(
            network = %network.name,
            gateway_router = %gwr,
            chassis = %sandbox.chassis(),
            "connecting gateway router"
        );

        let mut batch = self.nbctl()?.begin_batch();
        for cmd in commands {
            batch.run(cmd);
        }
        batch.commit()?;
        Ok(unit)
    }

    /// Put a gateway router behind every network. Network `i` uses the
    /// `i`-th successive join and external subnets and is pinned to
    /// `sandboxes[i % len]`; `routers[i]` is the router it hangs off.
    pub fn connect_networks_to_gw_routers(
        &mut self,
        networks: &[LogicalSwitch],
        routers: &[LogicalRouter],
        sandboxes: &[Sandbox],
        args: &NetworkCreateArgs,
    ) -> Result<Vec<GatewayTopologyUnit>> {
        args.validate()?;
        let (Some(start_gw), Some(start_ext)) = (args.start_gw_cidr, args.start_ext_cidr) else {
            return Err(ScaleError::config(
                "gateway routers need start_gw_cidr and start_ext_cidr",
            ));
        };
        if routers.len() != networks.len() {
            return Err(ScaleError::config(format!(
                "{} networks but {} routers",
                networks.len(),
                routers.len()
            )));
        }
        if sandboxes.is_empty() && !networks.is_empty() {
            return Err(ScaleError::config("no sandboxes to pin gateway routers to"));
        }

        let mut units = Vec::with_capacity(networks.len());
        for (i, (network, router)) in networks.iter().zip(routers).enumerate() {
            let idx = i as u32;
            let gw_cidr = nth_subnet(&start_gw, idx)?;
            let ext_cidr = nth_subnet(&start_ext, idx)?;
            let sandbox = &sandboxes[i % sandboxes.len()];
            units.push(self.connect_gateway_router(router, network, &gw_cidr, &ext_cidr, sandbox)?);
        }
        Ok(units)
    }

    /// Program routes, reroute policies and SNAT for `units` in one
    /// invocation.
    pub fn program_gateway_routes(
        &mut self,
        units: &[GatewayTopologyUnit],
        cluster_cidr: Option<&Ipv4Net>,
    ) -> Result<()> {
        let cluster_cidr = cluster_cidr
            .ok_or_else(|| ScaleError::config("gateway routes need cluster_cidr"))?
            .to_string();
        let mut commands = Vec::with_capacity(units.len() * 4);
        for unit in units {
            let net_cidr = require_cidr(&unit.network)?;
            let gwr = &unit.gateway_router.name;
            commands.push(nbctl::lr_route_add(
                gwr,
                "0.0.0.0/0",
                &unit.default_gateway_ip.to_string(),
            ));
            commands.push(nbctl::lr_route_add(
                gwr,
                &cluster_cidr,
                &unit.router_port_gateway_ip.to_string(),
            ));
            commands.push(nbctl::lr_policy_add(
                &unit.router.name,
                REROUTE_PRIORITY,
                &format!("ip4.src == {net_cidr}"),
                "reroute",
                Some(&unit.join_ip.to_string()),
            ));
            commands.push(nbctl::lr_nat_add(
                gwr,
                "snat",
                &unit.gateway_ip.to_string(),
                &cluster_cidr,
            ));
        }
        info!(units = units.len(), cluster = %cluster_cidr, "programming gateway routes");

        let mut batch = self.nbctl()?.begin_batch();
        for cmd in commands {
            batch.run(cmd);
        }
        batch.commit()?;
        Ok(())
    }

    /// Add `acls_per_port` ACLs per port on `switch`.
    pub fn create_acls(
        &mut self,
        switch: &LogicalSwitch,
        ports: &[LogicalPort],
        args: &AclCreateArgs,
    ) -> Result<()> {
        args.validate()?;
        info!(switch = %switch.name, ports = ports.len(), "creating ACLs");
        let mut batch = self.nbctl()?.begin_batch();
        for port in ports {
            for n in 0..args.acls_per_port {
                batch.run(nbctl::acl_add(
                    &switch.name,
                    &args.direction,
                    args.priority,
                    &args.render_match(&port.name, n),
                    &args.action,
                    args.log,
                ));
            }
        }
        batch.commit()?;
        Ok(())
    }

    /// Remove every ACL of `switches`, best effort.
    pub fn delete_acls(&mut self, switches: &[LogicalSwitch]) -> Result<()> {
        let mut batch = self.nbctl()?.begin_batch();
        for switch in switches {
            batch.run(nbctl::acl_del(&switch.name));
        }
        batch.commit_best_effort()?;
        Ok(())
    }

    /// Delete `switches`, best effort.
    pub fn delete_switches(&mut self, switches: &[LogicalSwitch]) -> Result<()> {
        info!(count = switches.len(), "deleting logical switches");
        let mut batch = self.nbctl()?.begin_batch();
        for switch in switches {
            batch.run(nbctl::ls_del(&switch.name));
        }
        batch.commit_best_effort()?;
        Ok(())
    }

    /// Delete `ports`, best effort.
    pub fn delete_ports(&mut self, ports: &[LogicalPort]) -> Result<()> {
        info!(count = ports.len(), "deleting logical ports");
        let mut batch = self.nbctl()?.begin_batch();
        for port in ports {
            batch.run(nbctl::lsp_del(&port.name));
        }
        batch.commit_best_effort()?;
        Ok(())
    }

    /// Delete every router the northbound database lists, best effort.
    ///
    /// Returns how many were found.
    pub fn delete_routers(&mut self) -> Result<usize> {
        let client = self.nbctl()?;
        let listed = client.run_best_effort(nbctl::lr_list())?.unwrap_or_default();
        let names = nbctl::parse_list_names(&listed);
        info!(count = names.len(), "deleting logical routers");
        let mut batch = client.begin_batch();
        for name in &names {
            batch.run(nbctl::lr_del(name));
        }
        batch.commit_best_effort()?;
        Ok(names.len())
    }
}
