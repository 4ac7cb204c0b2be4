//! # ovn-scale-core
//!
//! Synthetic OVN topologies at scale: deterministic addressing, switch,
//! router and port creation, gateway-router wiring, port binding and
//! convergence waits.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Scenario                          │
//! │  ScenarioContext   NameGenerator   MacGenerator          │
//! ├──────────────────────────────────────────────────────────┤
//! │  topology   create_switches / create_routers /           │
//! │             create_ports / connect_gateway_router / ...  │
//! │  sets       address sets / port groups                   │
//! │  binding    bind_ports / wait_ready / cleanup            │
//! │  workload   setup_datapaths / create_routed_network      │
//! └──────────────────────────────────────────────────────────┘
//!                           │ nbctl / vsctl / ssh
//!                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │           ClientMultiplexer (ovn-scale-exec)             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use ovn_scale_core::{DeploymentDescription, PortCreateArgs, Scenario, SwitchCreateArgs};
//! use ovn_scale_exec::SshConnector;
//!
//! let deployment = DeploymentDescription::load("deployment.json")?;
//! let mut scenario = Scenario::from_store(&deployment, Box::new(SshConnector), uuid::Uuid::new_v4(), 0)?;
//!
//! let mut switches = scenario.create_switches(&SwitchCreateArgs {
//!     amount: 5,
//!     batch: Some(2),
//!     start_cidr: Some("10.0.0.0/24".parse()?),
//!     ..Default::default()
//! })?;
//! let ports = scenario.create_ports(&mut switches[0], &PortCreateArgs::default())?;
//! scenario.clear();
//! ```

pub mod addressing;
mod args;
mod binding;
mod error;
mod mac;
mod model;
mod names;
mod nodes;
mod scenario;
mod sets;
mod store;
mod topology;
mod workload;

pub use args::{
    AclCreateArgs, DatapathArgs, NbctlDaemonArgs, NetworkCreateArgs, PortBindArgs, PortCreateArgs,
    RouterCreateArgs, SwitchCreateArgs,
};
pub use binding::{
    allocate_networks_on_sandboxes, assign_ports, slice_size, BoundPort, LogicalNetwork,
    SyncTarget, WaitPolicy,
};
pub use error::{Result, ScaleError};
pub use mac::{mac_string, MacGenerator};
pub use model::{GatewayTopologyUnit, LogicalPort, LogicalRouter, LogicalSwitch, Sandbox};
pub use names::NameGenerator;
pub use nodes::{plan_chassis_ips, ChassisIp, ChassisPlan, FarmPlan, OverflowPolicy, RunOptions};
pub use scenario::{Scenario, ScenarioContext};
pub use sets::port_addresses;
pub use store::{
    ControllerDescription, DeploymentDescription, DeploymentStore, FarmDescription,
    SandboxDescription, DEFAULT_CONTROLLER_SANDBOX,
};
pub use workload::{Datapaths, RoutedNetwork, RoutedNetworkArgs};
