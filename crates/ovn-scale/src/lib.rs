//! # ovn-scale
//!
//! Drives the routed-network workload against an OVN sandbox deployment.
//!
//! ## Quick Start
//!
//! ```bash
//! export OVN_SCALE_DEPLOYMENT=/etc/ovn-scale/deployment.json
//! export OVN_SCALE_TASK=/etc/ovn-scale/task.json
//! export OVN_SCALE_ITERATIONS=10
//! cargo run -p ovn-scale
//! ```
//!
//! ## Task File
//!
//! | Key | Description |
//! |-----|-------------|
//! | `datapaths` | Routers and switches shared by all iterations |
//! | `nbctl_daemon` | Optional persistent nbctl daemon |
//! | `routed_network` | Per-iteration switches, gateways, ports and binding |
//! | `acls` | Optional ACLs on every created port, plus the address set they match on |
//! | `cleanup` | Tear everything down afterwards (default: true) |

mod config;
mod task;

pub use config::{ConfigError, ScaleConfig, Transport};
pub use task::{run_task, TaskDescription, TaskReport};
