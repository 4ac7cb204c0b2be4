//! # ovn-scale-exec
//!
//! Batched remote execution of OVN/OVS control commands.
//!
//! This crate turns logical control-plane commands into as few remote
//! invocations as possible, hiding how each sandbox is reached.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    ClientMultiplexer                     │
//! │        HashMap<(Credential, ClientKind), CtlClient>      │
//! └──────────────────────────────────────────────────────────┘
//!                           │ controller_client / farm_client
//!                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  CtlClient                                               │
//! │   - run()          immediate: one invocation per command │
//! │   - begin_batch()  buffered: one invocation per flush    │
//! │   - Target         sandbox.rc / docker exec / daemon     │
//! └──────────────────────────────────────────────────────────┘
//!                           │ rendered script
//!                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  RemoteExec (SshChannel, LocalShell, RecordingConnector) │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use ovn_scale_exec::{commands::nbctl, ClientKind, ClientMultiplexer, Credential, SshConnector};
//!
//! let mut mux = ClientMultiplexer::new(
//!     Box::new(SshConnector),
//!     Credential::new("root", "10.0.0.1"),
//!     Default::default(),
//! );
//! let nb = mux.controller_client(ClientKind::NbCtl)?;
//! let mut batch = nb.begin_batch();
//! batch.run(nbctl::ls_add("sw0"));
//! batch.run(nbctl::ls_add("sw1"));
//! batch.commit()?; // ovn-nbctl ls-add sw0 -- ls-add sw1
//! mux.clear();
//! ```

mod channel;
mod client;
pub mod commands;
mod credential;
mod error;
mod install;
mod multiplexer;
pub mod testing;

pub use channel::{
    check_status, Connector, ExecOutput, LocalConnector, LocalShell, RemoteExec, SshChannel,
    SshConnector,
};
pub use client::{BatchSession, CtlClient};
pub use commands::{quote, ColumnValue, Command, DbValue};
pub use credential::Credential;
pub use error::{ExecError, Result};
pub use install::{ClientKind, InstallMethod, Target, CENTRAL_CONTAINER};
pub use multiplexer::ClientMultiplexer;
