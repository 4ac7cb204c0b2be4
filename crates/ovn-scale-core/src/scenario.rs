//! Scenario state shared by topology and binding operations.
//!
//! A [`Scenario`] owns the client multiplexer for its lifetime together with
//! the name and MAC generators seeded from the task id. Topology and binding
//! operations are `impl Scenario` blocks in their own modules.

use crate::binding::BoundPort;
use crate::error::Result;
use crate::mac::MacGenerator;
use crate::model::Sandbox;
use crate::names::NameGenerator;
use crate::store::{DeploymentStore, DEFAULT_CONTROLLER_SANDBOX};
use ovn_scale_exec::{ClientKind, ClientMultiplexer, Connector, CtlClient, InstallMethod, Target};
use tracing::info;
use uuid::Uuid;

/// Per-task facts every operation may need.
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    /// Unique task id; seeds names and MACs.
    pub task_id: Uuid,
    /// Iteration counter, for deterministic fan-out.
    pub iteration: u32,
    /// How sandboxes are reached.
    pub install_method: InstallMethod,
    /// Sandbox holding the controller's databases.
    pub controller_sandbox: String,
    /// Container holding the controller's databases.
    pub controller_host_container: Option<String>,
    /// Control socket of a running nbctl daemon.
    pub daemon_socket: Option<String>,
    /// Every sandbox of the deployment.
    pub sandboxes: Vec<Sandbox>,
}

impl ScenarioContext {
    /// Context for `task_id` with direct addressing and no sandboxes.
    pub fn new(task_id: Uuid) -> Self {
        Self {
            task_id,
            iteration: 0,
            install_method: InstallMethod::default(),
            controller_sandbox: DEFAULT_CONTROLLER_SANDBOX.to_string(),
            controller_host_container: None,
            daemon_socket: None,
            sandboxes: Vec::new(),
        }
    }

    /// Set the install method.
    pub fn with_install_method(mut self, method: InstallMethod) -> Self {
        self.install_method = method;
        self
    }

    /// Set the sandboxes.
    pub fn with_sandboxes(mut self, sandboxes: Vec<Sandbox>) -> Self {
        self.sandboxes = sandboxes;
        self
    }

    /// Set the iteration.
    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = iteration;
        self
    }

    /// Addressing of controller clients of `kind`. Northbound commands
    /// carry the daemon socket on top of the install method's prefix.
    pub(crate) fn controller_target(&self, kind: ClientKind) -> Target {
        let socket = match kind {
            ClientKind::NbCtl => self.daemon_socket.as_deref(),
            _ => None,
        };
        Target::new(self.controller_sandbox.as_str(), self.install_method)
            .host_container(self.controller_host_container.as_deref())
            .daemon_socket(socket)
    }
}

/// A running scenario.
#[derive(Debug)]
pub struct Scenario {
    pub(crate) clients: ClientMultiplexer,
    pub(crate) names: NameGenerator,
    pub(crate) macs: MacGenerator,
    pub(crate) ctx: ScenarioContext,
    pub(crate) internal_ports: Vec<BoundPort>,
}

impl Scenario {
    /// Create a scenario over `clients`.
    pub fn new(clients: ClientMultiplexer, ctx: ScenarioContext) -> Self {
        Self {
            clients,
            names: NameGenerator::new(&ctx.task_id),
            macs: MacGenerator::from_task_id(&ctx.task_id),
            ctx,
            internal_ports: Vec::new(),
        }
    }

    /// Resolve credentials and sandboxes from `store` once.
    pub fn from_store(
        store: &dyn DeploymentStore,
        connector: Box<dyn Connector>,
        task_id: Uuid,
        iteration: u32,
    ) -> Result<Self> {
        let clients = ClientMultiplexer::new(
            connector,
            store.controller_credential()?,
            store.farm_credentials()?,
        );
        let (controller_sandbox, controller_host_container) = store.controller_sandbox();
        let ctx = ScenarioContext {
            controller_sandbox,
            controller_host_container,
            ..ScenarioContext::new(task_id)
                .with_install_method(store.install_method())
                .with_sandboxes(store.sandboxes(None)?)
                .with_iteration(iteration)
        };
        Ok(Self::new(clients, ctx))
    }

    /// Replace the MAC generator.
    pub fn with_mac_generator(mut self, macs: MacGenerator) -> Self {
        self.macs = macs;
        self
    }

    /// Replace the name generator.
    pub fn with_name_generator(mut self, names: NameGenerator) -> Self {
        self.names = names;
        self
    }

    /// Task context.
    pub fn context(&self) -> &ScenarioContext {
        &self.ctx
    }

    /// Advance to `iteration`.
    pub fn set_iteration(&mut self, iteration: u32) {
        self.ctx.iteration = iteration;
    }

    /// Internal ports bound so far, for pings and teardown.
    pub fn internal_ports(&self) -> &[BoundPort] {
        &self.internal_ports
    }

    /// The client multiplexer.
    pub fn clients(&mut self) -> &mut ClientMultiplexer {
        &mut self.clients
    }

    /// Controller client of `kind`, addressed at the controller sandbox.
    ///
    /// Northbound commands go through the nbctl daemon once one is running.
    pub fn controller(&mut self, kind: ClientKind) -> Result<&mut CtlClient> {
        let target = self.ctx.controller_target(kind);
        let client = self.clients.controller_client(kind)?;
        client.set_target(target);
        Ok(client)
    }

    /// Northbound client on the controller.
    pub fn nbctl(&mut self) -> Result<&mut CtlClient> {
        self.controller(ClientKind::NbCtl)
    }

    /// Farm client of `kind`, addressed at `sandbox`.
    pub fn sandbox_client(&mut self, sandbox: &Sandbox, kind: ClientKind) -> Result<&mut CtlClient> {
        let method = self.ctx.install_method;
        let client = self.clients.farm_client(&sandbox.farm, kind)?;
        client.set_sandbox(&sandbox.name, method, sandbox.host_container.as_deref());
        Ok(client)
    }

    /// Release every client. Call once when the scenario is done.
    pub fn clear(&mut self) {
        info!(task = %self.ctx.task_id, "scenario finished");
        self.clients.clear();
    }
}
