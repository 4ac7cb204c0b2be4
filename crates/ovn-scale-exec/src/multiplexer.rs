//! Client multiplexer.
//!
//! Caches one [`CtlClient`] per (credential, kind) for the lifetime of a
//! scenario. Clients are created lazily on first use; [`ClientMultiplexer::clear`]
//! drops them all and with them their channels.

use crate::channel::Connector;
use crate::client::CtlClient;
use crate::credential::Credential;
use crate::error::{ExecError, Result};
use crate::install::ClientKind;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info};

/// Owns the batching clients of one scenario.
pub struct ClientMultiplexer {
    connector: Box<dyn Connector>,
    controller: Credential,
    farms: HashMap<String, Credential>,
    clients: HashMap<(Credential, ClientKind), CtlClient>,
}

impl ClientMultiplexer {
    /// Create a multiplexer for `controller` and the named `farms`.
    pub fn new(
        connector: Box<dyn Connector>,
        controller: Credential,
        farms: HashMap<String, Credential>,
    ) -> Self {
        Self {
            connector,
            controller,
            farms,
            clients: HashMap::new(),
        }
    }

    /// Credential of the controller node.
    pub fn controller(&self) -> &Credential {
        &self.controller
    }

    /// Credential of `farm`.
    pub fn farm(&self, farm: &str) -> Result<&Credential> {
        self.farms
            .get(farm)
            .ok_or_else(|| ExecError::UnknownFarm(farm.to_string()))
    }

    /// Client of `kind` on the controller.
    pub fn controller_client(&mut self, kind: ClientKind) -> Result<&mut CtlClient> {
        let credential = self.controller.clone();
        self.client_for(credential, kind)
    }

    /// Client of `kind` on `farm`.
    pub fn farm_client(&mut self, farm: &str, kind: ClientKind) -> Result<&mut CtlClient> {
        let credential = self.farm(farm)?.clone();
        self.client_for(credential, kind)
    }

    fn client_for(&mut self, credential: Credential, kind: ClientKind) -> Result<&mut CtlClient> {
        match self.clients.entry((credential, kind)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let channel = self.connector.open(&entry.key().0)?;
                debug!(endpoint = %channel.endpoint(), kind = %kind, "opened client");
                Ok(entry.insert(CtlClient::new(kind, channel)))
            }
        }
    }

    /// Number of cached clients.
    pub fn open_clients(&self) -> usize {
        self.clients.len()
    }

    /// Drop every cached client. Safe to call with none open.
    pub fn clear(&mut self) {
        if !self.clients.is_empty() {
            info!(clients = self.clients.len(), "releasing clients");
        }
        self.clients.clear();
    }
}

impl std::fmt::Debug for ClientMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMultiplexer")
            .field("controller", &self.controller)
            .field("farms", &self.farms.keys().collect::<Vec<_>>())
            .field("clients", &self.clients.len())
            .finish()
    }
}
