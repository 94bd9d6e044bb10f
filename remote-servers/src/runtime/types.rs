//! Server types and their registry

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::errors::ServerError;
use crate::models::server::RemoteServer;
use crate::runtime::ServerConnector;

/// A kind of remote server that knows how to connect to its instances
pub trait ServerType: Send + Sync {
    /// Stable identifier referenced by [`RemoteServer::server_type`]
    fn id(&self) -> &str;

    /// Human readable name
    fn presentable_name(&self) -> &str {
        self.id()
    }

    /// Build a connector for one configured server
    fn create_connector(&self, server: &RemoteServer) -> Result<Arc<dyn ServerConnector>, ServerError>;
}

/// Server types available to the process, keyed by type ID.
///
/// Populated once at start-up.
#[derive(Default)]
pub struct ServerTypeRegistry {
    types: HashMap<String, Arc<dyn ServerType>>,
}

impl ServerTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server type, replacing any type with the same ID
    pub fn register<T: ServerType + 'static>(&mut self, server_type: T) {
        let id = server_type.id().to_string();
        debug!("Registering server type: {}", id);
        self.types.insert(id, Arc::new(server_type));
    }

    /// Look up a server type by ID
    pub fn get(&self, id: &str) -> Option<Arc<dyn ServerType>> {
        self.types.get(id).cloned()
    }

    /// Create the connector for a configured server
    pub fn create_connector(&self, server: &RemoteServer) -> Result<Arc<dyn ServerConnector>, ServerError> {
        let server_type = self
            .get(&server.server_type)
            .ok_or_else(|| ServerError::UnknownServerType(server.server_type.clone()))?;
        server_type.create_connector(server)
    }

    /// Registered type IDs, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.types.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
