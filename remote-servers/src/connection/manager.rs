//! Connections of all configured servers

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, info};

use crate::connection::events::{EventDispatcher, EventReceiver};
use crate::connection::server_connection::{ConnectionRegistry, ServerConnection};
use crate::errors::ServerError;
use crate::models::server::RemoteServer;
use crate::runtime::ServerTypeRegistry;

/// Keeps exactly one connection per server ID
pub struct ServerConnectionManager {
    types: Arc<ServerTypeRegistry>,
    events: Arc<EventDispatcher>,
    connections: RwLock<HashMap<String, Arc<ServerConnection>>>,
}

impl ServerConnectionManager {
    pub fn new(types: Arc<ServerTypeRegistry>, events: Arc<EventDispatcher>) -> Arc<Self> {
        Arc::new(Self {
            types,
            events,
            connections: RwLock::new(HashMap::new()),
        })
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    /// Subscribe to events of every connection of this manager
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The existing connection for `server`, or a new disconnected one
    pub fn get_or_create_connection(
        self: &Arc<Self>,
        server: &RemoteServer,
    ) -> Result<Arc<ServerConnection>, ServerError> {
        if let Some(existing) = self.connection(&server.id) {
            return Ok(existing);
        }

        let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = connections.get(&server.id) {
            return Ok(existing.clone());
        }

        let connector = self.types.create_connector(server)?;
        let weak: Weak<Self> = Arc::downgrade(self);
        let parent: Weak<dyn ConnectionRegistry> = weak;
        let connection = Arc::new(ServerConnection::new(
            server.clone(),
            connector,
            Some(parent),
            self.events.clone(),
        ));
        connections.insert(server.id.clone(), connection.clone());
        info!("Created connection for {} ({})", server.name, server.server_type);
        Ok(connection)
    }

    /// The connection for a server ID, if one was created
    pub fn connection(&self, server_id: &str) -> Option<Arc<ServerConnection>> {
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        connections.get(server_id).cloned()
    }

    /// All connections, sorted by server ID
    pub fn connections(&self) -> Vec<Arc<ServerConnection>> {
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        let mut result: Vec<Arc<ServerConnection>> = connections.values().cloned().collect();
        result.sort_by(|a, b| a.server().id.cmp(&b.server().id));
        result
    }

    pub fn len(&self) -> usize {
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConnectionRegistry for ServerConnectionManager {
    fn remove_connection(&self, server_id: &str) {
        let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
        if connections.remove(server_id).is_some() {
            debug!("Removed connection for {}", server_id);
        }
    }
}
