//! Remote server models

use serde::{Deserialize, Serialize};

/// A configured remote deployment target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteServer {
    /// Stable server ID, unique across the manager
    pub id: String,

    /// Display name
    pub name: String,

    /// ID of the server type that provides the connector
    pub server_type: String,

    /// Type-specific configuration, interpreted by the server type only
    #[serde(default)]
    pub configuration: serde_json::Value,
}

impl RemoteServer {
    /// Create a server with an empty configuration
    pub fn new(id: impl Into<String>, name: impl Into<String>, server_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            server_type: server_type.into(),
            configuration: serde_json::Value::Null,
        }
    }

    /// Attach a type-specific configuration
    pub fn with_configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = configuration;
        self
    }
}
