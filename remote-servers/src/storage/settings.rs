//! Settings file management

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::ServerError;
use crate::filesys::file::File;
use crate::logs::{LogLevel, LogOptions};
use crate::models::server::RemoteServer;
use crate::workers::refresher;

/// Process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for rolling log files; stdout only when absent
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// Background refresh of remote deployments
    #[serde(default)]
    pub refresh: RefreshSettings,

    /// Configured remote servers
    #[serde(default)]
    pub servers: Vec<ServerSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: None,
            json_logs: false,
            refresh: RefreshSettings::default(),
            servers: Vec::new(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file, falling back to defaults when it does not exist
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let file = File::new(path.as_ref());
        if !file.exists().await {
            info!("No settings at {}, using defaults", file.path().display());
            return Ok(Self::default());
        }
        let settings: Settings = file.read_json().await?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate and write the settings as JSON
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ServerError> {
        self.validate()?;
        File::new(path.as_ref()).write_json(self).await
    }

    /// Logging options described by these settings
    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
            json_format: self.json_logs,
            ..Default::default()
        }
    }

    /// Reject settings that cannot describe a working set of servers
    pub fn validate(&self) -> Result<(), ServerError> {
        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            if server.id.is_empty() {
                return Err(ServerError::ConfigError("server id must not be empty".to_string()));
            }
            if !seen.insert(server.id.as_str()) {
                return Err(ServerError::ConfigError(format!("duplicate server id: {}", server.id)));
            }
        }
        if self.refresh.enabled && self.refresh.interval_secs == 0 {
            return Err(ServerError::ConfigError("refresh interval must be positive".to_string()));
        }
        Ok(())
    }

    /// Configured servers as runtime models
    pub fn remote_servers(&self) -> Vec<RemoteServer> {
        self.servers.iter().map(ServerSettings::to_remote_server).collect()
    }
}

/// Background refresh settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSettings {
    /// Run a refresher per server
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between refreshes
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,

    /// Seconds before the first refresh
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_initial_delay() -> u64 {
    5
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_refresh_interval(),
            initial_delay_secs: default_initial_delay(),
        }
    }
}

impl RefreshSettings {
    pub fn worker_options(&self) -> refresher::Options {
        refresher::Options {
            interval: Duration::from_secs(self.interval_secs),
            initial_delay: Duration::from_secs(self.initial_delay_secs),
        }
    }
}

/// One configured server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub id: String,

    /// Display name; the ID is used when empty
    #[serde(default)]
    pub name: String,

    /// Server type ID
    pub server_type: String,

    /// Free-form configuration handed to the server type
    #[serde(default)]
    pub configuration: serde_json::Value,
}

impl ServerSettings {
    pub fn to_remote_server(&self) -> RemoteServer {
        let name = if self.name.is_empty() { &self.id } else { &self.name };
        RemoteServer::new(self.id.clone(), name.clone(), self.server_type.clone())
            .with_configuration(self.configuration.clone())
    }
}
