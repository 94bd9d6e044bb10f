//! Application configuration options

use std::time::Duration;

use crate::models::server::RemoteServer;
use crate::storage::settings::Settings;
use crate::workers::refresher;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Servers to create connections for
    pub servers: Vec<RemoteServer>,

    /// Enable a refresher worker per server
    pub enable_refresher: bool,

    /// Refresher worker options
    pub refresher: refresher::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            servers: Vec::new(),
            enable_refresher: true,
            refresher: refresher::Options::default(),
        }
    }
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            servers: settings.remote_servers(),
            enable_refresher: settings.refresh.enabled,
            refresher: settings.refresh.worker_options(),
            ..Default::default()
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}
