//! Debug session start-up after a successful deploy

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::deploy::log_manager::LoggingHandler;
use crate::errors::ServerError;
use crate::models::deployment::ExecutionEnvironment;
use crate::models::server::RemoteServer;
use crate::runtime::DeploymentRuntime;

/// Where a debugger should attach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugConnectionData {
    pub host: String,
    pub port: u16,

    /// Launcher specific extras
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Extracts debug connection data from a deployed artifact
pub trait DebugConnector: Send + Sync {
    /// Fails with [`ServerError::DebugDataUnavailable`] when the runtime
    /// cannot be debugged
    fn connection_data(&self, runtime: &dyn DeploymentRuntime) -> Result<DebugConnectionData, ServerError>;

    fn launcher(&self) -> Arc<dyn DebugLauncher>;
}

/// Starts the actual debugger process
pub trait DebugLauncher: Send + Sync {
    /// Fails with [`ServerError::DebugLaunch`] when the debugger cannot start
    fn start_debug_session(
        &self,
        data: &DebugConnectionData,
        environment: &ExecutionEnvironment,
        server: &RemoteServer,
    ) -> Result<(), ServerError>;
}

/// Start a debug session for a freshly deployed runtime.
///
/// Failures are written to the deployment log and otherwise ignored.
pub fn launch_debugger(
    connector: &dyn DebugConnector,
    runtime: &dyn DeploymentRuntime,
    environment: &ExecutionEnvironment,
    server: &RemoteServer,
    log: &dyn LoggingHandler,
) {
    let data = match connector.connection_data(runtime) {
        Ok(data) => data,
        Err(e) => {
            log.print(&format!("{}\n", as_debug_error(e, ServerError::DebugDataUnavailable)));
            info!("Debug connection data unavailable for {}", server.name);
            return;
        }
    };

    match connector.launcher().start_debug_session(&data, environment, server) {
        Ok(()) => info!("Debug session started on {}:{} for {}", data.host, data.port, server.name),
        Err(e) => {
            log.print(&format!("{}\n", as_debug_error(e, ServerError::DebugLaunch)));
            info!("Debugger launch failed for {}", server.name);
        }
    }
}

// Collaborators may report plain errors; give them the debug prefix
fn as_debug_error(err: ServerError, wrap: fn(String) -> ServerError) -> ServerError {
    match err {
        ServerError::DebugDataUnavailable(_) | ServerError::DebugLaunch(_) => err,
        other => wrap(other.detail()),
    }
}
