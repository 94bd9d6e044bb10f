//! Deployment models

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::deploy::debug::DebugConnector;

/// The artifact being deployed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSource {
    /// Artifact name, e.g. `app.war` or an image reference
    pub name: String,

    /// Local path of the artifact, if it lives on disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl DeploymentSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }
}

/// Per-deployment settings chosen by the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfiguration {
    /// Name override for the deployment; the runtime may ignore it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,

    /// Type-specific settings
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// Execution context handed to the debugger launcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    /// Executor that started the deployment (run, debug, ...)
    pub executor_id: String,

    /// Name of the run profile that started the deployment
    pub profile_name: String,
}

/// A deploy request issued by this process
#[derive(Clone)]
pub struct DeploymentTask {
    /// Project the deployment belongs to
    pub project: String,

    pub source: DeploymentSource,

    pub configuration: DeploymentConfiguration,

    pub execution_environment: ExecutionEnvironment,

    /// Set when the deployment should be debugged once it is up
    pub debug_connector: Option<Arc<dyn DebugConnector>>,
}

impl DeploymentTask {
    /// Create a task without a debug connector
    pub fn new(
        project: impl Into<String>,
        source: DeploymentSource,
        configuration: DeploymentConfiguration,
    ) -> Self {
        Self {
            project: project.into(),
            source,
            configuration,
            execution_environment: ExecutionEnvironment::default(),
            debug_connector: None,
        }
    }

    /// Request a debug session once the deployment succeeds
    pub fn with_debugger(
        mut self,
        connector: Arc<dyn DebugConnector>,
        environment: ExecutionEnvironment,
    ) -> Self {
        self.debug_connector = Some(connector);
        self.execution_environment = environment;
        self
    }

    /// Whether a debug session was requested
    pub fn is_debug(&self) -> bool {
        self.debug_connector.is_some()
    }
}

impl fmt::Debug for DeploymentTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentTask")
            .field("project", &self.project)
            .field("source", &self.source)
            .field("configuration", &self.configuration)
            .field("execution_environment", &self.execution_environment)
            .field("debug", &self.is_debug())
            .finish()
    }
}
