//! Collaborator interfaces to the remote platform
//!
//! Everything that actually talks to a remote server lives behind these
//! traits. The connection layer only calls through them.

pub mod discovery;
pub mod types;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::deploy::log_manager::DeploymentLogManager;
use crate::errors::ServerError;
use crate::models::deployment::{DeploymentConfiguration, DeploymentSource, DeploymentTask};

pub use discovery::{DiscoveryEvent, DiscoveryReceiver, DiscoverySink};
pub use types::{ServerType, ServerTypeRegistry};

/// Establishes runtime sessions to one remote server
#[async_trait]
pub trait ServerConnector: Send + Sync {
    /// Connect to the server.
    ///
    /// Must eventually return; the connection layer has no timeout of its own.
    async fn connect(&self) -> Result<Arc<dyn ServerRuntimeInstance>, ServerError>;
}

/// A live session to a remote server
#[async_trait]
pub trait ServerRuntimeInstance: Send + Sync {
    /// Canonical deployment name for a source and configuration
    fn deployment_name(
        &self,
        source: &DeploymentSource,
        configuration: &DeploymentConfiguration,
    ) -> String;

    /// Deploy the task's source, writing progress to `log_manager`
    async fn deploy(
        &self,
        task: Arc<DeploymentTask>,
        log_manager: Arc<DeploymentLogManager>,
    ) -> Result<Arc<dyn DeploymentRuntime>, ServerError>;

    /// Enumerate the deployments present on the server.
    ///
    /// Push zero or more deployments into `sink`, then finish it with
    /// [`DiscoverySink::succeeded`] or [`DiscoverySink::error_occurred`].
    /// The work may continue on another task after this returns.
    fn compute_deployments(&self, sink: DiscoverySink);

    /// Close the session
    fn disconnect(&self);
}

/// Remote-side handle to a deployed artifact
#[async_trait]
pub trait DeploymentRuntime: Send + Sync {
    /// Remove the artifact from the server
    async fn undeploy(&self) -> Result<(), ServerError>;

    /// Access to the concrete type, used by debug connectors
    fn as_any(&self) -> &dyn Any;
}
