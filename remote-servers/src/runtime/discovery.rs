//! Push-style deployment enumeration

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::runtime::DeploymentRuntime;

/// One message of an enumeration
pub enum DiscoveryEvent {
    /// A deployment found on the server
    Deployment {
        name: String,
        runtime: Option<Arc<dyn DeploymentRuntime>>,
    },

    /// Enumeration finished, all deployments were reported
    Succeeded,

    /// Enumeration failed
    Failed(String),
}

impl fmt::Debug for DiscoveryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryEvent::Deployment { name, runtime } => f
                .debug_struct("Deployment")
                .field("name", name)
                .field("has_runtime", &runtime.is_some())
                .finish(),
            DiscoveryEvent::Succeeded => write!(f, "Succeeded"),
            DiscoveryEvent::Failed(message) => f.debug_tuple("Failed").field(message).finish(),
        }
    }
}

pub type DiscoveryReceiver = mpsc::UnboundedReceiver<DiscoveryEvent>;

/// Producer side of an enumeration.
///
/// The terminal calls consume the sink, so a session can finish an
/// enumeration at most once.
#[derive(Debug)]
pub struct DiscoverySink {
    tx: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl DiscoverySink {
    /// Create a sink and the receiver that collects its events
    pub fn channel() -> (Self, DiscoveryReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report a deployment without a runtime handle
    pub fn add_deployment(&self, name: impl Into<String>) {
        self.send(DiscoveryEvent::Deployment {
            name: name.into(),
            runtime: None,
        });
    }

    /// Report a deployment together with its runtime handle
    pub fn add_deployment_with_runtime(
        &self,
        name: impl Into<String>,
        runtime: Arc<dyn DeploymentRuntime>,
    ) {
        self.send(DiscoveryEvent::Deployment {
            name: name.into(),
            runtime: Some(runtime),
        });
    }

    pub fn succeeded(self) {
        self.send(DiscoveryEvent::Succeeded);
    }

    pub fn error_occurred(self, message: impl Into<String>) {
        self.send(DiscoveryEvent::Failed(message.into()));
    }

    fn send(&self, event: DiscoveryEvent) {
        // The receiver is gone when the refresh was abandoned; nothing to do
        let _ = self.tx.send(event);
    }
}

/// Drain an enumeration into its discovered deployments.
///
/// A sink dropped without a terminal event counts as a failure.
pub(crate) async fn collect(
    mut rx: DiscoveryReceiver,
) -> Result<Vec<(String, Option<Arc<dyn DeploymentRuntime>>)>, String> {
    let mut deployments = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            DiscoveryEvent::Deployment { name, runtime } => deployments.push((name, runtime)),
            DiscoveryEvent::Succeeded => return Ok(deployments),
            DiscoveryEvent::Failed(message) => return Err(message),
        }
    }
    Err("deployment enumeration ended without a result".to_string())
}
