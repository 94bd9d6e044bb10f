//! Deployment record and its guarded state machine

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::deployment::DeploymentTask;
use crate::runtime::DeploymentRuntime;

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Deploy request sent, waiting for the server
    Deploying,

    /// Present on the server
    Deployed,

    /// Undeploy request sent, waiting for the server
    Undeploying,

    /// Not present on the server
    NotDeployed,
}

impl DeploymentStatus {
    pub fn presentable_text(&self) -> &'static str {
        match self {
            DeploymentStatus::Deploying => "Deploying",
            DeploymentStatus::Deployed => "Deployed",
            DeploymentStatus::Undeploying => "Undeploying",
            DeploymentStatus::NotDeployed => "Not deployed",
        }
    }

    /// Whether an operation on the server is still running
    pub fn is_transition(&self) -> bool {
        matches!(self, DeploymentStatus::Deploying | DeploymentStatus::Undeploying)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.presentable_text())
    }
}

struct RecordState {
    status: DeploymentStatus,
    error_message: Option<String>,
    runtime: Option<Arc<dyn DeploymentRuntime>>,
    updated_at: DateTime<Utc>,
}

/// Consistent point-in-time view of a record
#[derive(Clone)]
pub struct DeploymentSnapshot {
    pub name: String,
    pub status: DeploymentStatus,
    pub error_message: Option<String>,
    pub runtime: Option<Arc<dyn DeploymentRuntime>>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for DeploymentSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentSnapshot")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("error_message", &self.error_message)
            .field("has_runtime", &self.runtime.is_some())
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Bookkeeping for one deployment on one connection
pub struct DeploymentRecord {
    name: String,
    task: Option<Arc<DeploymentTask>>,
    state: Mutex<RecordState>,
}

impl DeploymentRecord {
    pub fn new(
        name: impl Into<String>,
        status: DeploymentStatus,
        error_message: Option<String>,
        runtime: Option<Arc<dyn DeploymentRuntime>>,
        task: Option<Arc<DeploymentTask>>,
    ) -> Self {
        Self {
            name: name.into(),
            task,
            state: Mutex::new(RecordState {
                status,
                error_message,
                runtime,
                updated_at: Utc::now(),
            }),
        }
    }

    /// A deployment reported by the server
    pub fn discovered(name: impl Into<String>, runtime: Option<Arc<dyn DeploymentRuntime>>) -> Self {
        Self::new(name, DeploymentStatus::Deployed, None, runtime, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The deploy request this record was created for; `None` for discovered deployments
    pub fn task(&self) -> Option<&Arc<DeploymentTask>> {
        self.task.as_ref()
    }

    pub fn status(&self) -> DeploymentStatus {
        self.lock().status
    }

    pub fn error_message(&self) -> Option<String> {
        self.lock().error_message.clone()
    }

    pub fn runtime(&self) -> Option<Arc<dyn DeploymentRuntime>> {
        self.lock().runtime.clone()
    }

    /// Read status, error and runtime together
    pub fn snapshot(&self) -> DeploymentSnapshot {
        let state = self.lock();
        DeploymentSnapshot {
            name: self.name.clone(),
            status: state.status,
            error_message: state.error_message.clone(),
            runtime: state.runtime.clone(),
            updated_at: state.updated_at,
        }
    }

    /// Move from `expected` to `new`, replacing the error and runtime.
    ///
    /// Returns `false` and leaves the record untouched when the current
    /// status is not `expected`.
    pub fn change_state(
        &self,
        expected: DeploymentStatus,
        new: DeploymentStatus,
        error_message: Option<String>,
        runtime: Option<Arc<dyn DeploymentRuntime>>,
    ) -> bool {
        let mut state = self.lock();
        if state.status != expected {
            return false;
        }
        state.status = new;
        state.error_message = error_message;
        state.runtime = runtime;
        state.updated_at = Utc::now();
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for DeploymentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("DeploymentRecord")
            .field("name", &self.name)
            .field("status", &state.status)
            .field("error_message", &state.error_message)
            .field("local", &self.task.is_some())
            .finish()
    }
}
