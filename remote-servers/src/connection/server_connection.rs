//! Connection to one remote server
//!
//! Owns the single runtime session of a server and drives deploy, undeploy
//! and refresh through it. Completions run on spawned tasks; nothing here
//! blocks waiting for the remote side.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::events::EventDispatcher;
use crate::connection::status::{AtomicStatus, ConnectionStatus};
use crate::deploy::debug::launch_debugger;
use crate::deploy::fsm::{DeploymentRecord, DeploymentStatus};
use crate::deploy::log_manager::{BufferedLoggingHandler, DeploymentLogManager, LoggingHandler};
use crate::deploy::registry::{DeploymentOrigin, DeploymentRegistry};
use crate::errors::ServerError;
use crate::models::deployment::DeploymentTask;
use crate::models::server::RemoteServer;
use crate::runtime::discovery::{self, DiscoverySink};
use crate::runtime::{DeploymentRuntime, ServerConnector, ServerRuntimeInstance};

/// Owner of connections that must forget one on explicit disconnect
pub trait ConnectionRegistry: Send + Sync {
    fn remove_connection(&self, server_id: &str);
}

type ConnectResult = Result<Arc<dyn ServerRuntimeInstance>, String>;

const REMOTE_PANIC: &str = "remote call panicked";

/// Returned once a deploy request has been handed to the server
#[derive(Debug)]
pub struct DeploymentStarted {
    pub deployment_name: String,

    /// Finishes after the server answered and the record was updated
    pub completion: JoinHandle<()>,
}

/// Where undeploy progress is written
enum UndeployLog {
    Deployment(Arc<BufferedLoggingHandler>),
    Diagnostic,
}

impl UndeployLog {
    fn emit(&self, message: &str) {
        match self {
            UndeployLog::Deployment(handler) => handler.println_system_message(message),
            UndeployLog::Diagnostic => info!("{}", message),
        }
    }
}

/// Connection state and deployments of one remote server
pub struct ServerConnection {
    server: RemoteServer,
    connector: Arc<dyn ServerConnector>,
    parent: Option<Weak<dyn ConnectionRegistry>>,
    events: Arc<EventDispatcher>,
    status: AtomicStatus,
    status_text: RwLock<Option<String>>,
    runtime_instance: RwLock<Option<Arc<dyn ServerRuntimeInstance>>>,
    /// `Some` while a connect attempt is in flight, holding its waiters
    pending_connect: Mutex<Option<Vec<oneshot::Sender<ConnectResult>>>>,
    deployments: DeploymentRegistry,
    log_managers: RwLock<HashMap<String, Arc<DeploymentLogManager>>>,
}

impl ServerConnection {
    /// Create a disconnected connection
    pub fn new(
        server: RemoteServer,
        connector: Arc<dyn ServerConnector>,
        parent: Option<Weak<dyn ConnectionRegistry>>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            server,
            connector,
            parent,
            events,
            status: AtomicStatus::new(ConnectionStatus::Disconnected),
            status_text: RwLock::new(None),
            runtime_instance: RwLock::new(None),
            pending_connect: Mutex::new(None),
            deployments: DeploymentRegistry::new(),
            log_managers: RwLock::new(HashMap::new()),
        }
    }

    pub fn server(&self) -> &RemoteServer {
        &self.server
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.load()
    }

    /// Last connect or refresh error, or the presentable status
    pub fn status_text(&self) -> String {
        self.read_status_text()
            .clone()
            .unwrap_or_else(|| self.status().presentable_text().to_string())
    }

    /// The live session, if connected
    pub fn runtime_instance(&self) -> Option<Arc<dyn ServerRuntimeInstance>> {
        self.read_instance().clone()
    }

    /// Bookkeeping of local and remote deployments
    pub fn deployment_registry(&self) -> &DeploymentRegistry {
        &self.deployments
    }

    // ============================== CONNECTION =============================== //

    /// Return the live session, connecting first if there is none.
    ///
    /// Concurrent callers share a single connect attempt.
    pub async fn ensure_connected(self: &Arc<Self>) -> Result<Arc<dyn ServerRuntimeInstance>, ServerError> {
        if let Some(instance) = self.runtime_instance() {
            return Ok(instance);
        }

        let (tx, rx) = oneshot::channel();
        let start_attempt = {
            let mut pending = self.pending_connect.lock().unwrap_or_else(|e| e.into_inner());
            // The attempt may have finished between the check above and the lock
            if let Some(instance) = self.runtime_instance() {
                return Ok(instance);
            }
            match pending.as_mut() {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    *pending = Some(vec![tx]);
                    true
                }
            }
        };

        if start_attempt {
            self.set_status(ConnectionStatus::Connecting);
            tokio::spawn(Arc::clone(self).run_connect_attempt());
        } else {
            debug!("Connect to {} already in progress, waiting", self.server.name);
        }

        match rx.await {
            Ok(Ok(instance)) => Ok(instance),
            Ok(Err(message)) => Err(ServerError::Connect(message)),
            Err(_) => Err(ServerError::Connect("connect attempt was abandoned".to_string())),
        }
    }

    async fn run_connect_attempt(self: Arc<Self>) {
        info!("Connecting to {}...", self.server.name);

        let result: ConnectResult = match catch_panic(self.connector.connect()).await {
            Ok(instance) => Ok(instance),
            Err(e) => Err(e.to_string()),
        };

        // Publishing the outcome and retiring the attempt happen under one
        // lock, so a caller that finds no session never joins a finished attempt
        let waiters = {
            let mut pending = self.pending_connect.lock().unwrap_or_else(|e| e.into_inner());
            match &result {
                Ok(instance) => {
                    *self.write_instance() = Some(instance.clone());
                    *self.write_status_text() = None;
                    self.set_status(ConnectionStatus::Connected);
                }
                Err(message) => {
                    *self.write_instance() = None;
                    *self.write_status_text() = Some(message.clone());
                    self.set_status(ConnectionStatus::Disconnected);
                }
            }
            pending.take().unwrap_or_default()
        };

        match &result {
            Ok(_) => info!("Connected to {}", self.server.name),
            Err(message) => warn!("Cannot connect to {}: {}", self.server.name, message),
        }
        for waiter in waiters {
            // A waiter that stopped listening needs no answer
            let _ = waiter.send(result.clone());
        }
    }

    /// Drop the current session and connect again.
    ///
    /// Completes whether or not the new attempt succeeds; the outcome is
    /// visible through [`status`](Self::status) and
    /// [`status_text`](Self::status_text).
    pub async fn connect(self: &Arc<Self>) {
        self.do_disconnect();
        if let Err(e) = self.ensure_connected().await {
            debug!("Reconnect to {} finished with error: {}", self.server.name, e);
        }
    }

    /// Forget this connection in its registry and close the session
    pub fn disconnect(&self) {
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.remove_connection(&self.server.id);
        }
        self.do_disconnect();
    }

    fn do_disconnect(&self) {
        let instance = self.write_instance().take();
        let had_session = instance.is_some();
        if let Some(instance) = instance {
            instance.disconnect();
            info!("Disconnected from {}", self.server.name);
        }
        if had_session || self.status() == ConnectionStatus::Connected {
            self.set_status(ConnectionStatus::Disconnected);
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status);
        self.events.queue_connection_status_changed(&self.server.id, status);
    }

    // ================================ DEPLOY ================================= //

    /// Start deploying a task.
    ///
    /// Returns as soon as the request was handed to the server. When the
    /// connection cannot be established no deployment record is created.
    pub async fn deploy(self: &Arc<Self>, task: DeploymentTask) -> Result<DeploymentStarted, ServerError> {
        let instance = self.ensure_connected().await?;
        let task = Arc::new(task);
        let name = instance.deployment_name(&task.source, &task.configuration);

        let record = Arc::new(DeploymentRecord::new(
            name.clone(),
            DeploymentStatus::Deploying,
            None,
            None,
            Some(task.clone()),
        ));
        self.deployments.insert_local(record.clone());

        let log_manager = Arc::new(self.new_log_manager(&name, &task.project));
        self.write_log_managers().insert(name.clone(), log_manager.clone());
        log_manager
            .main_handler()
            .println_system_message(&format!("Deploying '{name}'..."));
        self.events.queue_deployments_changed(&self.server.id);

        let completion = tokio::spawn(Arc::clone(self).finish_deploy(instance, task, record, log_manager));
        Ok(DeploymentStarted {
            deployment_name: name,
            completion,
        })
    }

    async fn finish_deploy(
        self: Arc<Self>,
        instance: Arc<dyn ServerRuntimeInstance>,
        task: Arc<DeploymentTask>,
        record: Arc<DeploymentRecord>,
        log_manager: Arc<DeploymentLogManager>,
    ) {
        let name = record.name().to_string();
        let handler = log_manager.main_handler();

        match catch_panic(instance.deploy(task.clone(), log_manager)).await {
            Ok(runtime) => {
                handler.println_system_message(&format!("'{name}' has been deployed successfully."));
                self.deployments.transition(
                    DeploymentOrigin::Local,
                    &record,
                    DeploymentStatus::Deploying,
                    DeploymentStatus::Deployed,
                    None,
                    Some(runtime.clone()),
                );
                self.events.queue_deployments_changed(&self.server.id);

                if let Some(connector) = &task.debug_connector {
                    launch_debugger(
                        connector.as_ref(),
                        runtime.as_ref(),
                        &task.execution_environment,
                        &self.server,
                        &*handler,
                    );
                }
            }
            Err(e) => {
                let message = e.to_string();
                handler.println_system_message(&format!("Failed to deploy '{name}': {message}"));
                // The failed record stays in the local map so the error remains visible
                self.deployments.transition(
                    DeploymentOrigin::Local,
                    &record,
                    DeploymentStatus::Deploying,
                    DeploymentStatus::NotDeployed,
                    Some(message),
                    None,
                );
                self.events.queue_deployments_changed(&self.server.id);
            }
        }
    }

    // =============================== UNDEPLOY ================================ //

    /// Start undeploying a deployment through its runtime handle.
    ///
    /// Works for deployments that are no longer tracked as well.
    pub fn undeploy(self: &Arc<Self>, deployment_name: &str, runtime: Arc<dyn DeploymentRuntime>) -> JoinHandle<()> {
        let name = deployment_name.to_string();
        let found = self.deployments.begin_undeploy(&name);
        self.events.queue_deployments_changed(&self.server.id);

        let log = match self.log_manager(&name) {
            Some(manager) => UndeployLog::Deployment(manager.main_handler()),
            None => UndeployLog::Diagnostic,
        };
        log.emit(&format!("Undeploying '{name}'..."));

        tokio::spawn(Arc::clone(self).finish_undeploy(name, runtime, found, log))
    }

    async fn finish_undeploy(
        self: Arc<Self>,
        name: String,
        runtime: Arc<dyn DeploymentRuntime>,
        found: Option<(Arc<DeploymentRecord>, DeploymentOrigin)>,
        log: UndeployLog,
    ) {
        match catch_panic(runtime.undeploy()).await {
            Ok(()) => {
                log.emit(&format!("'{name}' has been undeployed successfully."));
                if let Some((record, origin)) = &found {
                    if !self.deployments.finish_undeploy(*origin, record) {
                        debug!("'{}' changed while undeploying, keeping its record", name);
                    }
                }
                self.write_log_managers().remove(&name);
                self.events.queue_deployments_changed(&self.server.id);

                if let Some(instance) = self.runtime_instance() {
                    let connection = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _ = connection.refresh_with(instance).await;
                    });
                }
            }
            Err(e) => {
                let message = e.to_string();
                log.emit(&format!("Failed to undeploy '{name}': {message}"));
                if let Some((record, origin)) = &found {
                    self.deployments.transition(
                        *origin,
                        record,
                        DeploymentStatus::Undeploying,
                        DeploymentStatus::Deployed,
                        Some(message),
                        Some(runtime.clone()),
                    );
                }
                self.events.queue_deployments_changed(&self.server.id);
            }
        }
    }

    // ================================ REFRESH ================================ //

    /// Ask the server which deployments it has and replace the remote view.
    ///
    /// If the connection cannot be established the remote view is left alone.
    pub async fn compute_deployments(self: &Arc<Self>) -> Result<(), ServerError> {
        let instance = self.ensure_connected().await?;
        self.refresh_with(instance).await
    }

    async fn refresh_with(&self, instance: Arc<dyn ServerRuntimeInstance>) -> Result<(), ServerError> {
        let (sink, rx) = DiscoverySink::channel();
        let started = panic::catch_unwind(AssertUnwindSafe(|| instance.compute_deployments(sink))).is_ok();
        let enumeration = if started {
            discovery::collect(rx).await
        } else {
            Err(REMOTE_PANIC.to_string())
        };

        match enumeration {
            Ok(found) => {
                let count = found.len();
                self.deployments.replace_remote(
                    found
                        .into_iter()
                        .map(|(name, runtime)| Arc::new(DeploymentRecord::discovered(name, runtime))),
                );
                *self.write_status_text() = None;
                self.events.queue_deployments_changed(&self.server.id);
                debug!("{} reports {} deployments", self.server.name, count);
                Ok(())
            }
            Err(message) => {
                // Nothing the server said before is trusted any more
                self.deployments.clear_remote();
                *self.write_status_text() = Some(format!("Cannot obtain deployments: {message}"));
                self.events.queue_deployments_changed(&self.server.id);
                warn!("Cannot obtain deployments from {}: {}", self.server.name, message);
                Err(ServerError::Operation(message))
            }
        }
    }

    // ================================= READ ================================== //

    /// All known deployments, local ones shadowing remote ones, sorted by name
    pub fn get_deployments(&self) -> Vec<Arc<DeploymentRecord>> {
        self.deployments.deployments()
    }

    /// Look up one deployment, local first
    pub fn deployment(&self, name: &str) -> Option<Arc<DeploymentRecord>> {
        self.deployments.find(name).map(|(record, _)| record)
    }

    /// Logs of a deployment started by this process
    pub fn log_manager(&self, deployment_name: &str) -> Option<Arc<DeploymentLogManager>> {
        let log_managers = self.log_managers.read().unwrap_or_else(|e| e.into_inner());
        log_managers.get(deployment_name).cloned()
    }

    fn new_log_manager(&self, deployment_name: &str, project: &str) -> DeploymentLogManager {
        let events = self.events.clone();
        let server_id = self.server.id.clone();
        DeploymentLogManager::new(deployment_name, project, move || {
            events.queue_deployments_changed(&server_id);
        })
    }

    fn read_instance(&self) -> RwLockReadGuard<'_, Option<Arc<dyn ServerRuntimeInstance>>> {
        self.runtime_instance.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_instance(&self) -> RwLockWriteGuard<'_, Option<Arc<dyn ServerRuntimeInstance>>> {
        self.runtime_instance.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_status_text(&self) -> RwLockReadGuard<'_, Option<String>> {
        self.status_text.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_status_text(&self) -> RwLockWriteGuard<'_, Option<String>> {
        self.status_text.write().unwrap_or_else(|e| e.into_inner())
    }

    fn write_log_managers(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<DeploymentLogManager>>> {
        self.log_managers.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnection")
            .field("server", &self.server.id)
            .field("status", &self.status())
            .finish()
    }
}

/// Await a collaborator call, turning a panic into an operation error
async fn catch_panic<T, F>(future: F) -> Result<T, ServerError>
where
    F: Future<Output = Result<T, ServerError>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(ServerError::Operation(REMOTE_PANIC.to_string())),
    }
}
