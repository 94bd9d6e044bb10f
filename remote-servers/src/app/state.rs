//! Application start-up and shutdown

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::connection::events::{EventDispatcher, EventReceiver};
use crate::connection::manager::ServerConnectionManager;
use crate::connection::server_connection::ServerConnection;
use crate::errors::ServerError;
use crate::runtime::ServerTypeRegistry;
use crate::workers::refresher;

/// Running connection manager with its background workers
pub struct App {
    manager: Arc<ServerConnectionManager>,
    shutdown_tx: broadcast::Sender<()>,
    worker_handles: Vec<JoinHandle<()>>,
    lifecycle: LifecycleOptions,
}

impl App {
    /// Create a connection per configured server and start the workers
    pub async fn start(options: AppOptions, types: ServerTypeRegistry) -> Result<Self, ServerError> {
        info!("Initializing remote server connections...");

        let manager = ServerConnectionManager::new(Arc::new(types), Arc::new(EventDispatcher::new()));
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        let mut worker_handles = Vec::new();
        for server in &options.servers {
            let connection = manager.get_or_create_connection(server)?;
            if options.enable_refresher {
                worker_handles.push(init_refresher_worker(
                    options.refresher.clone(),
                    connection,
                    shutdown_tx.subscribe(),
                ));
            }
        }

        info!(
            "Started {} connections, {} refresher workers",
            manager.len(),
            worker_handles.len()
        );

        Ok(Self {
            manager,
            shutdown_tx,
            worker_handles,
            lifecycle: options.lifecycle,
        })
    }

    pub fn manager(&self) -> &Arc<ServerConnectionManager> {
        &self.manager
    }

    /// Connection of a configured server
    pub fn connection(&self, server_id: &str) -> Option<Arc<ServerConnection>> {
        self.manager.connection(server_id)
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.manager.subscribe()
    }

    /// Stop the workers and disconnect every server
    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        info!("Shutting down remote server connections...");
        let _ = self.shutdown_tx.send(());

        let handles = std::mem::take(&mut self.worker_handles);
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let joined = tokio::time::timeout(self.lifecycle.max_shutdown_delay, join_all(handles)).await;

        let result = match joined {
            Ok(results) => results
                .into_iter()
                .find_map(|r| r.err())
                .map_or(Ok(()), |e| Err(ServerError::ShutdownError(e.to_string()))),
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, aborting workers...",
                    self.lifecycle.max_shutdown_delay
                );
                aborts.iter().for_each(|a| a.abort());
                Err(ServerError::ShutdownError("workers did not stop in time".to_string()))
            }
        };

        for connection in self.manager.connections() {
            connection.disconnect();
        }

        info!("Shutdown complete");
        result
    }
}

fn init_refresher_worker(
    options: refresher::Options,
    connection: Arc<ServerConnection>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    info!("Initializing refresher worker for {}...", connection.server().name);

    tokio::spawn(async move {
        refresher::run(
            &options,
            &connection,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    })
}
