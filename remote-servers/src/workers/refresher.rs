//! Periodic refresh of the deployments reported by a server

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::connection::server_connection::ServerConnection;

/// Refresher worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Refresh interval
    pub interval: Duration,

    /// Initial delay before the first refresh
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Run the refresher worker for one connection
pub async fn run<S, F>(
    options: &Options,
    connection: &Arc<ServerConnection>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let server = connection.server().name.clone();
    info!("Refresher worker starting for {}...", server);

    let mut delay = options.initial_delay;
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Refresher worker for {} shutting down...", server);
                return;
            }
            _ = sleep_fn(delay) => {
                // Continue with refresh
            }
        }
        delay = options.interval;

        debug!("Refreshing deployments of {}...", server);
        match connection.compute_deployments().await {
            Ok(()) => {
                debug!("Deployments of {} refreshed", server);
            }
            Err(e) => {
                warn!("Refresh of {} failed: {}", server, e);
            }
        }
    }
}
