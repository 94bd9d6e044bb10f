//! Connection event queueing
//!
//! Mutating code queues events and returns immediately. Each subscriber
//! owns an unbounded queue, so events are seen in the order they were
//! queued and none are dropped.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::status::ConnectionStatus;

/// Something observers of a connection may want to react to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    StatusChanged {
        server_id: String,
        status: ConnectionStatus,
    },
    DeploymentsChanged {
        server_id: String,
    },
}

impl ConnectionEvent {
    pub fn server_id(&self) -> &str {
        match self {
            ConnectionEvent::StatusChanged { server_id, .. } => server_id,
            ConnectionEvent::DeploymentsChanged { server_id } => server_id,
        }
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Fans connection events out to subscribers
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ConnectionEvent>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event queued from now on
    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.push(tx);
        rx
    }

    pub fn queue_connection_status_changed(&self, server_id: &str, status: ConnectionStatus) {
        self.queue(ConnectionEvent::StatusChanged {
            server_id: server_id.to_string(),
            status,
        });
    }

    pub fn queue_deployments_changed(&self, server_id: &str) {
        self.queue(ConnectionEvent::DeploymentsChanged {
            server_id: server_id.to_string(),
        });
    }

    pub fn subscriber_count(&self) -> usize {
        let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.len()
    }

    fn queue(&self, event: ConnectionEvent) {
        debug!("Queueing {:?}", event);
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        // Receivers that were dropped unsubscribe here
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
