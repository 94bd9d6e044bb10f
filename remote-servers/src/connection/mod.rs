//! Remote server connections

pub mod events;
pub mod manager;
pub mod server_connection;
pub mod status;

pub use events::{ConnectionEvent, EventDispatcher, EventReceiver};
pub use manager::ServerConnectionManager;
pub use server_connection::{ConnectionRegistry, DeploymentStarted, ServerConnection};
pub use status::ConnectionStatus;
