//! Remote Servers
//!
//! Connection and deployment lifecycle management for remote deployment
//! targets. The actual protocol to a server lives behind the traits in
//! [`runtime`]; this crate tracks connection status, drives deploy and
//! undeploy through a live session and keeps the merged view of local and
//! remote deployments consistent while operations run concurrently.

pub mod app;
pub mod connection;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod runtime;
pub mod storage;
pub mod workers;

pub use connection::{ConnectionEvent, ConnectionStatus, ServerConnection, ServerConnectionManager};
pub use deploy::fsm::{DeploymentRecord, DeploymentStatus};
pub use errors::ServerError;
