//! Error types for remote server connections

use thiserror::Error;

/// Main error type for remote server connections and deployments
#[derive(Error, Debug)]
pub enum ServerError {
    /// The connector could not establish a runtime session.
    /// Displays as the bare message so it can be shown as status text.
    #[error("{0}")]
    Connect(String),

    /// A deploy, undeploy or refresh did not take effect on the server
    #[error("{0}")]
    Operation(String),

    #[error("Cannot retrieve debug connection: {0}")]
    DebugDataUnavailable(String),

    #[error("Cannot start debugger: {0}")]
    DebugLaunch(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown server type: {0}")]
    UnknownServerType(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// The message without the variant's display prefix
    pub fn detail(&self) -> String {
        match self {
            ServerError::Connect(m)
            | ServerError::Operation(m)
            | ServerError::DebugDataUnavailable(m)
            | ServerError::DebugLaunch(m)
            | ServerError::ConfigError(m)
            | ServerError::UnknownServerType(m)
            | ServerError::NotFound(m)
            | ServerError::ShutdownError(m)
            | ServerError::Internal(m) => m.clone(),
            ServerError::IoError(e) => e.to_string(),
            ServerError::JsonError(e) => e.to_string(),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}
