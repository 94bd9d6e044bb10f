//! Per-deployment logs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Free-form text output for a deployment
pub trait LoggingHandler: Send + Sync {
    /// Append raw text
    fn print(&self, text: &str);

    /// Append a line produced by the connection layer itself
    fn println_system_message(&self, text: &str);
}

/// Kind of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEntryKind {
    System,
    Output,
}

/// One buffered log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub kind: LogEntryKind,
    pub text: String,
}

/// In-memory log that mirrors system messages to `tracing`
pub struct BufferedLoggingHandler {
    deployment: String,
    log_name: String,
    entries: RwLock<Vec<LogEntry>>,
}

impl BufferedLoggingHandler {
    pub fn new(deployment: impl Into<String>, log_name: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            log_name: log_name.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    /// All lines written so far
    pub fn entries(&self) -> Vec<LogEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.clone()
    }

    /// Buffered text of the log
    pub fn text(&self) -> String {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().map(|e| e.text.as_str()).collect()
    }

    fn push(&self, kind: LogEntryKind, text: String) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push(LogEntry {
            at: Utc::now(),
            kind,
            text,
        });
    }
}

impl LoggingHandler for BufferedLoggingHandler {
    fn print(&self, text: &str) {
        self.push(LogEntryKind::Output, text.to_string());
    }

    fn println_system_message(&self, text: &str) {
        info!(deployment = %self.deployment, log = %self.log_name, "{}", text);
        self.push(LogEntryKind::System, format!("{text}\n"));
    }
}

impl fmt::Debug for BufferedLoggingHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedLoggingHandler")
            .field("deployment", &self.deployment)
            .field("log_name", &self.log_name)
            .finish()
    }
}

type ChangeListener = Box<dyn Fn() + Send + Sync>;

/// Logs owned by one deployment: a main log plus named additional logs
pub struct DeploymentLogManager {
    deployment: String,
    project: String,
    main: Arc<BufferedLoggingHandler>,
    additional: RwLock<BTreeMap<String, Arc<BufferedLoggingHandler>>>,
    on_change: ChangeListener,
}

impl DeploymentLogManager {
    /// `on_change` runs whenever the set of logs changes
    pub fn new(
        deployment: impl Into<String>,
        project: impl Into<String>,
        on_change: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let deployment = deployment.into();
        Self {
            main: Arc::new(BufferedLoggingHandler::new(deployment.clone(), "main")),
            deployment,
            project: project.into(),
            additional: RwLock::new(BTreeMap::new()),
            on_change: Box::new(on_change),
        }
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn main_handler(&self) -> Arc<BufferedLoggingHandler> {
        self.main.clone()
    }

    /// Open a named log next to the main one, or return the existing one
    pub fn add_additional_log(&self, name: &str) -> Arc<BufferedLoggingHandler> {
        let handler = {
            let mut additional = self.additional.write().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = additional.get(name) {
                return existing.clone();
            }
            let handler = Arc::new(BufferedLoggingHandler::new(self.deployment.clone(), name));
            additional.insert(name.to_string(), handler.clone());
            handler
        };
        (self.on_change)();
        handler
    }

    /// Additional logs, sorted by name
    pub fn additional_logs(&self) -> Vec<Arc<BufferedLoggingHandler>> {
        let additional = self.additional.read().unwrap_or_else(|e| e.into_inner());
        additional.values().cloned().collect()
    }
}

impl fmt::Debug for DeploymentLogManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentLogManager")
            .field("deployment", &self.deployment)
            .field("project", &self.project)
            .finish()
    }
}
