//! Error types for the Vigil monitor.
//!
//! Uses `thiserror` for public API error types: one enum for the monitor
//! itself, one for task actions, and one for configuration loading.

use std::path::PathBuf;

/// Errors raised by the monitor loop and its registration API.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("No task named '{0}'")]
    UnknownTask(String),

    #[error("Step {requested} is not after previous step {previous}")]
    NonMonotonicStep { previous: u64, requested: u64 },

    #[error("Invalid monitor state: {0}")]
    InvalidState(String),

    #[error("Monitor has been stopped")]
    Stopped,

    #[error("Task '{name}' failed: {source}")]
    Task {
        name: String,
        #[source]
        source: TaskError,
    },
}

impl MonitorError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Name of the failing task, if this error came from a task action.
    pub fn task_name(&self) -> Option<&str> {
        match self {
            Self::Task { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Errors raised by a task's action.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Checkpoint at {path} is corrupt: {reason}")]
    CorruptCheckpoint { path: PathBuf, reason: String },

    #[error("Summary writer error: {0}")]
    Summary(String),

    #[error("{0}")]
    Failed(String),
}

impl TaskError {
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Errors raised while loading or interpreting configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid task spec '{name}': {reason}")]
    InvalidTask { name: String, reason: String },

    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Convenience result alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
