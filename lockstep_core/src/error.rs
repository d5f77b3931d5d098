//! Error types for the host and controller subsystems.

use lockstep_env::EnvError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the host scheduler, host BCP interface and controller.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration is unusable as given
    #[error("Configuration error: {0}")]
    Config(String),

    /// Periodic work needs a strictly positive period
    #[error("Interval must be positive, got {0:?}")]
    InvalidInterval(Duration),

    /// The controller's event loop has been closed at teardown
    #[error("Event loop is closed")]
    EventLoopClosed,

    /// No BCP client is registered under this name
    #[error("Unknown BCP client: {0}")]
    UnknownClient(String),

    /// A scheduled task reported a failure
    #[error("Task '{task}' failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<CoreError>,
    },

    /// Failure reported from inside a task body
    #[error("{0}")]
    Task(String),

    /// Clock or transport failure
    #[error(transparent)]
    Env(#[from] EnvError),
}

impl CoreError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a task-body error.
    pub fn task(msg: impl std::fmt::Display) -> Self {
        Self::Task(msg.to_string())
    }
}
