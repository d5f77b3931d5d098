//! Error types for the lockstep environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A clock was asked to move backward (or by a non-finite amount)
    #[error("Clock step must be a finite, non-negative number of seconds, got {0}")]
    NegativeStep(f64),

    /// A step would carry virtual time past what `Duration`/`SystemTime` hold
    #[error("Clock step of {0} seconds overflows virtual time")]
    StepOverflow(f64),

    /// No transport factory is registered under the configured type
    #[error("Unknown transport type: {0}")]
    UnknownTransport(String),

    /// A point-to-point transport is already paired with another client
    #[error("Transport already linked to client '{0}'")]
    AlreadyLinked(String),

    /// The far side of the transport has been shut down
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    /// Parameter (de)serialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EnvError {
    /// Creates an unknown-transport error.
    pub fn unknown_transport(kind: impl Into<String>) -> Self {
        Self::UnknownTransport(kind.into())
    }

    /// Creates a transport-closed error.
    pub fn closed(endpoint: impl std::fmt::Display) -> Self {
        Self::TransportClosed(endpoint.to_string())
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
