//! Transport abstraction between the host and the controller.

use crate::error::EnvError;
use crate::types::BcpMessage;

/// The two independent message directions of a host/controller link.
///
/// Ordering is guaranteed per direction only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Messages produced by the host, consumed by the controller
    HostToController,

    /// Messages produced by the controller, consumed by the host
    ControllerToHost,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Direction::HostToController => Direction::ControllerToHost,
            Direction::ControllerToHost => Direction::HostToController,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::HostToController => write!(f, "host->controller"),
            Direction::ControllerToHost => write!(f, "controller->host"),
        }
    }
}

/// One side of a BCP link.
///
/// # Implementations
///
/// - **Production**: a socket client speaking the wire protocol
/// - **Harness**: `BridgeEndpoint`, backed by in-memory FIFO queues
///
/// # Message Flow
///
/// ```text
/// Host endpoint               Bridge               Controller endpoint
///   |                           |                          |
///   |-- send(msg) ------------->|                          |
///   |                           |<------ try_recv() -------|
///   |                           |------- msg ------------->|
/// ```
pub trait TransportEndpoint: Send + Sync + 'static {
    /// Queues a message for the other side.
    ///
    /// # Returns
    /// * `Ok(())` - Message queued
    /// * `Err(EnvError::TransportClosed)` - The endpoint can no longer send
    fn send(&self, message: BcpMessage) -> Result<(), EnvError>;

    /// Takes the next inbound message, if any. Never blocks.
    fn try_recv(&self) -> Option<BcpMessage>;

    /// Takes every pending inbound message, oldest first.
    fn drain(&self) -> Vec<BcpMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Returns the endpoint's name (for logging).
    fn name(&self) -> &str;
}
