//! Error types for the lockstep harness.

use lockstep_core::CoreError;
use lockstep_env::EnvError;
use thiserror::Error;

/// Fatal controller startup failures.
///
/// These are test-infrastructure failures: the harness aborts setup instead
/// of continuing with a half-built controller.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The controller rejected its configuration
    #[error("Controller configuration failed to load: {0}")]
    Config(#[source] CoreError),

    /// Real BCP servers were requested in a harness run
    #[error("Controller options request real BCP servers (bcp = true); the harness requires bcp = false")]
    RealServersRequested,

    /// The controller built no UI root
    #[error("Controller built no UI root (root_widget is not configured)")]
    MissingRoot,

    /// No window-equivalent stand-in could be created
    #[error("No window is created: neither `window` nor `displays.window` is configured")]
    MissingWindow,

    /// The controller never reported initialization complete
    #[error("Controller initialization not complete after {cycles} idle cycles")]
    InitTimeout { cycles: u32 },

    /// The host has no endpoint for the controller's connection
    #[error("Host has no BCP client named '{0}' to pair with the controller")]
    HostEndpointMissing(String),

    /// An idle pass failed during startup
    #[error("Controller idle pass failed during startup: {0}")]
    Idle(#[source] CoreError),
}

/// Event assertion failures.
///
/// `NotObserved` signals a test-authoring mistake; the other variants are
/// behavioral failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    /// The event was never registered with `observe`
    #[error("Event {0} not mocked.")]
    NotObserved(String),

    /// Expected at least one firing, saw none
    #[error("Event {event} was not called.")]
    NotCalled { event: String },

    /// Expected no firing
    #[error("Event {event} was called {observed} times.")]
    CalledUnexpectedly { event: String, observed: u32 },

    /// Expected an exact count
    #[error("Event {event} was called {observed} instead of {expected}.")]
    CountMismatch {
        event: String,
        observed: u32,
        expected: u32,
    },
}

impl RecorderError {
    /// Returns true if this is a test-authoring mistake rather than a count failure.
    pub fn is_not_observed(&self) -> bool {
        matches!(self, RecorderError::NotObserved(_))
    }
}

/// Errors raised by the harness itself.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Controller startup failed
    #[error("Harness setup failed: {0}")]
    Setup(#[from] BootstrapError),

    /// Harness configuration is unusable
    #[error("Invalid harness configuration: {0}")]
    Config(String),

    /// A pump tick was issued while another tick was still running
    #[error("Controller pump tick re-entered while a tick was running")]
    ReentrantTick,

    /// The pump was started twice
    #[error("Controller pump is already running")]
    PumpAlreadyRunning,

    /// Host or controller failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Clock or transport failure
    #[error(transparent)]
    Env(#[from] EnvError),

    /// Event assertion failure
    #[error(transparent)]
    Assertion(#[from] RecorderError),

    /// Config file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
