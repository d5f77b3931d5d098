//! Common types for the lockstep environment abstraction.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Named BCP parameters (`parameters: mapping<string, value>`).
pub type Params = serde_json::Map<String, Value>;

/// Acknowledgement hook carried by a message.
///
/// The receiver invokes it synchronously right after processing the
/// message that carries it.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Unique identifier for one harness session.
///
/// Tagged onto log lines so interleaved test output can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a deterministic SessionId from a seed.
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A single BCP command travelling over a transport.
///
/// The shape mirrors the wire protocol exactly: a command name, a map of
/// named parameters, optional raw bytes and an optional acknowledgement
/// callback.
pub struct BcpMessage {
    /// Command name, e.g. `"ping"`
    pub command: String,

    /// Named parameters
    pub params: Params,

    /// Binary payload sent alongside the parameters
    pub rawbytes: Option<Vec<u8>>,

    callback: Option<Callback>,
}

impl BcpMessage {
    /// Creates a message from a command name and parameters.
    pub fn new(command: impl Into<String>, params: Params) -> Self {
        Self {
            command: command.into(),
            params,
            rawbytes: None,
            callback: None,
        }
    }

    /// Creates a message with no parameters.
    pub fn bare(command: impl Into<String>) -> Self {
        Self::new(command, Params::new())
    }

    /// Creates a message whose parameters come from a JSON object.
    ///
    /// # Returns
    /// * `Err(EnvError::SerializationError)` - `params` is not a JSON object
    pub fn from_json(command: impl Into<String>, params: Value) -> Result<Self, EnvError> {
        match params {
            Value::Object(map) => Ok(Self::new(command, map)),
            other => Err(EnvError::SerializationError(format!(
                "BCP parameters must be an object, got {}",
                other
            ))),
        }
    }

    /// Attaches a binary payload.
    pub fn with_rawbytes(mut self, rawbytes: Vec<u8>) -> Self {
        self.rawbytes = Some(rawbytes);
        self
    }

    /// Attaches an acknowledgement callback.
    pub fn with_callback(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Returns a parameter by name.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Returns true if an acknowledgement callback is still pending.
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Runs the acknowledgement callback, if any. Subsequent calls do nothing.
    pub fn acknowledge(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }

    /// Splits the message into its `(command, parameters)` tuple.
    pub fn into_parts(self) -> (String, Params) {
        (self.command, self.params)
    }
}

impl std::fmt::Debug for BcpMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcpMessage")
            .field("command", &self.command)
            .field("params", &self.params)
            .field("rawbytes", &self.rawbytes.as_ref().map(Vec::len))
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Two messages are equal when their wire content matches; callbacks are ignored.
impl PartialEq for BcpMessage {
    fn eq(&self, other: &Self) -> bool {
        self.command == other.command
            && self.params == other.params
            && self.rawbytes == other.rawbytes
    }
}

impl<S: Into<String>> From<(S, Params)> for BcpMessage {
    fn from((command, params): (S, Params)) -> Self {
        Self::new(command, params)
    }
}
