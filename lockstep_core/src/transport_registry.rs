//! TransportRegistry - selects a transport implementation by config value.
//!
//! Each BCP connection names a transport `type`. The registry maps that
//! string to a factory producing a `TransportEndpoint`; factories are
//! registered explicitly, never looked up by class name.

use lockstep_env::{EnvError, TransportEndpoint};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds an endpoint for the named client.
pub type TransportFactory =
    Box<dyn Fn(&str) -> Result<Arc<dyn TransportEndpoint>, EnvError> + Send + Sync>;

/// Registry of transport factories keyed by type name.
#[derive(Default)]
pub struct TransportRegistry {
    factories: BTreeMap<String, TransportFactory>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the factory for `kind`.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        factory: impl Fn(&str) -> Result<Arc<dyn TransportEndpoint>, EnvError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.factories.insert(kind.into(), Box::new(factory));
        self
    }

    /// Returns true if a factory exists for `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered type names, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Creates an endpoint of type `kind` for client `name`.
    ///
    /// # Returns
    /// * `Err(EnvError::UnknownTransport)` - nothing is registered for `kind`
    pub fn create(&self, kind: &str, name: &str) -> Result<Arc<dyn TransportEndpoint>, EnvError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| EnvError::unknown_transport(kind))?;
        factory(name)
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
