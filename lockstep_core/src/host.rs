//! Host subsystem - owns the master scheduler and the BCP client connections.

use crate::config::BcpConfig;
use crate::error::CoreError;
use crate::scheduler::HostScheduler;
use crate::transport_registry::TransportRegistry;

use lockstep_env::{BcpMessage, Params, SteppableClock, TransportEndpoint};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// The host's BCP connections, by client name.
pub struct BcpInterface {
    clients: BTreeMap<String, Arc<dyn TransportEndpoint>>,
}

impl BcpInterface {
    /// Builds every configured connection through the registry.
    ///
    /// Listening servers are not available; a config that asks for any is
    /// rejected.
    pub fn from_config(config: &BcpConfig, registry: &TransportRegistry) -> Result<Self, CoreError> {
        if !config.servers.is_empty() {
            return Err(CoreError::config(format!(
                "BCP servers are not available here: {}",
                config.servers.join(", ")
            )));
        }

        let mut clients = BTreeMap::new();
        for (name, connection) in &config.connections {
            let endpoint = registry.create(&connection.kind, name)?;
            info!("BCP client '{}' connected via '{}' transport", name, connection.kind);
            clients.insert(name.clone(), endpoint);
        }

        Ok(Self { clients })
    }

    /// Returns a client by name.
    pub fn get_named_client(&self, name: &str) -> Option<Arc<dyn TransportEndpoint>> {
        self.clients.get(name).cloned()
    }

    /// Names of all connected clients.
    pub fn client_names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Sends a message to one client.
    pub fn send_to(&self, client: &str, message: BcpMessage) -> Result<(), CoreError> {
        let endpoint = self
            .clients
            .get(client)
            .ok_or_else(|| CoreError::UnknownClient(client.to_string()))?;
        debug!("host -> {}: {}", client, message.command);
        endpoint.send(message)?;
        Ok(())
    }

    /// Sends `(command, params)` to every client.
    ///
    /// # Returns
    /// Number of clients the command was sent to.
    pub fn send_to_all(&self, command: &str, params: &Params) -> Result<usize, CoreError> {
        for (name, endpoint) in &self.clients {
            debug!("host -> {}: {}", name, command);
            endpoint.send(BcpMessage::new(command, params.clone()))?;
        }
        Ok(self.clients.len())
    }

    /// Takes every pending message from one client.
    ///
    /// Taking a message is processing it on the host side, so each
    /// message's callback has already run when this returns.
    pub fn receive_from(&self, client: &str) -> Result<Vec<BcpMessage>, CoreError> {
        let endpoint = self
            .clients
            .get(client)
            .ok_or_else(|| CoreError::UnknownClient(client.to_string()))?;

        let mut messages = endpoint.drain();
        for message in &mut messages {
            message.acknowledge();
        }
        Ok(messages)
    }
}

impl std::fmt::Debug for BcpInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcpInterface")
            .field("clients", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The host machine: master scheduler plus BCP interface.
///
/// Generic over the clock so the same host runs against a stepped clock
/// inside the harness.
pub struct HostMachine<C: SteppableClock> {
    clock: Arc<C>,
    scheduler: HostScheduler<C>,
    bcp: BcpInterface,
}

impl<C: SteppableClock> HostMachine<C> {
    /// Creates a host whose scheduler steps `clock`.
    pub fn new(clock: Arc<C>, bcp: &BcpConfig, registry: &TransportRegistry) -> Result<Self, CoreError> {
        let bcp = BcpInterface::from_config(bcp, registry)?;
        Ok(Self {
            scheduler: HostScheduler::new(Arc::clone(&clock)),
            clock,
            bcp,
        })
    }

    /// Returns the shared clock.
    pub fn clock(&self) -> &Arc<C> {
        &self.clock
    }

    /// Returns the current virtual time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn scheduler(&self) -> &HostScheduler<C> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut HostScheduler<C> {
        &mut self.scheduler
    }

    pub fn bcp(&self) -> &BcpInterface {
        &self.bcp
    }

    /// Sends a command to every BCP client.
    pub fn send(&self, command: &str, params: Params) -> Result<usize, CoreError> {
        self.bcp.send_to_all(command, &params)
    }

    /// Advances virtual time by `secs`, running every host task that falls due.
    pub fn advance_time_and_run(&mut self, secs: f64) -> Result<usize, CoreError> {
        self.scheduler.advance_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use lockstep_env::{Clock, EnvError};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Default)]
    struct TestClock(Mutex<Duration>);

    impl Clock for TestClock {
        fn now(&self) -> Duration {
            *self.0.lock().unwrap()
        }
        fn system_time(&self) -> SystemTime {
            UNIX_EPOCH + self.now()
        }
    }

    impl SteppableClock for TestClock {
        fn step(&self, delta: Duration) {
            *self.0.lock().unwrap() += delta;
        }
    }

    /// Echoes everything it is sent back into its own inbox.
    struct LoopbackEndpoint {
        name: String,
        inbox: Mutex<VecDeque<BcpMessage>>,
    }

    impl TransportEndpoint for LoopbackEndpoint {
        fn send(&self, message: BcpMessage) -> Result<(), EnvError> {
            self.inbox.lock().unwrap().push_back(message);
            Ok(())
        }
        fn try_recv(&self) -> Option<BcpMessage> {
            self.inbox.lock().unwrap().pop_front()
        }
        fn name(&self) -> &str {
            &self.name
        }
    }

    fn registry() -> TransportRegistry {
        let mut registry = TransportRegistry::new();
        registry.register("loopback", |name| {
            Ok(Arc::new(LoopbackEndpoint {
                name: name.to_string(),
                inbox: Mutex::new(VecDeque::new()),
            }) as Arc<dyn TransportEndpoint>)
        });
        registry
    }

    fn bcp_config(kind: &str) -> BcpConfig {
        let mut config = BcpConfig::default();
        config
            .connections
            .insert("local_display".to_string(), ConnectionConfig::new(kind));
        config
    }

    #[test]
    fn test_host_builds_named_clients() {
        let host = HostMachine::new(Arc::new(TestClock::default()), &bcp_config("loopback"), &registry()).unwrap();

        assert!(host.bcp().get_named_client("local_display").is_some());
        assert!(host.bcp().get_named_client("other").is_none());
        assert_eq!(host.bcp().client_names().collect::<Vec<_>>(), vec!["local_display"]);
    }

    #[test]
    fn test_unknown_transport_fails_construction() {
        let result = HostMachine::new(Arc::new(TestClock::default()), &bcp_config("socket"), &registry());
        assert!(matches!(result, Err(CoreError::Env(EnvError::UnknownTransport(_)))));
    }

    #[test]
    fn test_servers_rejected() {
        let mut config = bcp_config("loopback");
        config.servers.push("mc".to_string());
        let result = HostMachine::new(Arc::new(TestClock::default()), &config, &registry());
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_receive_acknowledges_callbacks() {
        let host = HostMachine::new(Arc::new(TestClock::default()), &bcp_config("loopback"), &registry()).unwrap();
        let acked = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&acked);

        host.bcp()
            .send_to("local_display", BcpMessage::bare("reset").with_callback(move || {
                *flag.lock().unwrap() = true;
            }))
            .unwrap();
        let received = host.bcp().receive_from("local_display").unwrap();

        assert_eq!(received.len(), 1);
        assert!(*acked.lock().unwrap());
    }

    #[test]
    fn test_send_to_unknown_client() {
        let host = HostMachine::new(Arc::new(TestClock::default()), &bcp_config("loopback"), &registry()).unwrap();
        let err = host.bcp().send_to("nobody", BcpMessage::bare("hello")).unwrap_err();
        assert!(matches!(err, CoreError::UnknownClient(name) if name == "nobody"));
    }

    #[test]
    fn test_advance_time_and_run_moves_clock() {
        let mut host = HostMachine::new(Arc::new(TestClock::default()), &BcpConfig::default(), &registry()).unwrap();
        host.advance_time_and_run(1.5).unwrap();
        assert_eq!(host.now(), Duration::from_millis(1500));
        assert_eq!(host.send("hello", Params::new()).unwrap(), 0);
    }
}
