//! TransportBridge - in-memory stand-in for the BCP socket link.
//!
//! Two independent FIFO queues, one per direction. Sending never blocks and
//! never fails; receiving is pull-based and paced by the consumer. The bridge
//! links exactly one host client to the controller.
//!
//! ```text
//!   HostMachine                TransportBridge               MediaController
//!  BridgeEndpoint(Host) ──► [host->controller queue] ──► BridgeEndpoint(Controller)
//!  BridgeEndpoint(Host) ◄── [controller->host queue] ◄── BridgeEndpoint(Controller)
//! ```

use crate::lock;
use lockstep_core::TransportRegistry;
use lockstep_env::{BcpMessage, Direction, EnvError, TransportEndpoint};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Transport type name the bridge registers under.
pub const BRIDGE_TRANSPORT: &str = "bridge";

/// Which subsystem an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Host,
    Controller,
}

impl Side {
    /// Direction this side sends on.
    pub fn outbound(self) -> Direction {
        match self {
            Side::Host => Direction::HostToController,
            Side::Controller => Direction::ControllerToHost,
        }
    }

    /// Direction this side receives on.
    pub fn inbound(self) -> Direction {
        self.outbound().reverse()
    }
}

#[derive(Default)]
struct Lane {
    queue: VecDeque<BcpMessage>,
    sent: u64,
}

/// Bidirectional, unbounded, FIFO message bridge.
#[derive(Default)]
pub struct TransportBridge {
    host_to_controller: Mutex<Lane>,
    controller_to_host: Mutex<Lane>,
    host_client: Mutex<Option<String>>,
}

impl TransportBridge {
    /// Creates an empty bridge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped bridge for sharing with endpoints.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lane(&self, direction: Direction) -> &Mutex<Lane> {
        match direction {
            Direction::HostToController => &self.host_to_controller,
            Direction::ControllerToHost => &self.controller_to_host,
        }
    }

    /// Queues a message on `direction`. Never blocks, never fails.
    pub fn send(&self, direction: Direction, message: BcpMessage) {
        debug!("bridge {}: {}", direction, message.command);
        let mut lane = lock(self.lane(direction));
        lane.queue.push_back(message);
        lane.sent += 1;
    }

    /// Takes the oldest pending message on `direction`.
    pub fn try_receive(&self, direction: Direction) -> Option<BcpMessage> {
        lock(self.lane(direction)).queue.pop_front()
    }

    /// Takes every pending message on `direction`, in send order.
    pub fn drain(&self, direction: Direction) -> Vec<BcpMessage> {
        lock(self.lane(direction)).queue.drain(..).collect()
    }

    /// Number of messages waiting on `direction`.
    pub fn pending(&self, direction: Direction) -> usize {
        lock(self.lane(direction)).queue.len()
    }

    /// Total messages ever sent on `direction`.
    pub fn sent_count(&self, direction: Direction) -> u64 {
        lock(self.lane(direction)).sent
    }

    /// Creates an endpoint for one side of the bridge.
    pub fn endpoint(self: &Arc<Self>, side: Side, name: impl Into<String>) -> BridgeEndpoint {
        BridgeEndpoint {
            bridge: Arc::clone(self),
            side,
            name: name.into(),
        }
    }

    /// Name of the host client linked through the registry, if any.
    pub fn host_client(&self) -> Option<String> {
        lock(&self.host_client).clone()
    }

    /// Registers the bridge as the `bridge` transport type.
    ///
    /// Connections created through the registry are host-side endpoints.
    /// The first client name claims the bridge; any other name is refused
    /// with `EnvError::AlreadyLinked`.
    pub fn register(self: &Arc<Self>, registry: &mut TransportRegistry) {
        let bridge = Arc::clone(self);
        registry.register(BRIDGE_TRANSPORT, move |name| {
            let mut claimed = lock(&bridge.host_client);
            match claimed.as_deref() {
                Some(existing) if existing != name => {
                    return Err(EnvError::AlreadyLinked(existing.to_string()));
                }
                Some(_) => {}
                None => *claimed = Some(name.to_string()),
            }
            Ok(Arc::new(bridge.endpoint(Side::Host, name)) as Arc<dyn TransportEndpoint>)
        });
    }
}

/// One side's view of the bridge.
///
/// Holds the bridge from construction; nothing is swapped in later.
pub struct BridgeEndpoint {
    bridge: Arc<TransportBridge>,
    side: Side,
    name: String,
}

impl BridgeEndpoint {
    pub fn side(&self) -> Side {
        self.side
    }
}

impl TransportEndpoint for BridgeEndpoint {
    fn send(&self, message: BcpMessage) -> Result<(), EnvError> {
        self.bridge.send(self.side.outbound(), message);
        Ok(())
    }

    fn try_recv(&self) -> Option<BcpMessage> {
        self.bridge.try_receive(self.side.inbound())
    }

    fn drain(&self) -> Vec<BcpMessage> {
        self.bridge.drain(self.side.inbound())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ping(seq: u64) -> BcpMessage {
        BcpMessage::from_json("ping", json!({ "seq": seq })).unwrap()
    }

    #[test]
    fn test_drain_is_fifo() {
        let bridge = TransportBridge::new();
        for seq in 0..5 {
            bridge.send(Direction::HostToController, ping(seq));
        }

        let drained = bridge.drain(Direction::HostToController);

        let seqs: Vec<_> = drained.iter().map(|m| m.param("seq").cloned()).collect();
        assert_eq!(seqs, (0..5).map(|s| Some(json!(s))).collect::<Vec<_>>());
        assert_eq!(bridge.pending(Direction::HostToController), 0);
        assert_eq!(bridge.sent_count(Direction::HostToController), 5);
    }

    #[test]
    fn test_directions_are_independent() {
        let bridge = TransportBridge::new();
        bridge.send(Direction::HostToController, ping(1));

        assert!(bridge.try_receive(Direction::ControllerToHost).is_none());
        assert_eq!(bridge.try_receive(Direction::HostToController), Some(ping(1)));
        assert!(bridge.try_receive(Direction::HostToController).is_none());
    }

    #[test]
    fn test_endpoints_cross_over() {
        let bridge = TransportBridge::shared();
        let host = bridge.endpoint(Side::Host, "local_display");
        let controller = bridge.endpoint(Side::Controller, "bcp");

        host.send(ping(7)).unwrap();
        controller.send(BcpMessage::bare("pong")).unwrap();

        assert_eq!(controller.drain(), vec![ping(7)]);
        assert_eq!(host.try_recv(), Some(BcpMessage::bare("pong")));
        assert_eq!(host.name(), "local_display");
        assert_eq!(controller.side(), Side::Controller);
    }

    #[test]
    fn test_register_creates_host_endpoints() {
        let bridge = TransportBridge::shared();
        let mut registry = TransportRegistry::new();
        bridge.register(&mut registry);

        let endpoint = registry.create(BRIDGE_TRANSPORT, "local_display").unwrap();
        endpoint.send(ping(3)).unwrap();

        assert_eq!(bridge.pending(Direction::HostToController), 1);
        assert_eq!(bridge.host_client().as_deref(), Some("local_display"));
    }

    #[test]
    fn test_register_links_a_single_host_client() {
        let bridge = TransportBridge::shared();
        let mut registry = TransportRegistry::new();
        bridge.register(&mut registry);

        registry.create(BRIDGE_TRANSPORT, "local_display").unwrap();
        registry.create(BRIDGE_TRANSPORT, "local_display").unwrap();
        let err = registry.create(BRIDGE_TRANSPORT, "backbox").err().unwrap();

        assert!(matches!(err, EnvError::AlreadyLinked(name) if name == "local_display"));
        assert_eq!(bridge.host_client().as_deref(), Some("local_display"));
    }

    #[test]
    fn test_side_directions() {
        assert_eq!(Side::Host.outbound(), Direction::HostToController);
        assert_eq!(Side::Host.inbound(), Direction::ControllerToHost);
        assert_eq!(Side::Controller.inbound(), Direction::HostToController);
    }
}
