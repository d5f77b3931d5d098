//! EventBus - the controller's publish/subscribe bus.
//!
//! Events are queued by `post` and dispatched during the controller's idle
//! pass, in post order. Handlers for one event run by descending priority,
//! then registration order.

use lockstep_env::Params;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// Upper bound on dispatches in a single `process_queue` call.
///
/// Handlers may post further events; past this bound the rest waits for the
/// next idle pass.
pub const MAX_DISPATCH_PER_PASS: usize = 10_000;

/// Event handler: receives the event name and its parameters.
pub type Handler = Box<dyn FnMut(&str, &Params) + Send>;

/// Identifies a registered handler for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    priority: i32,
    handler: Handler,
}

/// Publish/subscribe bus with a deferred dispatch queue.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<String, Vec<Registration>>,
    queue: VecDeque<(String, Params)>,
    next_id: u64,
    dispatched: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler with priority 1.
    pub fn add_handler(
        &mut self,
        event: &str,
        handler: impl FnMut(&str, &Params) + Send + 'static,
    ) -> HandlerId {
        self.add_handler_with_priority(event, 1, handler)
    }

    /// Registers a handler; higher priorities run first.
    pub fn add_handler_with_priority(
        &mut self,
        event: &str,
        priority: i32,
        handler: impl FnMut(&str, &Params) + Send + 'static,
    ) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;

        let registrations = self.handlers.entry(event.to_string()).or_default();
        // Stable position: after every handler with priority >= ours
        let index = registrations
            .iter()
            .position(|r| r.priority < priority)
            .unwrap_or(registrations.len());
        registrations.insert(
            index,
            Registration {
                id,
                priority,
                handler: Box::new(handler),
            },
        );

        id
    }

    /// Removes one handler. Returns false if it was not registered for `event`.
    pub fn remove_handler(&mut self, event: &str, id: HandlerId) -> bool {
        let Some(registrations) = self.handlers.get_mut(event) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        let removed = registrations.len() != before;
        if registrations.is_empty() {
            self.handlers.remove(event);
        }
        removed
    }

    /// Removes every handler for `event`, returning how many were removed.
    pub fn remove_handlers_for(&mut self, event: &str) -> usize {
        self.handlers.remove(event).map(|r| r.len()).unwrap_or(0)
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map(Vec::len).unwrap_or(0)
    }

    /// Queues an event for dispatch on the next `process_queue`.
    pub fn post(&mut self, event: &str, params: Params) {
        debug!("Event posted: {}", event);
        self.queue.push_back((event.to_string(), params));
    }

    /// Number of events waiting for dispatch.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Total events dispatched since creation.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Dispatches queued events in post order.
    ///
    /// # Returns
    /// Number of events dispatched.
    pub fn process_queue(&mut self) -> usize {
        let mut count = 0;

        while let Some((event, params)) = self.queue.pop_front() {
            if let Some(registrations) = self.handlers.get_mut(&event) {
                for registration in registrations.iter_mut() {
                    (registration.handler)(&event, &params);
                }
            }
            count += 1;
            self.dispatched += 1;

            if count >= MAX_DISPATCH_PER_PASS && !self.queue.is_empty() {
                warn!(
                    "Event dispatch bound reached, {} events deferred to next pass",
                    self.queue.len()
                );
                break;
            }
        }

        count
    }

    /// Drops every handler and every queued event.
    pub fn clear(&mut self) {
        self.handlers.clear();
        self.queue.clear();
    }
}
