//! lockstep Core - the host and controller subsystems.
//!
//! Two independently clocked subsystems that talk BCP to each other:
//! 1. **Host**: owns the master `HostScheduler` and the BCP client connections
//! 2. **Controller**: `MediaController` with its own `EventLoop`, `EventBus`
//!    and BCP processor, advanced one non-blocking `idle()` pass at a time
//!
//! Both read time through `lockstep_env::Clock` and exchange messages through
//! `lockstep_env::TransportEndpoint`, so the harness can substitute a virtual
//! clock and an in-memory bridge.

pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod event_bus;
pub mod event_loop;
pub mod host;
pub mod scheduler;
pub mod transport_registry;

// Re-export key types for convenience
pub use config::{BcpConfig, ConnectionConfig, ControllerConfig, ControllerOptions, WindowSettings};
pub use controller::{IdleReport, MediaController};
pub use display::{RootWidget, Window};
pub use error::CoreError;
pub use event_bus::{EventBus, HandlerId};
pub use event_loop::{EventLoop, TimerHandle};
pub use host::{BcpInterface, HostMachine};
pub use scheduler::{HostScheduler, TaskHandle, TaskPriority};
pub use transport_registry::TransportRegistry;
