//! lockstep Harness - runs a host and a controller in one process, in lockstep.
//!
//! Both subsystems read one virtual clock and exchange BCP messages through
//! an in-memory bridge, so an integration test is deterministic: the same
//! inputs give the same event history on every run.
//!
//! # Core Principle: One Clock, One Scheduler
//!
//! - **Time**: `VirtualClock` only moves when the host scheduler steps it
//! - **Transport**: `TransportBridge` replaces the socket link with two FIFO queues
//! - **Controller loop**: `ControllerPump` runs one `idle()` pass per host tick
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    IntegrationHarness                       │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ HostScheduler (steps VirtualClock)                   │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │ host tasks                 │ pump (late, 1/fps)     │
//! │  ┌────▼──────┐                ┌────▼────────────┐           │
//! │  │   Host    │◄──────────────►│ MediaController │           │
//! │  │  (BCP)    │ TransportBridge│   idle()        │           │
//! │  └───────────┘                └────┬────────────┘           │
//! │                                    │ EventBus               │
//! │                              ┌─────▼─────────┐              │
//! │                              │ EventRecorder │              │
//! │                              └───────────────┘              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use lockstep_sim::{HarnessBuilder, HarnessConfig};
//!
//! let mut harness = HarnessBuilder::new(HarnessConfig::default())
//!     .observe("client_connected")
//!     .build()?;
//!
//! harness.assert_controller_event_called("client_connected", Some(1));
//! harness.send("ping", params)?;
//! harness.advance_time_and_run(0.1)?;
//! ```

mod bootstrap;
mod bridge;
mod clock;
mod config;
mod error;
mod harness;
mod pump;
mod recorder;
mod runner;
pub mod scenarios;

pub use bootstrap::ControllerBootstrap;
pub use bridge::{BridgeEndpoint, Side, TransportBridge, BRIDGE_TRANSPORT};
pub use clock::{VirtualClock, DEFAULT_ORIGIN_UNIX_SECS};
pub use config::HarnessConfig;
pub use error::{BootstrapError, HarnessError, RecorderError};
pub use harness::{HarnessBuilder, IntegrationHarness, SharedController, LOCAL_DISPLAY};
pub use pump::{ControllerPump, TickOutcome};
pub use recorder::{EventRecorder, RecordedEvent};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a harness mutex.
///
/// The harness is single threaded, so a poisoned lock only means an earlier
/// test body panicked; the data is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
