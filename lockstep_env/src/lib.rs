//! lockstep Environment Abstraction Layer
//!
//! This crate provides the seams that let a host subsystem and a controller
//! subsystem run either against the real world or inside the lockstep
//! integration harness.
//!
//! # Core Concept: Injected Time and Transport
//!
//! Both subsystems only ever see:
//! - Time (`Clock::now()`, `Clock::system_time()`)
//! - Transport (`TransportEndpoint::send()`, `try_recv()`, `drain()`)
//!
//! The harness substitutes a stepped virtual clock and an in-memory bridge,
//! so every run is reproducible and never waits on wall-clock time.
//!
//! # Example
//!
//! ```ignore
//! use lockstep_env::{BcpMessage, Clock, TransportEndpoint};
//!
//! fn heartbeat<C: Clock>(clock: &C, link: &dyn TransportEndpoint) {
//!     let mut params = lockstep_env::Params::new();
//!     params.insert("t".into(), clock.now().as_secs_f64().into());
//!     link.send(BcpMessage::new("heartbeat", params)).ok();
//! }
//! ```

mod clock;
mod error;
mod transport;
mod types;

pub use clock::{duration_from_secs, Clock, SteppableClock};
pub use error::EnvError;
pub use transport::{Direction, TransportEndpoint};
pub use types::{BcpMessage, Callback, Params, SessionId};
