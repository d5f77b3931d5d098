//! VirtualClock - the stepped time source shared by host and controller.

use crate::lock;
use lockstep_env::{Clock, SteppableClock};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default origin: 2024-01-01 00:00:00 UTC.
pub const DEFAULT_ORIGIN_UNIX_SECS: u64 = 1_704_067_200;

/// Virtual clock that only moves when stepped.
///
/// - `now()` reads the elapsed virtual time, no syscall involved
/// - `system_time()` is always `origin + now()`
/// - Clones share the same elapsed time
pub struct VirtualClock {
    /// Wall-clock time that virtual time 0 maps to
    origin: SystemTime,

    /// Elapsed virtual time since the origin
    elapsed: Arc<Mutex<Duration>>,
}

impl VirtualClock {
    /// Creates a clock at the default origin.
    pub fn new() -> Self {
        Self::with_origin(UNIX_EPOCH + Duration::from_secs(DEFAULT_ORIGIN_UNIX_SECS))
    }

    /// Creates a clock whose time 0 is `origin`.
    pub fn with_origin(origin: SystemTime) -> Self {
        Self {
            origin,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Creates an Arc-wrapped clock for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the origin timestamp.
    pub fn origin(&self) -> SystemTime {
        self.origin
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for VirtualClock {
    fn clone(&self) -> Self {
        Self {
            origin: self.origin,
            elapsed: Arc::clone(&self.elapsed),
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        *lock(&self.elapsed)
    }

    fn system_time(&self) -> SystemTime {
        self.origin + self.now()
    }
}

impl SteppableClock for VirtualClock {
    fn step(&self, delta: Duration) {
        let mut elapsed = lock(&self.elapsed);
        *elapsed = elapsed.saturating_add(delta);
    }
}
