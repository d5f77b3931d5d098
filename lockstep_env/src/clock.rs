//! Clock traits shared by the host and controller subsystems.

use crate::error::EnvError;
use std::time::{Duration, SystemTime};

/// The time source both subsystems read from.
///
/// The harness implements it with a virtual clock advanced only by
/// explicit steps.
///
/// # Determinism
///
/// Reads must not advance time. Two subsystems holding the same clock
/// always observe the same value between two steps.
pub trait Clock: Send + Sync + 'static {
    /// Returns the monotonic time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Returns the wall-clock timestamp, i.e. origin + `now()`.
    fn system_time(&self) -> SystemTime;
}

/// A clock whose elapsed time is moved forward by its owner.
///
/// Only the host scheduler steps the clock; the controller only reads it.
pub trait SteppableClock: Clock {
    /// Advances the clock by `delta`.
    fn step(&self, delta: Duration);

    /// Advances the clock by a number of seconds.
    ///
    /// # Returns
    /// * `Ok(())` - The clock moved forward by `secs`
    /// * `Err(EnvError::NegativeStep)` - `secs` was negative or not finite;
    ///   time never moves backward and is never clamped
    /// * `Err(EnvError::StepOverflow)` - the clock cannot represent the result
    fn step_secs(&self, secs: f64) -> Result<(), EnvError> {
        let delta = duration_from_secs(secs)?;
        self.time_after(delta)?;
        self.step(delta);
        Ok(())
    }

    /// Elapsed time the clock would read after stepping by `delta`.
    ///
    /// Both the elapsed time and the wall-clock timestamp must stay
    /// representable, otherwise `EnvError::StepOverflow` is returned.
    fn time_after(&self, delta: Duration) -> Result<Duration, EnvError> {
        self.system_time()
            .checked_add(delta)
            .and_then(|_| self.now().checked_add(delta))
            .ok_or(EnvError::StepOverflow(delta.as_secs_f64()))
    }
}

/// Converts a step in seconds to a `Duration`.
///
/// Negative or non-finite input is `EnvError::NegativeStep`; input too large
/// for a `Duration` is `EnvError::StepOverflow`.
pub fn duration_from_secs(secs: f64) -> Result<Duration, EnvError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(EnvError::NegativeStep(secs));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| EnvError::StepOverflow(secs))
}
