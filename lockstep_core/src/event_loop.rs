//! EventLoop - the controller's own timer queue.
//!
//! Owned per controller instance (never process-wide) and read against the
//! shared clock. Timers only run when the controller idles; closing the loop
//! at teardown drops every timer so nothing can fire into a stopped
//! controller.

use crate::error::CoreError;
use crate::event_bus::EventBus;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Timer body; may post events on the controller's bus.
pub type TimerCallback = Box<dyn FnMut(&mut EventBus) + Send>;

/// Identifies a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

struct Timer {
    callback: TimerCallback,
    interval: Option<Duration>,
}

/// Controller-side timer queue.
#[derive(Default)]
pub struct EventLoop {
    queue: BTreeMap<(Duration, u64), TimerHandle>,
    timers: HashMap<TimerHandle, Timer>,
    next_seq: u64,
    closed: bool,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `callback` to run once at `now + delay`.
    pub fn schedule_once(
        &mut self,
        now: Duration,
        delay: Duration,
        callback: impl FnMut(&mut EventBus) + Send + 'static,
    ) -> Result<TimerHandle, CoreError> {
        self.insert(now.saturating_add(delay), None, Box::new(callback))
    }

    /// Schedules `callback` every `interval`, first at `now + interval`.
    pub fn schedule_interval(
        &mut self,
        now: Duration,
        interval: Duration,
        callback: impl FnMut(&mut EventBus) + Send + 'static,
    ) -> Result<TimerHandle, CoreError> {
        if interval.is_zero() {
            return Err(CoreError::InvalidInterval(interval));
        }
        self.insert(now.saturating_add(interval), Some(interval), Box::new(callback))
    }

    fn insert(
        &mut self,
        due: Duration,
        interval: Option<Duration>,
        callback: TimerCallback,
    ) -> Result<TimerHandle, CoreError> {
        if self.closed {
            return Err(CoreError::EventLoopClosed);
        }
        let handle = TimerHandle(self.next_seq);
        self.queue.insert((due, self.next_seq), handle);
        self.next_seq += 1;
        self.timers.insert(handle, Timer { callback, interval });
        Ok(handle)
    }

    /// Cancels a timer. Returns false if it was not pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.timers.remove(&handle).is_some()
    }

    /// Number of pending timers.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Runs every timer due at or before `now`, earliest first.
    ///
    /// A periodic timer fires at most once per call; it is re-queued one
    /// interval after its previous due time.
    pub fn run_due(&mut self, now: Duration, bus: &mut EventBus) -> usize {
        let due: Vec<_> = self
            .queue
            .range(..=(now, u64::MAX))
            .map(|(key, handle)| (*key, *handle))
            .collect();

        let mut ran = 0;
        for (key, handle) in due {
            self.queue.remove(&key);
            let Some(mut timer) = self.timers.remove(&handle) else {
                continue;
            };

            (timer.callback)(bus);
            ran += 1;

            if let Some(interval) = timer.interval {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.queue.insert((key.0.saturating_add(interval), seq), handle);
                self.timers.insert(handle, timer);
            }
        }
        ran
    }

    /// Drops every timer and refuses new ones.
    pub fn close(&mut self) {
        self.queue.clear();
        self.timers.clear();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
