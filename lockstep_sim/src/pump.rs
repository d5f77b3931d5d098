//! ControllerPump - drives the controller's loop from the host scheduler.
//!
//! One tick is one non-blocking `idle()` pass. The pump is a periodic host
//! task with late priority, so at any instant T it runs after every ordinary
//! host task due at T and sees every message those tasks sent.

use crate::clock::VirtualClock;
use crate::error::HarnessError;
use crate::harness::SharedController;
use crate::lock;

use lockstep_core::{CoreError, HostScheduler, IdleReport, TaskHandle, TaskPriority};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Name the pump task is registered under.
const PUMP_TASK: &str = "controller_pump";

/// Result of one pump tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The controller ran one idle pass
    Ran(IdleReport),
    /// The pump was stopped; nothing ran
    Stopped,
}

/// Periodic driver of `MediaController::idle`.
pub struct ControllerPump {
    controller: SharedController,
    fps: u32,
    period: Duration,
    ticking: AtomicBool,
    stopped: AtomicBool,
    ticks: AtomicU64,
    handle: Mutex<Option<TaskHandle>>,
}

impl ControllerPump {
    /// Creates a pump ticking `fps` times per virtual second.
    pub fn new(controller: SharedController, fps: u32) -> Result<Self, HarnessError> {
        if fps == 0 {
            return Err(HarnessError::config("fps must be at least 1"));
        }
        Ok(Self {
            controller,
            fps,
            period: Duration::from_secs_f64(1.0 / f64::from(fps)),
            ticking: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            handle: Mutex::new(None),
        })
    }

    /// Registers the pump on the host scheduler.
    ///
    /// The first tick falls one period after the current time.
    pub fn start(self: &Arc<Self>, scheduler: &mut HostScheduler<VirtualClock>) -> Result<TaskHandle, HarnessError> {
        let mut slot = lock(&self.handle);
        if slot.is_some() {
            return Err(HarnessError::PumpAlreadyRunning);
        }

        let pump = Arc::clone(self);
        let handle = scheduler.schedule_interval(PUMP_TASK, self.period, TaskPriority::Late, move || {
            match pump.tick() {
                Ok(_) => Ok(()),
                Err(HarnessError::Core(err)) => Err(err),
                Err(err) => Err(CoreError::task(err)),
            }
        })?;

        *slot = Some(handle);
        info!("Controller pump started at {} fps (period {:?})", self.fps, self.period);
        Ok(handle)
    }

    /// Runs one idle pass of the controller.
    ///
    /// After `stop` this is a no-op returning `TickOutcome::Stopped`.
    pub fn tick(&self) -> Result<TickOutcome, HarnessError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(TickOutcome::Stopped);
        }
        if self.ticking.swap(true, Ordering::SeqCst) {
            return Err(HarnessError::ReentrantTick);
        }

        let result = lock(&self.controller).idle();
        self.ticking.store(false, Ordering::SeqCst);
        let report = result?;

        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        if report != IdleReport::default() {
            debug!(
                "pump tick {}: timers={} messages={} events={}",
                tick, report.timers_run, report.messages_handled, report.events_dispatched
            );
        }
        Ok(TickOutcome::Ran(report))
    }

    /// Unregisters the pump. Stopping twice is a no-op.
    ///
    /// # Returns
    /// True if the pump was running.
    pub fn stop(&self, scheduler: &mut HostScheduler<VirtualClock>) -> bool {
        self.stopped.store(true, Ordering::SeqCst);
        match lock(&self.handle).take() {
            Some(handle) => {
                scheduler.unschedule(handle);
                info!("Controller pump stopped after {} ticks", self.tick_count());
                true
            }
            None => false,
        }
    }

    /// Ticks that ran an idle pass.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Returns true while registered on the scheduler.
    pub fn is_running(&self) -> bool {
        lock(&self.handle).is_some()
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Side, TransportBridge};
    use lockstep_core::{ControllerConfig, EventLoop, MediaController};
    use lockstep_env::{Params, TransportEndpoint};
    use std::sync::Weak;

    fn shared_controller(clock: &Arc<VirtualClock>) -> SharedController {
        let bridge = TransportBridge::shared();
        let endpoint = Arc::new(bridge.endpoint(Side::Controller, "bcp")) as Arc<dyn TransportEndpoint>;
        let mut controller = MediaController::new(ControllerConfig::default(), Arc::clone(clock), endpoint, EventLoop::new());
        controller.load_config().unwrap();
        Arc::new(Mutex::new(controller))
    }

    #[test]
    fn test_zero_fps_rejected() {
        let clock = VirtualClock::shared();
        assert!(matches!(
            ControllerPump::new(shared_controller(&clock), 0),
            Err(HarnessError::Config(_))
        ));
    }

    #[test]
    fn test_pump_ticks_once_per_period() {
        let clock = VirtualClock::shared();
        let mut scheduler = HostScheduler::new(Arc::clone(&clock));
        let pump = Arc::new(ControllerPump::new(shared_controller(&clock), 10).unwrap());

        pump.start(&mut scheduler).unwrap();
        scheduler.advance(Duration::from_millis(1000)).unwrap();

        assert_eq!(pump.tick_count(), 10);
        assert!(pump.is_running());
    }

    #[test]
    fn test_double_start_rejected() {
        let clock = VirtualClock::shared();
        let mut scheduler = HostScheduler::new(Arc::clone(&clock));
        let pump = Arc::new(ControllerPump::new(shared_controller(&clock), 30).unwrap());

        pump.start(&mut scheduler).unwrap();
        assert!(matches!(pump.start(&mut scheduler), Err(HarnessError::PumpAlreadyRunning)));
        assert_eq!(scheduler.task_count(), 1);
    }

    #[test]
    fn test_stop_unregisters_and_silences() {
        let clock = VirtualClock::shared();
        let mut scheduler = HostScheduler::new(Arc::clone(&clock));
        let pump = Arc::new(ControllerPump::new(shared_controller(&clock), 30).unwrap());
        pump.start(&mut scheduler).unwrap();

        assert!(pump.stop(&mut scheduler));
        assert!(!pump.stop(&mut scheduler));
        scheduler.advance(Duration::from_secs(1)).unwrap();

        assert_eq!(pump.tick_count(), 0);
        assert_eq!(scheduler.task_count(), 0);
        assert_eq!(pump.tick().unwrap(), TickOutcome::Stopped);
    }

    #[test]
    fn test_reentrant_tick_is_reported() {
        let clock = VirtualClock::shared();
        let controller = shared_controller(&clock);
        let pump = Arc::new(ControllerPump::new(Arc::clone(&controller), 30).unwrap());
        let nested = Arc::new(Mutex::new(None));

        {
            let weak: Weak<ControllerPump> = Arc::downgrade(&pump);
            let slot = Arc::clone(&nested);
            let mut guard = controller.lock().unwrap();
            guard.events_mut().add_handler("reenter", move |_, _| {
                if let Some(pump) = weak.upgrade() {
                    *slot.lock().unwrap() = Some(pump.tick());
                }
            });
            guard.post_event("reenter", Params::new());
        }

        assert!(matches!(pump.tick(), Ok(TickOutcome::Ran(_))));
        assert!(matches!(
            nested.lock().unwrap().take(),
            Some(Err(HarnessError::ReentrantTick))
        ));
    }
}
