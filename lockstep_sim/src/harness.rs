//! IntegrationHarness - host and controller wired together on one virtual clock.

use crate::bootstrap::ControllerBootstrap;
use crate::bridge::TransportBridge;
use crate::clock::VirtualClock;
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::lock;
use crate::pump::ControllerPump;
use crate::recorder::EventRecorder;

use lockstep_core::{HostMachine, MediaController, TransportRegistry};
use lockstep_env::{duration_from_secs, BcpMessage, Clock, Params, SessionId, SteppableClock};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

/// Host client name the controller is paired with.
pub const LOCAL_DISPLAY: &str = "local_display";

/// Controller handle shared by the harness and the pump task.
pub type SharedController = Arc<Mutex<MediaController<VirtualClock>>>;

/// Builder for an `IntegrationHarness`.
#[derive(Debug, Clone, Default)]
pub struct HarnessBuilder {
    config: HarnessConfig,
    observed: Vec<String>,
}

impl HarnessBuilder {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            observed: Vec::new(),
        }
    }

    /// Observes `event` from before the first pump tick, so events queued
    /// during startup (such as `client_connected`) are counted.
    pub fn observe(mut self, event: impl Into<String>) -> Self {
        self.observed.push(event.into());
        self
    }

    /// Wires everything together and runs the settle period.
    ///
    /// Setup order:
    /// 1. Virtual clock and transport bridge
    /// 2. Host, with `local_display` routed over the bridge
    /// 3. Controller bootstrap (real BCP servers switched off)
    /// 4. Pre-registered observers
    /// 5. Pump registration, then `settle_secs` of virtual time
    pub fn build(self) -> Result<IntegrationHarness, HarnessError> {
        let HarnessBuilder { config, observed } = self;
        config.validate()?;

        let session = SessionId::from_seed(config.seed);
        let clock = Arc::new(VirtualClock::with_origin(config.origin()));
        let bridge = TransportBridge::shared();

        let mut registry = TransportRegistry::new();
        bridge.register(&mut registry);
        let mut host = HostMachine::new(Arc::clone(&clock), &config.bridged_bcp(), &registry)?;

        let controller = ControllerBootstrap::new(config.offline_controller()).run(
            Arc::clone(&clock),
            &bridge,
            host.bcp(),
        )?;
        let controller: SharedController = Arc::new(Mutex::new(controller));

        let mut recorder = EventRecorder::new();
        {
            let mut guard = lock(&controller);
            for event in &observed {
                recorder.observe(guard.events_mut(), event);
            }
        }

        let pump = Arc::new(ControllerPump::new(Arc::clone(&controller), config.fps)?);
        pump.start(host.scheduler_mut())?;

        info!("Harness session {} set up (fps={}, seed={})", session, config.fps, config.seed);

        let settle_secs = config.settle_secs;
        let mut harness = IntegrationHarness {
            config,
            session,
            clock,
            bridge,
            host,
            controller,
            pump,
            recorder,
            torn_down: false,
        };
        harness.advance_time_and_run(settle_secs)?;
        Ok(harness)
    }
}

/// A running host/controller pair.
///
/// Dropping the harness tears it down.
pub struct IntegrationHarness {
    config: HarnessConfig,
    session: SessionId,
    clock: Arc<VirtualClock>,
    bridge: Arc<TransportBridge>,
    host: HostMachine<VirtualClock>,
    controller: SharedController,
    pump: Arc<ControllerPump>,
    recorder: EventRecorder,
    torn_down: bool,
}

impl IntegrationHarness {
    /// Builds a harness with no pre-registered observers.
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        HarnessBuilder::new(config).build()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn clock(&self) -> &Arc<VirtualClock> {
        &self.clock
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn bridge(&self) -> &Arc<TransportBridge> {
        &self.bridge
    }

    pub fn host(&self) -> &HostMachine<VirtualClock> {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut HostMachine<VirtualClock> {
        &mut self.host
    }

    /// Locks the controller for inspection.
    ///
    /// Release the guard before advancing time; the pump needs the lock.
    pub fn controller(&self) -> MutexGuard<'_, MediaController<VirtualClock>> {
        lock(&self.controller)
    }

    pub fn shared_controller(&self) -> &SharedController {
        &self.controller
    }

    pub fn pump(&self) -> &Arc<ControllerPump> {
        &self.pump
    }

    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    /// Advances virtual time by `secs`, running host tasks and pump ticks as
    /// they fall due.
    ///
    /// # Returns
    /// Number of scheduler tasks run.
    pub fn advance_time_and_run(&mut self, secs: f64) -> Result<usize, HarnessError> {
        Ok(self.host.advance_time_and_run(secs)?)
    }

    /// Advances one pump period at a time until `condition` holds or
    /// `timeout_secs` of virtual time have passed.
    ///
    /// # Returns
    /// Whether the condition was met.
    pub fn run_until(
        &mut self,
        timeout_secs: f64,
        mut condition: impl FnMut(&MediaController<VirtualClock>) -> bool,
    ) -> Result<bool, HarnessError> {
        let step = self.pump.period();
        let deadline = self.clock.time_after(duration_from_secs(timeout_secs)?)?;

        loop {
            if condition(&lock(&self.controller)) {
                return Ok(true);
            }
            let now = self.now();
            if now >= deadline {
                return Ok(false);
            }
            self.host.scheduler_mut().advance(step.min(deadline - now))?;
        }
    }

    /// Queues `(command, params)` from the host to the controller.
    ///
    /// The controller sees it on the next pump tick at or after now.
    pub fn send(&self, command: &str, params: Params) -> Result<(), HarnessError> {
        self.send_message(BcpMessage::new(command, params))
    }

    /// Queues a full message (rawbytes, callback) to the controller.
    pub fn send_message(&self, message: BcpMessage) -> Result<(), HarnessError> {
        self.host.bcp().send_to(LOCAL_DISPLAY, message)?;
        Ok(())
    }

    /// Takes everything the controller has sent to the host so far.
    pub fn receive(&self) -> Result<Vec<BcpMessage>, HarnessError> {
        Ok(self.host.bcp().receive_from(LOCAL_DISPLAY)?)
    }

    /// Starts counting `event` on the controller's bus from zero.
    pub fn mock_controller_event(&mut self, event: &str) {
        let mut controller = lock(&self.controller);
        self.recorder.observe(controller.events_mut(), event);
    }

    /// Panics unless `event` was dispatched (exactly `times` times, if given).
    #[track_caller]
    pub fn assert_controller_event_called(&self, event: &str, times: Option<u32>) {
        if let Err(err) = self.recorder.assert_called(event, times) {
            panic!("{err}");
        }
    }

    /// Panics if `event` was dispatched.
    #[track_caller]
    pub fn assert_controller_event_not_called(&self, event: &str) {
        if let Err(err) = self.recorder.assert_not_called(event) {
            panic!("{err}");
        }
    }

    pub fn controller_event_count(&self, event: &str) -> Option<u32> {
        self.recorder.count(event)
    }

    pub fn last_controller_event_params(&self, event: &str) -> Option<Params> {
        self.recorder.last_params(event)
    }

    /// Stops the pump, then the controller, then its event loop.
    ///
    /// Runs once; later calls (and the one from `Drop`) are no-ops.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.pump.stop(self.host.scheduler_mut());
        {
            let mut controller = lock(&self.controller);
            self.recorder.detach_all(controller.events_mut());
            controller.stop();
            controller.close_event_loop();
        }

        let elapsed = self.now().as_secs_f64();
        if elapsed > self.config.expected_duration_secs {
            warn!(
                "Session {} ran {:.3}s of virtual time, expected at most {:.3}s",
                self.session, elapsed, self.config.expected_duration_secs
            );
        }
        info!(
            "Harness session {} torn down at t={:.3}s after {} pump ticks",
            self.session,
            elapsed,
            self.pump.tick_count()
        );
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for IntegrationHarness {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn harness() -> IntegrationHarness {
        IntegrationHarness::new(HarnessConfig::default()).unwrap()
    }

    #[test]
    fn test_setup_settles_for_configured_time() {
        let harness = harness();

        assert_eq!(harness.now(), Duration::from_secs(1));
        assert_eq!(harness.pump().tick_count(), 30);
        assert!(harness.controller().is_init_done());
        assert!(harness.host().bcp().get_named_client(LOCAL_DISPLAY).is_some());
    }

    #[test]
    fn test_send_reaches_controller_on_next_tick() {
        let mut harness = harness();
        harness.mock_controller_event("score");

        harness
            .send("trigger", json!({"name": "score", "points": 100}).as_object().cloned().unwrap())
            .unwrap();
        harness.advance_time_and_run(0.0).unwrap();
        harness.assert_controller_event_not_called("score");

        harness.advance_time_and_run(0.04).unwrap();
        harness.assert_controller_event_called("score", Some(1));
        assert_eq!(
            harness.last_controller_event_params("score").unwrap().get("points"),
            Some(&json!(100))
        );
    }

    #[test]
    fn test_run_until_stops_when_condition_holds() {
        let mut harness = harness();
        harness.send("goodbye", Params::new()).unwrap();

        let met = harness.run_until(1.0, |mc| !mc.is_connected()).unwrap();

        assert!(met);
        assert!(harness.now() < Duration::from_millis(1100));
    }

    #[test]
    fn test_run_until_times_out() {
        let mut harness = harness();
        let start = harness.now();

        let met = harness.run_until(0.5, |mc| mc.is_stopped()).unwrap();

        assert!(!met);
        assert_eq!(harness.now(), start + Duration::from_millis(500));
    }

    #[test]
    fn test_negative_advance_rejected() {
        let mut harness = harness();
        let before = harness.now();

        let err = harness.advance_time_and_run(-0.5).unwrap_err();

        assert!(matches!(err, HarnessError::Core(_)));
        assert_eq!(harness.now(), before);
    }

    #[test]
    fn test_oversized_advance_is_an_error() {
        let mut harness = harness();
        let before = harness.now();
        let ticks = harness.pump().tick_count();

        for secs in [1e20, f64::MAX] {
            let err = harness.advance_time_and_run(secs).unwrap_err();
            assert!(matches!(
                err,
                HarnessError::Core(lockstep_core::CoreError::Env(lockstep_env::EnvError::StepOverflow(_)))
            ));
        }
        let err = harness.run_until(1e20, |_| false).unwrap_err();
        assert!(matches!(err, HarnessError::Env(lockstep_env::EnvError::StepOverflow(_))));

        assert_eq!(harness.now(), before);
        assert_eq!(harness.pump().tick_count(), ticks);
        harness.advance_time_and_run(0.1).unwrap();
        assert_eq!(harness.pump().tick_count(), ticks + 3);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let mut harness = harness();
        harness.teardown();
        harness.teardown();

        assert!(harness.is_torn_down());
        assert!(!harness.pump().is_running());
        assert!(harness.controller().is_stopped());
        assert!(harness.controller().event_loop().is_closed());
    }

    #[test]
    fn test_zero_fps_fails_before_setup() {
        let result = IntegrationHarness::new(HarnessConfig::default().with_fps(0));
        assert!(matches!(result, Err(HarnessError::Config(_))));
    }
}
