//! Scenario runner - executes the built-in harness scenarios.

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::harness::{HarnessBuilder, IntegrationHarness, LOCAL_DISPLAY};
use crate::scenarios::ScenarioId;

use lockstep_core::controller::BCP_VERSION;
use lockstep_env::{BcpMessage, Direction, Params};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Event the trigger storm fires on the controller.
const STORM_EVENT: &str = "storm";

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Pump ticks executed
    pub total_ticks: u64,

    /// Final virtual time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioMetrics {
    /// Messages sent host -> controller
    pub messages_to_controller: u64,

    /// Messages sent controller -> host
    pub messages_to_host: u64,

    /// Observed controller event firings
    pub events_observed: u64,

    /// Host scheduler task executions, pump ticks included
    pub host_tasks_run: u64,
}

/// Runs harness scenarios.
pub struct ScenarioRunner {
    /// Scenario seed
    seed: u64,

    /// Maximum scenario duration in virtual seconds
    max_duration_secs: f64,

    /// Harness configuration each scenario starts from
    base: HarnessConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_duration_secs: 10.0,
            base: HarnessConfig::default(),
        }
    }

    /// Starts every scenario from `config` instead of the defaults.
    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.base = config;
        self
    }

    /// Sets the pump rate.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.base.fps = fps;
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    fn config(&self) -> HarnessConfig {
        self.base.clone().with_seed(self.seed)
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        let mut harness = match HarnessBuilder::new(self.config())
            .observe("client_connected")
            .observe(STORM_EVENT)
            .build()
        {
            Ok(harness) => harness,
            Err(err) => return self.setup_failure(scenario, err),
        };

        let outcome = match scenario {
            ScenarioId::Connect => self.run_connect(&mut harness),
            ScenarioId::PingPong => self.run_ping_pong(&mut harness),
            ScenarioId::TriggerStorm => self.run_trigger_storm(&mut harness),
            ScenarioId::Teardown => self.run_teardown(&mut harness),
        };

        let metrics = collect_metrics(&harness);
        let total_ticks = harness.pump().tick_count();
        let final_time_secs = harness.now().as_secs_f64();
        harness.teardown();

        let failure_reason = match outcome {
            Ok(()) => None,
            Err(Failure(reason)) => Some(reason),
        };

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            total_ticks,
            final_time_secs,
            failure_reason,
            metrics,
        }
    }

    fn setup_failure(&self, scenario: ScenarioId, err: HarnessError) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            failure_reason: Some(err.to_string()),
            metrics: ScenarioMetrics::default(),
        }
    }

    /// LS-001: Connect - startup delivers `client_connected` exactly once.
    ///
    /// **Assertion**: one `client_connected`, `hello` answered with our
    /// protocol version and the controller's name.
    fn run_connect(&self, harness: &mut IntegrationHarness) -> Result<(), Failure> {
        info!("LS-001: Connect");

        harness.recorder().assert_called("client_connected", Some(1))?;
        {
            let controller = harness.controller();
            ensure(controller.is_init_done(), "controller did not finish initialization")?;
            ensure(controller.is_connected(), "controller is not connected")?;
        }

        let step = self.step_secs(harness);
        harness.send("hello", Params::new())?;
        harness.advance_time_and_run(step)?;

        let replies = harness.receive()?;
        ensure(replies.len() == 1, format!("expected one hello reply, got {}", replies.len()))?;
        let reply = &replies[0];
        ensure(reply.command == "hello", format!("expected hello, got {}", reply.command))?;
        ensure(
            reply.param("version") == Some(&json!(BCP_VERSION)),
            format!("unexpected version {:?}", reply.param("version")),
        )?;

        harness.advance_time_and_run(self.max_duration_secs)?;
        harness.recorder().assert_called("client_connected", Some(1))?;
        Ok(())
    }

    /// LS-002: PingPong - every ping is echoed as a pong with the same params.
    ///
    /// **Assertion**: one pong per ping, in order, params unchanged.
    fn run_ping_pong(&self, harness: &mut IntegrationHarness) -> Result<(), Failure> {
        info!("LS-002: PingPong");

        let step = self.step_secs(harness);
        let rounds = ((self.max_duration_secs / step) as u64).clamp(1, 100);

        for seq in 1..=rounds {
            harness.send("ping", params(json!({ "seq": seq })))?;
            harness.advance_time_and_run(step)?;

            let replies = harness.receive()?;
            let expected = BcpMessage::new("pong", params(json!({ "seq": seq })));
            ensure(
                replies == vec![expected],
                format!("round {}: expected pong seq={}, got {:?}", seq, seq, replies),
            )?;
        }

        debug!("  {} ping/pong rounds completed", rounds);
        Ok(())
    }

    /// LS-003: TriggerStorm - seeded host tasks fire triggers at random times.
    ///
    /// **Assertion**: every trigger is dispatched exactly once, and the last
    /// dispatched one is the trigger due latest.
    fn run_trigger_storm(&self, harness: &mut IntegrationHarness) -> Result<(), Failure> {
        info!("LS-003: TriggerStorm");

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let count: u32 = rng.gen_range(10..=50);
        let window_ms = ((self.max_duration_secs * 1000.0) as u64).max(1);

        let endpoint = harness
            .host()
            .bcp()
            .get_named_client(LOCAL_DISPLAY)
            .ok_or_else(|| Failure(format!("host has no {} client", LOCAL_DISPLAY)))?;

        // Ties on send time resolve by registration order.
        let mut last = (0u64, 0u32);
        for index in 0..count {
            let delay_ms = rng.gen_range(0..window_ms);
            last = last.max((delay_ms, index));

            let endpoint = endpoint.clone();
            harness.host_mut().scheduler_mut().schedule_once(
                &format!("storm_trigger_{index}"),
                Duration::from_millis(delay_ms),
                move || {
                    let message = BcpMessage::new(
                        "trigger",
                        params(json!({ "name": STORM_EVENT, "index": index })),
                    );
                    endpoint.send(message)?;
                    Ok(())
                },
            );
        }
        info!("  {} triggers scheduled over {}ms", count, window_ms);

        let settle = 2.0 * self.step_secs(harness);
        harness.advance_time_and_run(window_ms as f64 / 1000.0 + settle)?;

        harness.recorder().assert_called(STORM_EVENT, Some(count))?;
        let last_index = harness
            .last_controller_event_params(STORM_EVENT)
            .and_then(|p| p.get("index").cloned());
        ensure(
            last_index == Some(Value::from(last.1)),
            format!("last trigger was {:?}, expected index {}", last_index, last.1),
        )?;
        Ok(())
    }

    /// LS-004: Teardown - after teardown the controller handles nothing.
    ///
    /// **Assertion**: no replies, no new ticks, observed counts frozen.
    fn run_teardown(&self, harness: &mut IntegrationHarness) -> Result<(), Failure> {
        info!("LS-004: Teardown");

        let ticks_before = harness.pump().tick_count();
        let connected_before = harness.controller_event_count("client_connected");
        harness.teardown();

        harness.send("hello", Params::new())?;
        harness.send("trigger", params(json!({ "name": STORM_EVENT })))?;
        harness.advance_time_and_run(self.max_duration_secs)?;

        let replies = harness.receive()?;
        ensure(replies.is_empty(), format!("controller replied after teardown: {:?}", replies))?;
        ensure(
            harness.pump().tick_count() == ticks_before,
            "pump ticked after teardown",
        )?;
        ensure(
            harness.controller_event_count("client_connected") == connected_before,
            "client_connected count changed after teardown",
        )?;
        harness.recorder().assert_not_called(STORM_EVENT)?;

        let controller = harness.controller();
        ensure(controller.is_stopped(), "controller not stopped")?;
        ensure(controller.event_loop().is_closed(), "event loop not closed")?;
        ensure(controller.window().is_none(), "window stand-in still held")?;
        Ok(())
    }

    fn step_secs(&self, harness: &IntegrationHarness) -> f64 {
        harness.pump().period().as_secs_f64()
    }
}

/// Failure reason of a scenario check.
#[derive(Debug)]
struct Failure(String);

impl<E: std::error::Error> From<E> for Failure {
    fn from(err: E) -> Self {
        Failure(err.to_string())
    }
}

fn ensure(condition: bool, reason: impl Into<String>) -> Result<(), Failure> {
    if condition {
        Ok(())
    } else {
        Err(Failure(reason.into()))
    }
}

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

fn collect_metrics(harness: &IntegrationHarness) -> ScenarioMetrics {
    let bridge = harness.bridge();
    ScenarioMetrics {
        messages_to_controller: bridge.sent_count(Direction::HostToController),
        messages_to_host: bridge.sent_count(Direction::ControllerToHost),
        events_observed: harness.recorder().total(),
        host_tasks_run: harness.host().scheduler().tasks_run(),
    }
}
