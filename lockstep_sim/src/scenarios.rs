//! Built-in harness scenarios.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// LS-001: Startup completes and the client connects exactly once
    Connect,

    /// LS-002: Host pings, controller echoes each ping as a pong
    PingPong,

    /// LS-003: Seeded burst of host-scheduled triggers, all delivered in order
    TriggerStorm,

    /// LS-004: Nothing reaches the controller after teardown
    Teardown,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Connect,
            ScenarioId::PingPong,
            ScenarioId::TriggerStorm,
            ScenarioId::Teardown,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Connect => "connect",
            ScenarioId::PingPong => "ping_pong",
            ScenarioId::TriggerStorm => "trigger_storm",
            ScenarioId::Teardown => "teardown",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Connect => "Bootstrap, first tick delivers client_connected once, hello round trip",
            ScenarioId::PingPong => "Host pings with a sequence number, controller replies pong with the same params",
            ScenarioId::TriggerStorm => "Seeded random triggers sent from host tasks, counted and ordered on the controller",
            ScenarioId::Teardown => "After teardown no message is handled and no observed event fires",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "connect" | "ls-001" => Ok(ScenarioId::Connect),
            "ping_pong" | "pingpong" | "ls-002" => Ok(ScenarioId::PingPong),
            "trigger_storm" | "triggerstorm" | "ls-003" => Ok(ScenarioId::TriggerStorm),
            "teardown" | "ls-004" => Ok(ScenarioId::Teardown),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
