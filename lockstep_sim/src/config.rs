//! HarnessConfig - everything one harness instance is built from.

use crate::bridge::BRIDGE_TRANSPORT;
use crate::clock::DEFAULT_ORIGIN_UNIX_SECS;
use crate::error::HarnessError;
use crate::harness::LOCAL_DISPLAY;

use lockstep_core::{BcpConfig, ConnectionConfig, ControllerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Configuration for a harness run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Seed for the session id and for scenario inputs
    pub seed: u64,

    /// Controller pump rate, in ticks per virtual second
    pub fps: u32,

    /// Virtual seconds run right after setup so startup events settle
    pub settle_secs: f64,

    /// Virtual time a test is expected to stay under; exceeding it is logged
    pub expected_duration_secs: f64,

    /// Wall-clock time of virtual time 0, in Unix seconds
    pub origin_unix_secs: Option<u64>,

    /// Controller configuration
    pub controller: ControllerConfig,

    /// Host BCP configuration
    pub bcp: BcpConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            fps: 30,
            settle_secs: 1.0,
            expected_duration_secs: 60.0,
            origin_unix_secs: None,
            controller: ControllerConfig::default(),
            bcp: BcpConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Parses a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, HarnessError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the pump rate.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Checks the harness-level numbers and the bridged connection.
    /// Controller settings are checked by the controller itself during
    /// startup.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let extra_bridged = self
            .bcp
            .connections
            .iter()
            .find(|(name, connection)| connection.kind == BRIDGE_TRANSPORT && name.as_str() != LOCAL_DISPLAY);
        if let Some((name, _)) = extra_bridged {
            return Err(HarnessError::config(format!(
                "connection '{}' cannot use the '{}' transport; only '{}' is linked to the controller",
                name, BRIDGE_TRANSPORT, LOCAL_DISPLAY
            )));
        }
        if self.fps == 0 {
            return Err(HarnessError::config("fps must be at least 1"));
        }
        if !self.settle_secs.is_finite() || self.settle_secs < 0.0 {
            return Err(HarnessError::config(format!(
                "settle_secs must be a non-negative number, got {}",
                self.settle_secs
            )));
        }
        if !self.expected_duration_secs.is_finite() || self.expected_duration_secs <= 0.0 {
            return Err(HarnessError::config(format!(
                "expected_duration_secs must be positive, got {}",
                self.expected_duration_secs
            )));
        }
        Ok(())
    }

    /// Wall-clock time that virtual time 0 maps to.
    pub fn origin(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.origin_unix_secs.unwrap_or(DEFAULT_ORIGIN_UNIX_SECS))
    }

    /// Host BCP config with the display connection routed over the bridge
    /// and no listening servers.
    pub(crate) fn bridged_bcp(&self) -> BcpConfig {
        let mut bcp = self.bcp.clone();
        bcp.connections
            .insert(LOCAL_DISPLAY.to_string(), ConnectionConfig::new(BRIDGE_TRANSPORT));
        bcp.servers.clear();
        bcp
    }

    /// Controller config with real BCP servers switched off.
    pub(crate) fn offline_controller(&self) -> ControllerConfig {
        let mut controller = self.controller.clone();
        controller.options.bcp = false;
        controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.fps, 30);
        assert_eq!(config.expected_duration_secs, 60.0);
        assert_eq!(config.origin(), UNIX_EPOCH + Duration::from_secs(DEFAULT_ORIGIN_UNIX_SECS));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = HarnessConfig::from_json_str(
            r#"{
                "fps": 60,
                "controller": { "app_name": "attract", "window": { "width": 1024, "top": 10, "left": 20 } },
                "bcp": { "connections": { "backbox": { "type": "socket" } } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.fps, 60);
        assert_eq!(config.seed, 42);
        assert_eq!(config.controller.app_name, "attract");
        assert_eq!(config.controller.resolve_window().unwrap().width, 1024);
        assert!(config.bcp.connections.contains_key("backbox"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            HarnessConfig::from_json_str(r#"{ "fps": 0 }"#),
            Err(HarnessError::Config(_))
        ));
        assert!(matches!(
            HarnessConfig::from_json_str(r#"{ "settle_secs": -1.0 }"#),
            Err(HarnessError::Config(_))
        ));
        assert!(matches!(HarnessConfig::from_json_str("not json"), Err(HarnessError::Config(_))));
    }

    #[test]
    fn test_second_bridged_client_rejected() {
        let result = HarnessConfig::from_json_str(
            r#"{ "bcp": { "connections": { "backbox": { "type": "bridge" } } } }"#,
        );
        assert!(matches!(result, Err(HarnessError::Config(msg)) if msg.contains("backbox")));

        let mut config = HarnessConfig::default();
        config
            .bcp
            .connections
            .insert(LOCAL_DISPLAY.into(), ConnectionConfig::new(BRIDGE_TRANSPORT));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = HarnessConfig::from_json_file("/nonexistent/lockstep.json");
        assert!(matches!(result, Err(HarnessError::Io(_))));
    }

    #[test]
    fn test_bridged_bcp_forces_display_and_drops_servers() {
        let mut config = HarnessConfig::default();
        config.bcp.servers.push("mc".into());
        config
            .bcp
            .connections
            .insert(LOCAL_DISPLAY.into(), ConnectionConfig::new("socket"));

        let bcp = config.bridged_bcp();

        assert!(bcp.servers.is_empty());
        assert_eq!(bcp.connections[LOCAL_DISPLAY].kind, BRIDGE_TRANSPORT);
        assert!(!config.offline_controller().options.bcp);
    }
}
