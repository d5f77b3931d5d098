//! ControllerBootstrap - synchronous controller startup inside the harness.
//!
//! The real controller would open a window and block in its own main loop.
//! Here the startup sequence runs step by step, and the controller is handed
//! back ready to be pumped by the host scheduler.

use crate::bridge::{Side, TransportBridge};
use crate::error::BootstrapError;
use crate::harness::LOCAL_DISPLAY;

use lockstep_core::{BcpInterface, ControllerConfig, EventLoop, MediaController};
use lockstep_env::{Clock, TransportEndpoint};
use std::sync::Arc;
use tracing::{debug, info};

/// Startup sequence for a `MediaController` with injected collaborators.
#[derive(Debug, Clone)]
pub struct ControllerBootstrap {
    config: ControllerConfig,
    client_name: String,
}

impl ControllerBootstrap {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            client_name: LOCAL_DISPLAY.to_string(),
        }
    }

    /// Pairs the controller with a host client other than `local_display`.
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Builds and starts the controller.
    ///
    /// On success the controller has completed initialization, its BCP
    /// processor is enabled and a `client_connected` event is queued for the
    /// first pump tick. Any failure aborts startup; no half-built controller
    /// is returned.
    pub fn run<C: Clock>(
        &self,
        clock: Arc<C>,
        bridge: &Arc<TransportBridge>,
        host: &BcpInterface,
    ) -> Result<MediaController<C>, BootstrapError> {
        if self.config.options.bcp {
            return Err(BootstrapError::RealServersRequested);
        }
        if host.get_named_client(&self.client_name).is_none() {
            return Err(BootstrapError::HostEndpointMissing(self.client_name.clone()));
        }

        let transport = Arc::new(bridge.endpoint(Side::Controller, "bcp")) as Arc<dyn TransportEndpoint>;
        let mut controller = MediaController::new(self.config.clone(), clock, transport, EventLoop::new());

        controller.load_config().map_err(BootstrapError::Config)?;

        let root = controller.build().ok_or(BootstrapError::MissingRoot)?;
        let window = controller.create_window().ok_or(BootstrapError::MissingWindow)?;
        controller.attach_display(window, root);
        controller.start();

        let max_cycles = self.config.max_init_cycles;
        let mut cycles = 0;
        while !controller.is_init_done() {
            if cycles >= max_cycles {
                return Err(BootstrapError::InitTimeout { cycles });
            }
            controller.idle().map_err(BootstrapError::Idle)?;
            cycles += 1;
        }
        debug!("Controller initialized after {} idle cycles", cycles);

        controller.enable_bcp();
        controller.connect_client();

        info!(
            "Controller '{}' started, paired with host client '{}'",
            controller.get_application_name(),
            self.client_name
        );
        Ok(controller)
    }
}
