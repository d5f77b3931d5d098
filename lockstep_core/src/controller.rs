//! MediaController - the controller subsystem.
//!
//! The controller keeps its own event loop (timers), an event bus and a BCP
//! processor fed by an injected transport. It never blocks: all work happens
//! in `idle()`, one pass per call.
//!
//! # Idle pass
//!
//! ```text
//! idle()
//!   ├─ run due timers              (EventLoop, against the shared clock)
//!   ├─ advance initialization      (load one asset, then mark init done)
//!   ├─ drain BCP transport         (handle each command, then acknowledge it)
//!   └─ dispatch queued events      (EventBus)
//! ```

use crate::config::ControllerConfig;
use crate::display::{RootWidget, Window};
use crate::error::CoreError;
use crate::event_bus::EventBus;
use crate::event_loop::{EventLoop, TimerHandle};

use lockstep_env::{BcpMessage, Clock, Params, TransportEndpoint};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// BCP protocol version reported in `hello`.
pub const BCP_VERSION: &str = "1.1";

/// What a single idle pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleReport {
    pub timers_run: usize,
    pub messages_handled: usize,
    pub events_dispatched: usize,
}

/// The controller subsystem.
///
/// Generic over the clock so it reads virtual time under the harness and
/// wall-clock time in production.
pub struct MediaController<C: Clock> {
    config: ControllerConfig,
    clock: Arc<C>,
    transport: Arc<dyn TransportEndpoint>,
    events: EventBus,
    event_loop: EventLoop,
    window: Option<Window>,
    root: Option<RootWidget>,
    pending_assets: VecDeque<String>,
    loaded_assets: Vec<String>,
    config_loaded: bool,
    started: bool,
    init_done: bool,
    bcp_enabled: bool,
    client_connected: bool,
    stopped: bool,
    frame: u64,
}

impl<C: Clock> MediaController<C> {
    /// Creates a controller with its clock, transport and event loop injected.
    pub fn new(
        config: ControllerConfig,
        clock: Arc<C>,
        transport: Arc<dyn TransportEndpoint>,
        event_loop: EventLoop,
    ) -> Self {
        Self {
            config,
            clock,
            transport,
            events: EventBus::new(),
            event_loop,
            window: None,
            root: None,
            pending_assets: VecDeque::new(),
            loaded_assets: Vec::new(),
            config_loaded: false,
            started: false,
            init_done: false,
            bcp_enabled: false,
            client_connected: false,
            stopped: false,
            frame: 0,
        }
    }

    /// Validates the configuration and queues the assets to load.
    pub fn load_config(&mut self) -> Result<(), CoreError> {
        let options = &self.config.options;
        if options.machine_path.as_os_str().is_empty() {
            return Err(CoreError::config("machine_path must not be empty"));
        }
        if self.config.app_name.trim().is_empty() {
            return Err(CoreError::config("app_name must not be empty"));
        }
        if self.config.max_init_cycles == 0 {
            return Err(CoreError::config("max_init_cycles must be at least 1"));
        }

        info!(
            "Loading controller config {} from {} (production={}, no_load_cache={}, create_config_cache={})",
            options.mcconfigfile,
            options.machine_path.display(),
            options.production,
            options.no_load_cache,
            options.create_config_cache,
        );

        self.pending_assets = self.config.assets.iter().cloned().collect();
        self.config_loaded = true;
        Ok(())
    }

    /// Builds the UI root from config. `None` if no root is configured.
    pub fn build(&self) -> Option<RootWidget> {
        self.config.root_widget.as_deref().map(RootWidget::new)
    }

    /// Creates the window stand-in. `None` if no window section is configured.
    pub fn create_window(&self) -> Option<Window> {
        self.config
            .resolve_window()
            .map(|settings| Window::create(&settings, self.get_application_name()))
    }

    /// Attaches the root to the window and keeps both.
    pub fn attach_display(&mut self, mut window: Window, root: RootWidget) {
        window.add_widget(&root.name);
        debug!("Window '{}' {}x{} holds root '{}'", window.title, window.width, window.height, root.name);
        self.window = Some(window);
        self.root = Some(root);
    }

    /// Marks the application started; initialization proceeds on idle.
    pub fn start(&mut self) {
        self.started = true;
        self.events.post("on_start", Params::new());
    }

    /// Runs one non-blocking pass of the controller loop.
    pub fn idle(&mut self) -> Result<IdleReport, CoreError> {
        if self.stopped {
            return Ok(IdleReport::default());
        }
        self.frame += 1;

        let timers_run = self.event_loop.run_due(self.clock.now(), &mut self.events);
        self.advance_init();
        let messages_handled = if self.bcp_enabled { self.process_bcp()? } else { 0 };
        let events_dispatched = self.events.process_queue();

        Ok(IdleReport {
            timers_run,
            messages_handled,
            events_dispatched,
        })
    }

    fn advance_init(&mut self) {
        if self.init_done || !self.started {
            return;
        }

        if let Some(asset) = self.pending_assets.pop_front() {
            debug!("Loaded asset '{}'", asset);
            let mut params = Params::new();
            params.insert("name".into(), Value::from(asset.as_str()));
            self.events.post("asset_loaded", params);
            self.loaded_assets.push(asset);
        }

        if self.pending_assets.is_empty() && self.window.is_some() && self.root.is_some() {
            self.init_done = true;
            info!("Controller initialization complete at frame {}", self.frame);
            self.events.post("init_done", Params::new());
        }
    }

    fn process_bcp(&mut self) -> Result<usize, CoreError> {
        let messages = self.transport.drain();
        let count = messages.len();
        for message in messages {
            self.handle_bcp(message)?;
        }
        Ok(count)
    }

    fn handle_bcp(&mut self, mut message: BcpMessage) -> Result<(), CoreError> {
        debug!("controller <- {}", message.command);

        match message.command.as_str() {
            "hello" => {
                let mut params = Params::new();
                params.insert("version".into(), Value::from(BCP_VERSION));
                params.insert("controller_name".into(), Value::from(self.config.app_name.as_str()));
                self.send("hello", params)?;
            }
            "ping" => {
                self.send("pong", message.params.clone())?;
            }
            "reset" => {
                self.events.post("bcp_reset", Params::new());
                self.send("reset_complete", Params::new())?;
            }
            "trigger" => self.handle_trigger(&message),
            "client_connected" => {
                self.connect_client();
            }
            "goodbye" => {
                if self.client_connected {
                    self.client_connected = false;
                    self.events.post("client_disconnected", Params::new());
                }
            }
            other => {
                warn!("Unknown BCP command '{}'", other);
                if !self.config.options.production {
                    let mut params = Params::new();
                    params.insert("command".into(), Value::from(other));
                    self.events.post("bcp_unknown_command", params);
                }
            }
        }

        message.acknowledge();
        Ok(())
    }

    fn handle_trigger(&mut self, message: &BcpMessage) {
        let mut params = message.params.clone();
        let Some(Value::String(name)) = params.remove("name") else {
            warn!("BCP trigger without a name ignored");
            return;
        };
        if let Some(rawbytes) = &message.rawbytes {
            params.insert("rawbytes".into(), Value::from(rawbytes.clone()));
        }
        self.events.post(&name, params);
    }

    /// Sends a command to the host.
    pub fn send(&self, command: &str, params: Params) -> Result<(), CoreError> {
        debug!("controller -> {}", command);
        self.transport.send(BcpMessage::new(command, params))?;
        Ok(())
    }

    /// Starts draining the BCP transport on idle.
    pub fn enable_bcp(&mut self) {
        self.bcp_enabled = true;
    }

    /// Marks the BCP client connected.
    ///
    /// # Returns
    /// True on the transition only; `client_connected` is posted at most
    /// once per connection.
    pub fn connect_client(&mut self) -> bool {
        if self.client_connected {
            return false;
        }
        self.client_connected = true;
        self.events.post("client_connected", Params::new());
        true
    }

    /// Releases the window and root stand-ins and every handler.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Some(window) = self.window.as_mut() {
            window.clear();
        }
        self.window = None;
        self.root = None;
        self.events.clear();
        info!("Controller stopped after {} frames", self.frame);
    }

    /// Closes the controller's event loop.
    pub fn close_event_loop(&mut self) {
        self.event_loop.close();
    }

    /// Schedules a controller timer `delay` from now.
    pub fn schedule_once(
        &mut self,
        delay: Duration,
        callback: impl FnMut(&mut EventBus) + Send + 'static,
    ) -> Result<TimerHandle, CoreError> {
        self.event_loop.schedule_once(self.clock.now(), delay, callback)
    }

    /// Schedules a periodic controller timer.
    pub fn schedule_interval(
        &mut self,
        interval: Duration,
        callback: impl FnMut(&mut EventBus) + Send + 'static,
    ) -> Result<TimerHandle, CoreError> {
        self.event_loop.schedule_interval(self.clock.now(), interval, callback)
    }

    /// Queues an event on the controller's bus.
    pub fn post_event(&mut self, event: &str, params: Params) {
        self.events.post(event, params);
    }

    pub fn get_application_name(&self) -> &str {
        &self.config.app_name
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<C> {
        &self.clock
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_ref()
    }

    pub fn root(&self) -> Option<&RootWidget> {
        self.root.as_ref()
    }

    pub fn loaded_assets(&self) -> &[String] {
        &self.loaded_assets
    }

    pub fn is_config_loaded(&self) -> bool {
        self.config_loaded
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// One-shot readiness signal: true once startup has fully completed.
    pub fn is_init_done(&self) -> bool {
        self.init_done
    }

    pub fn is_bcp_enabled(&self) -> bool {
        self.bcp_enabled
    }

    pub fn is_connected(&self) -> bool {
        self.client_connected
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Idle passes run so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }
}
