//! Configuration surface of the host and controller subsystems.
//!
//! These structs are consumed verbatim: the harness only forces the few
//! switches that select mock collaborators (no real BCP servers, the
//! `bridge` transport for the display connection).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default window size when neither `displays.window` nor `window` sets one.
pub const DEFAULT_WINDOW_WIDTH: u32 = 800;
pub const DEFAULT_WINDOW_HEIGHT: u32 = 600;

/// Launch options handed to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerOptions {
    /// Machine/installation folder
    pub machine_path: PathBuf,

    /// Controller config file, relative to `machine_path`
    pub mcconfigfile: String,

    /// Host machine config file, relative to `machine_path`
    pub configfile: String,

    /// Production mode (quieter, no debugging aids)
    pub production: bool,

    /// Ignore any cached config
    pub no_load_cache: bool,

    /// Write the config cache after loading
    pub create_config_cache: bool,

    /// Start real BCP network servers
    pub bcp: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            machine_path: PathBuf::from("machine"),
            mcconfigfile: "mcconfig.yaml".to_string(),
            configfile: "config.yaml".to_string(),
            production: false,
            no_load_cache: false,
            create_config_cache: true,
            bcp: true,
        }
    }
}

/// Partial window settings as they appear in config sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub top: Option<i32>,
    pub left: Option<i32>,
    pub fullscreen: Option<bool>,
}

impl WindowSettings {
    /// Overlays every field set in `other` onto `self`.
    fn update(&mut self, other: &WindowSettings) {
        if other.width.is_some() {
            self.width = other.width;
        }
        if other.height.is_some() {
            self.height = other.height;
        }
        if other.top.is_some() {
            self.top = other.top;
        }
        if other.left.is_some() {
            self.left = other.left;
        }
        if other.fullscreen.is_some() {
            self.fullscreen = other.fullscreen;
        }
    }
}

/// Where the window is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowPosition {
    /// Let the platform decide
    Auto,
    /// Explicit `top`/`left` placement
    Custom { top: i32, left: i32 },
}

/// Fully resolved window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedWindow {
    pub width: u32,
    pub height: u32,
    pub position: WindowPosition,
    pub fullscreen: bool,
}

/// Controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Launch options
    pub options: ControllerOptions,

    /// Application name (becomes the window title)
    pub app_name: String,

    /// Name of the UI root built at startup; `None` means no root artifact
    pub root_widget: Option<String>,

    /// Top-level `window:` section
    pub window: Option<WindowSettings>,

    /// `displays:` section; the `window` display feeds the window settings
    pub displays: BTreeMap<String, WindowSettings>,

    /// Assets loaded one per idle cycle before initialization completes
    pub assets: Vec<String>,

    /// Idle cycles the bootstrap waits for initialization before giving up
    pub max_init_cycles: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            options: ControllerOptions::default(),
            app_name: "lockstep".to_string(),
            root_widget: Some("root".to_string()),
            window: Some(WindowSettings::default()),
            displays: BTreeMap::new(),
            assets: Vec::new(),
            max_init_cycles: 100,
        }
    }
}

impl ControllerConfig {
    /// Resolves the window settings.
    ///
    /// Defaults are overlaid first with `displays.window`, then with the
    /// top-level `window` section. When both `top` and `left` end up set the
    /// position becomes custom.
    ///
    /// # Returns
    /// `None` when neither section exists, i.e. no window can be created.
    pub fn resolve_window(&self) -> Option<ResolvedWindow> {
        let display = self.displays.get("window");
        if display.is_none() && self.window.is_none() {
            return None;
        }

        let mut merged = WindowSettings::default();
        if let Some(display) = display {
            merged.update(display);
        }
        if let Some(window) = &self.window {
            merged.update(window);
        }

        let position = match (merged.top, merged.left) {
            (Some(top), Some(left)) => WindowPosition::Custom { top, left },
            _ => WindowPosition::Auto,
        };

        Some(ResolvedWindow {
            width: merged.width.unwrap_or(DEFAULT_WINDOW_WIDTH),
            height: merged.height.unwrap_or(DEFAULT_WINDOW_HEIGHT),
            position,
            fullscreen: merged.fullscreen.unwrap_or(false),
        })
    }
}

/// One named BCP connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Transport type looked up in the `TransportRegistry`
    #[serde(rename = "type")]
    pub kind: String,
}

impl ConnectionConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

/// Host-side BCP configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BcpConfig {
    /// Outbound connections by client name
    pub connections: BTreeMap<String, ConnectionConfig>,

    /// Listening servers; must be empty when real networking is unavailable
    pub servers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_window_and_root() {
        let config = ControllerConfig::default();
        assert_eq!(config.root_widget.as_deref(), Some("root"));

        let window = config.resolve_window().unwrap();
        assert_eq!(window.width, DEFAULT_WINDOW_WIDTH);
        assert_eq!(window.height, DEFAULT_WINDOW_HEIGHT);
        assert_eq!(window.position, WindowPosition::Auto);
    }

    #[test]
    fn test_resolve_window_without_sections() {
        let config = ControllerConfig {
            window: None,
            ..Default::default()
        };
        assert!(config.resolve_window().is_none());
    }

    #[test]
    fn test_window_section_overrides_display() {
        let mut config = ControllerConfig {
            window: Some(WindowSettings {
                width: Some(1024),
                top: Some(10),
                ..Default::default()
            }),
            ..Default::default()
        };
        config.displays.insert(
            "window".to_string(),
            WindowSettings {
                width: Some(640),
                height: Some(480),
                left: Some(20),
                ..Default::default()
            },
        );

        let window = config.resolve_window().unwrap();
        assert_eq!(window.width, 1024);
        assert_eq!(window.height, 480);
        assert_eq!(window.position, WindowPosition::Custom { top: 10, left: 20 });
    }

    #[test]
    fn test_display_only_window() {
        let mut config = ControllerConfig {
            window: None,
            ..Default::default()
        };
        config.displays.insert(
            "window".to_string(),
            WindowSettings {
                top: Some(5),
                ..Default::default()
            },
        );

        let window = config.resolve_window().unwrap();
        assert_eq!(window.position, WindowPosition::Auto);
    }

    #[test]
    fn test_bcp_config_from_json() {
        let config: BcpConfig = serde_json::from_str(
            r#"{"connections": {"local_display": {"type": "bridge"}}}"#,
        )
        .unwrap();

        assert_eq!(config.connections["local_display"].kind, "bridge");
        assert!(config.servers.is_empty());
    }
}
