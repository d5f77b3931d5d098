//! Window and UI-root stand-ins.
//!
//! The controller renders nothing; these record what a real display would
//! have been created with so startup can be validated.

use crate::config::{ResolvedWindow, WindowPosition};

/// Window-equivalent stand-in.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub position: WindowPosition,
    pub fullscreen: bool,
    widgets: Vec<String>,
}

impl Window {
    /// Creates a window from resolved settings, titled with `app_name`.
    pub fn create(settings: &ResolvedWindow, app_name: &str) -> Self {
        Self {
            title: app_name.to_string(),
            width: settings.width,
            height: settings.height,
            position: settings.position,
            fullscreen: settings.fullscreen,
            widgets: Vec::new(),
        }
    }

    /// Attaches a widget by name.
    pub fn add_widget(&mut self, name: &str) {
        self.widgets.push(name.to_string());
    }

    pub fn widgets(&self) -> &[String] {
        &self.widgets
    }

    /// Removes every attached widget.
    pub fn clear(&mut self) {
        self.widgets.clear();
    }
}

/// UI-root stand-in built from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootWidget {
    pub name: String,
}

impl RootWidget {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_titled_with_app_name() {
        let settings = ResolvedWindow {
            width: 320,
            height: 240,
            position: WindowPosition::Auto,
            fullscreen: false,
        };

        let mut window = Window::create(&settings, "Attract Mode");
        window.add_widget("root");

        assert_eq!(window.title, "Attract Mode");
        assert_eq!(window.widgets(), ["root".to_string()]);

        window.clear();
        assert!(window.widgets().is_empty());
    }
}
