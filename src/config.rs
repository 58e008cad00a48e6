// src/config.rs

//! Configuration surface consumed by the window management core.
//!
//! These structs deserialize from a JSON config file. Defaults match the
//! behavior of running with no configuration at all: auto output selection,
//! decorated windows, no forced stacking.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete configuration for the stereoscopic output core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Window placement and WM negotiation settings.
    pub window: WindowConfig,
    /// Initial equalizer knob values.
    pub equalizer: EqualizerConfig,
}

/// Window placement and WM negotiation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Fullscreen-type override tokens applied over the probed WM
    /// capabilities, in order. Recognized tokens: `layer`, `layer=<0..15>`,
    /// `above`, `below`, `fullscreen`, `stays_on_top`, `netwm`, `none`; a
    /// leading `-` negates. Malformed entries are ignored.
    pub fstype: Vec<String>,
    /// Target output index for fullscreen placement; -1 selects the output
    /// containing the window center.
    pub screen: i32,
    /// Keep the window above others even when windowed.
    pub ontop: bool,
    /// Keep window-manager decorations when windowed.
    pub border: bool,
    /// Lock the window's aspect ratio via WM size hints.
    pub keepaspect: bool,
    /// Externally supplied window to render into. When set, window creation
    /// and all WM negotiation are the embedder's responsibility. The value 0
    /// means the root window.
    pub window_id: Option<u64>,
    /// Hide the pointer after one second of inactivity over the window.
    pub mouse_autohide: bool,
    /// Do not select mouse button events at all.
    pub nomouse_input: bool,
    /// Window title, shared by both eyes.
    pub title: String,
    /// WM_CLASS resource name.
    pub classname: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            fstype: Vec::new(),
            screen: -1,
            ontop: false,
            border: true,
            keepaspect: false,
            window_id: None,
            mouse_autohide: true,
            nomouse_input: false,
            title: "stereovo".to_string(),
            classname: "stereovo".to_string(),
        }
    }
}

/// Initial equalizer knob values, each in [-100, 100] with 0 neutral.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EqualizerConfig {
    pub brightness: i32,
    pub contrast: i32,
    pub gamma: i32,
}

impl Config {
    /// Loads a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// True when an external window handle is in use (embedding).
    pub fn is_embedded(&self) -> bool {
        self.window.window_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_windowed_and_decorated() {
        let config = Config::default();
        assert_eq!(config.window.screen, -1);
        assert!(config.window.border);
        assert!(!config.window.ontop);
        assert!(!config.is_embedded());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"window": {"ontop": true, "fstype": ["fullscreen"]}}"#)
                .unwrap();
        assert!(config.window.ontop);
        assert_eq!(config.window.fstype, vec!["fullscreen"]);
        assert_eq!(config.window.screen, -1);
        assert_eq!(config.equalizer.gamma, 0);
    }

    #[test]
    fn embedded_flag_tracks_window_id() {
        let config: Config = serde_json::from_str(r#"{"window": {"window_id": 0}}"#).unwrap();
        assert!(config.is_embedded());
    }
}
