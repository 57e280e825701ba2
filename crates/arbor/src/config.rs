//! Root configuration.
//!
//! Everything the root needs before the first frame: window parameters,
//! frame pacing, where assets live and the initial blackboard values.
//! Build it in code with the `with_*` methods or load it from JSON:
//!
//! ```json
//! {
//!   "name": "game",
//!   "title": "Dino",
//!   "width": 960,
//!   "height": 540,
//!   "settings": { "gravity": 2400.0 }
//! }
//! ```
//!
//! Missing fields take their defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::math::Color;
use crate::services::Blackboard;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    /// Name of the root node, the address for root control mail.
    pub name: String,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub resizable: bool,
    pub icon: Option<PathBuf>,
    /// Sleep between frames.
    pub frame_delay_ms: u64,
    /// Report this many milliseconds as every frame's delta.
    pub fixed_step_ms: Option<u64>,
    pub assets_dir: PathBuf,
    pub clear_color: Color,
    /// Initial blackboard values, applied over the built-in seeds.
    pub settings: HashMap<String, f32>,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            name: "game".into(),
            title: "arbor".into(),
            width: 960,
            height: 540,
            x: 100,
            y: 100,
            resizable: false,
            icon: None,
            frame_delay_ms: 16,
            fixed_step_ms: None,
            assets_dir: PathBuf::from("assets/"),
            clear_color: Color::rgb(0.97, 0.97, 0.97),
            settings: HashMap::new(),
        }
    }
}

impl RootConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_position(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_icon(mut self, icon: impl Into<PathBuf>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_frame_delay_ms(mut self, ms: u64) -> Self {
        self.frame_delay_ms = ms;
        self
    }

    pub fn with_fixed_step_ms(mut self, ms: u64) -> Self {
        self.fixed_step_ms = Some(ms);
        self
    }

    pub fn with_assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = dir.into();
        self
    }

    pub fn with_clear_color(mut self, color: Color) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: f32) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Blackboard seeded with the arcade defaults, then `settings`.
    pub fn blackboard(&self) -> Blackboard {
        let mut bb = Blackboard::new();
        bb.set("ground_y", 420.0);
        bb.set("gravity", 2400.0);
        bb.set("scroll_speed", 420.0);
        for (k, v) in &self.settings {
            bb.set(k.clone(), *v);
        }
        bb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_arcade_window() {
        let cfg = RootConfig::default();
        assert_eq!(cfg.name, "game");
        assert_eq!((cfg.width, cfg.height), (960, 540));
        assert_eq!((cfg.x, cfg.y), (100, 100));
        let bb = cfg.blackboard();
        assert_eq!(bb.get("ground_y", 0.0), 420.0);
        assert_eq!(bb.get("gravity", 0.0), 2400.0);
        assert_eq!(bb.get("scroll_speed", 0.0), 420.0);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg = RootConfig::from_json(
            r#"{ "title": "Dino", "settings": { "gravity": 1000.0, "lives": 3.0 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.title, "Dino");
        assert_eq!(cfg.width, 960);
        let bb = cfg.blackboard();
        assert_eq!(bb.get("gravity", 0.0), 1000.0);
        assert_eq!(bb.get("lives", 0.0), 3.0);
        assert_eq!(bb.get("ground_y", 0.0), 420.0);
    }

    #[test]
    fn json_round_trip_and_bad_input() {
        let cfg = RootConfig::new("root").with_size(320, 200).with_fixed_step_ms(16);
        let back = RootConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(back.name, "root");
        assert_eq!(back.fixed_step_ms, Some(16));

        assert!(matches!(
            RootConfig::from_json("{ not json"),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            RootConfig::from_file("/no/such/config.json"),
            Err(EngineError::Config(_))
        ));
    }
}
