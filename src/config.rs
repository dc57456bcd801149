// =============================================================================
// CONFIGURATION - Load settings from vkwrap.toml
// =============================================================================
//
// Every section is optional; missing keys fall back to the defaults below.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

use crate::vk::ValidationType;

pub const CONFIG_FILE: &str = "vkwrap.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Names reported to the driver through the application info
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub engine_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "vkwrap".to_string(),
            engine_name: "vkwrap".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vkwrap".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    /// Swapchain image count; 0 keeps the surface minimum
    pub image_count: u32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.1, 0.1, 0.1, 1.0],
            max_frames_in_flight: 2,
            image_count: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// "none", "debug" (debug builds only) or "always"
    pub validation: String,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation: "debug".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from vkwrap.toml, falling back to defaults
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE).unwrap_or_else(|e| {
            log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_FILE, e);
            Config::default()
        })
    }

    /// Load configuration from a specific path. A missing file gives the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Present mode as Vulkan enum. Unknown names fall back to FIFO,
    /// the one mode every surface supports.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            other => {
                log::warn!("Unknown present mode '{}', defaulting to FIFO", other);
                vk::PresentModeKHR::FIFO
            }
        }
    }

    pub fn validation_type(&self) -> ValidationType {
        match self.debug.validation.to_lowercase().as_str() {
            "none" | "off" => ValidationType::None,
            "debug" => ValidationType::Debug,
            "always" | "on" => ValidationType::Always,
            other => {
                log::warn!("Unknown validation type '{}', defaulting to debug", other);
                ValidationType::Debug
            }
        }
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}', defaulting to info", self.debug.log_level);
            log::LevelFilter::Info
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.graphics.max_frames_in_flight.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn partial_sections() {
        let config = Config::parse(
            r#"
            [window]
            title = "Triangle"
            width = 640

            [graphics]
            present_mode = "Mailbox"
            clear_color = [0.0, 0.0, 0.0, 1.0]

            [debug]
            validation = "always"
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Triangle");
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(config.validation_type(), ValidationType::Always);
        assert_eq!(config.log_filter(), log::LevelFilter::Debug);
        assert_eq!(config.app, AppConfig::default());
    }

    #[test]
    fn unknown_values_fall_back() {
        let mut config = Config::default();
        config.graphics.present_mode = "vsync-ish".into();
        config.debug.validation = "sometimes".into();
        config.debug.log_level = "loud".into();
        config.graphics.max_frames_in_flight = 0;

        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.validation_type(), ValidationType::Debug);
        assert_eq!(config.log_filter(), log::LevelFilter::Info);
        assert_eq!(config.frames_in_flight(), 1);
    }

    #[test]
    fn bad_toml_is_error() {
        assert!(Config::parse("[window\nwidth = 1").is_err());
        assert!(Config::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("no/such/vkwrap.toml").unwrap();
        assert_eq!(config, Config::default());
    }
}
