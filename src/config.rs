// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub engine: EngineConfig,
    pub assets: AssetsConfig,
    pub debug: DebugConfig,
}

/// Window settings (desktop host only)
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Mobile Renderer".to_string(),
            width: 720,
            height: 1280,
        }
    }
}

/// Settings the engine itself consumes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub app_name: String,
    /// Request VK_LAYER_KHRONOS_validation (must be installed)
    pub validation_layers: bool,
    pub clear_color: [f32; 4],
    /// Vertices emitted by the single draw call (the primitive lives in the shader)
    pub vertex_count: u32,
    /// Attach a depth buffer to the presentation chain
    pub depth_buffer: bool,
    pub vertex_shader: String,
    pub fragment_shader: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: "Mobile Renderer".to_string(),
            validation_layers: false,
            clear_color: [0.25, 0.3, 0.25, 1.0],
            vertex_count: 36,
            depth_buffer: true,
            vertex_shader: "shaders/shader.vert.spv".to_string(),
            fragment_shader: "shaders/shader.frag.spv".to_string(),
        }
    }
}

/// Asset location for the desktop host
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub root: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: "assets".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Log filter from the debug section
    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}', defaulting to info", self.debug.log_level);
            log::LevelFilter::Info
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("config.toml")).unwrap();

        assert_eq!(config.engine.vertex_count, 36);
        assert!(config.engine.depth_buffer);
        assert_eq!(config.engine.vertex_shader, "shaders/shader.vert.spv");
        assert_eq!(config.assets.root, "assets");
    }

    #[test]
    fn partial_file_keeps_unspecified_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [engine]
            vertex_count = 3
            depth_buffer = false

            [debug]
            log_level = "debug"
            "#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();

        assert_eq!(config.engine.vertex_count, 3);
        assert!(!config.engine.depth_buffer);
        assert_eq!(config.engine.clear_color, [0.25, 0.3, 0.25, 1.0]);
        assert_eq!(config.window.width, 720);
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine\nvertex_count = ").unwrap();

        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let mut config = Config::default();
        config.debug.log_level = "chatty".to_string();

        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }
}
