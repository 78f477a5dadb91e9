//! Layered engine configuration: compiled-in defaults, an optional TOML
//! file, then environment variable overrides for deployment-variable
//! fields .

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub canvas: CanvasConfig,
    pub artnet: ArtNetConfig,
    pub delta: DeltaConfig,
    pub preview: PreviewConfig,
    pub plugins: PluginConfig,
    pub frame_source: FrameSourceConfig,
    pub sequence: SequenceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            artnet: ArtNetConfig::default(),
            delta: DeltaConfig::default(),
            preview: PreviewConfig::default(),
            plugins: PluginConfig::default(),
            frame_source: FrameSourceConfig::default(),
            sequence: SequenceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtNetConfig {
    pub target_ip: String,
    pub broadcast: bool,
    pub net: u8,
    pub subnet: u8,
    pub start_universe: u16,
}

impl Default for ArtNetConfig {
    fn default() -> Self {
        Self {
            target_ip: "255.255.255.255".to_string(),
            broadcast: true,
            net: 0,
            subnet: 0,
            start_universe: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    pub enabled: bool,
    pub threshold: u8,
    pub full_frame_interval: u32,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 8,
            full_frame_interval: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewQuality {
    Low,
    Medium,
    High,
}

impl PreviewQuality {
    pub fn jpeg_quality(self) -> u8 {
        match self {
            PreviewQuality::Low => 60,
            PreviewQuality::Medium => 80,
            PreviewQuality::High => 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub quality: PreviewQuality,
    pub base_fps_per_client: f32,
    pub fps_cap: f32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            quality: PreviewQuality::Medium,
            base_fps_per_client: 5.0,
            fps_cap: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub search_paths: Vec<PathBuf>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            search_paths: vec![dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("prismcast")
                .join("plugins")],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSourceConfig {
    pub default_fps: f32,
    pub null_fill_color: (u8, u8, u8),
}

impl Default for FrameSourceConfig {
    fn default() -> Self {
        Self {
            default_fps: 30.0,
            null_fill_color: (0, 0, 0),
        }
    }
}

/// The Sequence Engine's dedicated ticker thread runs independent
/// of any player's FPS; `tick_hz` governs how often registered Sequences
/// recompute and write their target parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub tick_hz: f32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self { tick_hz: 30.0 }
    }
}

impl EngineConfig {
    /// Load defaults, then a TOML file if present, then environment
    /// variable overrides. A missing file is not an error -- every field
    /// has a documented default .
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = EngineConfig::default();

        if let Some(path) = path {
            if path.exists() {
                let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                config = toml::from_str(&text).map_err(|e| ConfigError::Parse {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            } else {
                log::info!(
                    "config file {} not found, using defaults",
                    path.display()
                );
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(paths) = std::env::var("PRISMCAST_PLUGIN_PATHS") {
            self.plugins.search_paths =
                std::env::split_paths(&paths).map(PathBuf::from).collect();
        }
        if let Ok(ip) = std::env::var("PRISMCAST_ARTNET_TARGET_IP") {
            self.artnet.target_ip = ip;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load(Some(Path::new("/nonexistent/prismcast.toml"))).unwrap();
        assert_eq!(config.canvas.width, 64);
        assert_eq!(config.delta.full_frame_interval, 30);
    }

    #[test]
    fn env_override_wins_over_file_defaults() {
        std::env::set_var("PRISMCAST_ARTNET_TARGET_IP", "10.0.0.5");
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.artnet.target_ip, "10.0.0.5");
        std::env::remove_var("PRISMCAST_ARTNET_TARGET_IP");
    }
}
