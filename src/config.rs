//! Configuration parsing and management for Kagami

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, KagamiError};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub face: ChannelConfig,
    pub pose: ChannelConfig,
    pub hand: ChannelConfig,
    pub models: ModelConfig,
    pub hud: HudConfig,
    pub mapper: MapperTuning,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            face: ChannelConfig::face_default(),
            pose: ChannelConfig::pose_default(),
            hand: ChannelConfig::hand_default(),
            models: ModelConfig::default(),
            hud: HudConfig::default(),
            mapper: MapperTuning::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, KagamiError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, KagamiError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, KagamiError> {
        let paths = [
            PathBuf::from("config.toml"),
            PathBuf::from("config/default.toml"),
            dirs_path().join("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), KagamiError> {
        for (name, channel) in [
            ("face", &self.face),
            ("pose", &self.pose),
            ("hand", &self.hand),
        ] {
            if channel.max_fps <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("{name}.max_fps"),
                    message: "Maximum FPS must be greater than 0".to_string(),
                }
                .into());
            }
            if !(0.0..=1.0).contains(&channel.smoothing_alpha) {
                return Err(ConfigError::InvalidValue {
                    field: format!("{name}.smoothing_alpha"),
                    message: "Smoothing alpha must be between 0.0 and 1.0".to_string(),
                }
                .into());
            }
        }

        if !(0.0..=1.0).contains(&self.mapper.expression_blend) {
            return Err(ConfigError::InvalidValue {
                field: "mapper.expression_blend".to_string(),
                message: "Blend ratio must be between 0.0 and 1.0".to_string(),
            }
            .into());
        }

        if self.mapper.render_fps <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "mapper.render_fps".to_string(),
                message: "Render FPS must be greater than 0".to_string(),
            }
            .into());
        }

        if self.mapper.max_head_angle_deg <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "mapper.max_head_angle_deg".to_string(),
                message: "Maximum head angle must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Capture device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Requested resolution tier
    pub resolution: ResolutionTier,
    /// Mirror the image horizontally (selfie view)
    pub mirror: bool,
    /// Camera device index
    pub device: u32,
    /// Milliseconds to wait for the first playable frame before proceeding
    pub first_frame_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            resolution: ResolutionTier::Auto,
            mirror: true,
            device: 0,
            first_frame_timeout_ms: 3000,
        }
    }
}

/// Capture resolution presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    /// Let the device pick
    Auto,
    /// 320x240
    Low,
    /// 640x480
    Medium,
    /// 1280x720
    High,
}

impl Default for ResolutionTier {
    fn default() -> Self {
        Self::Auto
    }
}

impl ResolutionTier {
    /// Preferred dimensions, or None for auto
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Auto => None,
            Self::Low => Some((320, 240)),
            Self::Medium => Some((640, 480)),
            Self::High => Some((1280, 720)),
        }
    }
}

/// Per-tracking-channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Enable this tracking channel
    pub enabled: bool,
    /// Maximum processed frames per second; faster frames are skipped
    pub max_fps: f32,
    /// Landmark EMA blend weight (1.0 = no smoothing)
    pub smoothing_alpha: f32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::face_default()
    }
}

impl ChannelConfig {
    pub fn face_default() -> Self {
        Self {
            enabled: true,
            max_fps: 30.0,
            smoothing_alpha: 0.6,
        }
    }

    pub fn pose_default() -> Self {
        Self {
            enabled: false,
            max_fps: 20.0,
            smoothing_alpha: 0.5,
        }
    }

    pub fn hand_default() -> Self {
        Self {
            enabled: false,
            max_fps: 20.0,
            smoothing_alpha: 0.5,
        }
    }
}

/// Model asset resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory holding bundled/cached model files
    pub dir: PathBuf,
    /// Remote base URL for the fallback asset tier
    pub base_url: String,
    /// Fileset version string shared across all channels
    pub version: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            base_url: "https://assets.kagami.dev/models".to_string(),
            version: "v1".to_string(),
        }
    }
}

/// HUD overlay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    /// Visualization mode: points, wireframe, or mask
    pub mode: HudMode,
    /// Draw the dense low-opacity mesh overlay in wireframe mode
    pub mesh_overlay: bool,
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            mode: HudMode::Points,
            mesh_overlay: false,
        }
    }
}

/// HUD visualization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HudMode {
    /// Every landmark as a marker, feature subsets color-coded
    Points,
    /// Contour edge lists, optionally with a dense mesh overlay
    Wireframe,
    /// Filled silhouette with eye/mouth cutouts
    Mask,
}

impl Default for HudMode {
    fn default() -> Self {
        Self::Points
    }
}

/// Rig mapper smoothing and blending tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperTuning {
    /// Render tick rate for parameter writes (decoupled from inference)
    #[serde(default = "default_60_0")]
    pub render_fps: f32,

    // --- Two-stage smoothing ---
    /// Stage 1: EMA weight applied to raw solved values (input noise knob)
    #[serde(default = "default_0_5")]
    pub raw_alpha: f32,
    /// Stage 1 weight for expressive sub-channels (mouth, brows)
    #[serde(default = "default_0_7")]
    pub raw_alpha_expressive: f32,
    /// Stage 2: lerp factor toward the target per tick (responsiveness knob)
    #[serde(default = "default_0_35")]
    pub output_factor: f32,

    // --- Secondary signal ---
    /// Blend ratio for the expression classifier in mouth shape:
    /// 0.0 = geometry only, 1.0 = classifier only
    #[serde(default = "default_0_4")]
    pub expression_blend: f32,

    // --- Derived channels ---
    /// Body sway as a fraction of head angle
    #[serde(default = "default_0_3")]
    pub body_sway_factor: f32,
    /// Cheek blush intensity from the smile score
    #[serde(default = "default_0_6")]
    pub blush_intensity: f32,

    // --- Absence handling ---
    /// Lerp factor toward neutral when a channel's input disappears
    #[serde(default = "default_0_1")]
    pub decay_factor: f32,

    // --- Range ---
    /// Head rotation clamp in degrees, per axis
    #[serde(default = "default_30_0")]
    pub max_head_angle_deg: f32,
}

fn default_60_0() -> f32 {
    60.0
}
fn default_0_5() -> f32 {
    0.5
}
fn default_0_7() -> f32 {
    0.7
}
fn default_0_35() -> f32 {
    0.35
}
fn default_0_4() -> f32 {
    0.4
}
fn default_0_3() -> f32 {
    0.3
}
fn default_0_6() -> f32 {
    0.6
}
fn default_0_1() -> f32 {
    0.1
}
fn default_30_0() -> f32 {
    30.0
}

impl Default for MapperTuning {
    fn default() -> Self {
        Self {
            render_fps: default_60_0(),
            raw_alpha: default_0_5(),
            raw_alpha_expressive: default_0_7(),
            output_factor: default_0_35(),
            expression_blend: default_0_4(),
            body_sway_factor: default_0_3(),
            blush_intensity: default_0_6(),
            decay_factor: default_0_1(),
            max_head_angle_deg: default_30_0(),
        }
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("kagami");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/kagami");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/kagami");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("kagami");
        }
    }

    PathBuf::from(".")
}
