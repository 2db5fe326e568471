//! Tunable viewer constants, loadable from a JSON file.

use std::path::Path;

use crate::state::{Background, Color, FOV_MAX, FOV_MIN};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 75.0,
            near: 0.01,
            far: 1000.0,
            position: [0.0, 0.2, 2.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Multiplier on the fitted distance; must exceed 1.
    pub padding: f32,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self { padding: 1.2 }
    }
}

/// Idle sway. Angles in radians, speed in radians per second of play time.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OrbitConfig {
    pub amplitude_theta: f32,
    pub amplitude_phi: f32,
    pub speed: f32,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            amplitude_theta: 0.2,
            amplitude_phi: 0.03,
            speed: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LightRigConfig {
    pub ambient_color: Color,
    pub ambient_intensity: f32,
    pub hemisphere_sky: Color,
    pub hemisphere_ground: Color,
    pub hemisphere_intensity: f32,
    /// Directional lights sit this many bounding-box diagonals from the center.
    pub radius_multiplier: f32,
    /// Light distance used before any mesh exists.
    pub default_radius: f32,
    pub secondary_rim: bool,
}

impl Default for LightRigConfig {
    fn default() -> Self {
        Self {
            ambient_color: Color::WHITE,
            ambient_intensity: 0.3,
            hemisphere_sky: Color::WHITE,
            hemisphere_ground: Color::rgb(0x44 as f32 / 255.0, 0x44 as f32 / 255.0, 0x44 as f32 / 255.0),
            hemisphere_intensity: 0.5,
            radius_multiplier: 1.5,
            default_radius: 5.0,
            secondary_rim: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
    pub background: Background,
    /// Fixed tick rate used by the headless frame driver.
    pub frame_rate: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 1200,
            background: Background::Dark,
            frame_rate: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub camera: CameraConfig,
    pub framing: FramingConfig,
    pub orbit: OrbitConfig,
    pub lights: LightRigConfig,
    pub output: OutputConfig,
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: ViewerConfig = serde_json::from_str(&json)?;
        config.validate()?;
        log::debug!("loaded viewer config from {}", path.display());
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if !(self.framing.padding > 1.0) {
            return invalid(format!(
                "framing.padding must be greater than 1, got {}",
                self.framing.padding
            ));
        }
        if self.output.width == 0 || self.output.height == 0 {
            return invalid(format!(
                "output size must be non-zero, got {}x{}",
                self.output.width, self.output.height
            ));
        }
        if self.output.frame_rate == 0 {
            return invalid("output.frame_rate must be non-zero".to_string());
        }
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            return invalid(format!(
                "camera clip range must satisfy 0 < near < far, got {}..{}",
                self.camera.near, self.camera.far
            ));
        }
        if !(FOV_MIN..=FOV_MAX).contains(&self.camera.fov) {
            return invalid(format!(
                "camera.fov must be within {FOV_MIN}..={FOV_MAX}, got {}",
                self.camera.fov
            ));
        }
        if !(self.lights.radius_multiplier > 0.0 && self.lights.default_radius > 0.0) {
            return invalid("light radii must be positive".to_string());
        }
        if !(self.orbit.amplitude_theta.is_finite()
            && self.orbit.amplitude_phi.is_finite()
            && self.orbit.speed.is_finite())
        {
            return invalid("orbit constants must be finite".to_string());
        }
        Ok(())
    }
}
