pub mod serialization;

use std::fmt;

/// sRGB color carried as a CSS hex string on the wire (`#rgb` or `#rrggbb`).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid hex color '{0}'")]
pub struct ColorParseError(pub String);

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(value: &str) -> Result<Self, ColorParseError> {
        let err = || ColorParseError(value.to_string());
        let digits = value.trim().strip_prefix('#').ok_or_else(err)?;
        let channel = |text: &str| u8::from_str_radix(text, 16).map_err(|_| err());
        let (r, g, b) = match digits.len() {
            3 => {
                let expand = |index: usize| channel(&digits[index..index + 1].repeat(2));
                (expand(0)?, expand(1)?, expand(2)?)
            }
            6 => (
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            ),
            _ => return Err(err()),
        };
        Ok(Self::rgb(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
        ))
    }

    pub fn to_hex(&self) -> String {
        let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", byte(self.r), byte(self.g), byte(self.b))
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Upper bound for every subdivision count (curve samples, body steps and
/// bevel rings). Larger requests are clamped to it.
pub const MAX_SEGMENTS: u32 = 256;

/// Solid generation controls. Lengths share the unit of the source geometry.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtrusionParams {
    pub depth: f32,
    pub bevel_enabled: bool,
    pub bevel_thickness: f32,
    pub bevel_size: f32,
    pub bevel_segments: u32,
    pub bevel_offset: f32,
    pub curve_segments: Option<u32>,
    pub steps: Option<u32>,
}

impl Default for ExtrusionParams {
    fn default() -> Self {
        Self {
            depth: 10.0,
            bevel_enabled: true,
            bevel_thickness: 0.5,
            bevel_size: 0.5,
            bevel_segments: 4,
            bevel_offset: 0.0,
            curve_segments: Some(24),
            steps: Some(1),
        }
    }
}

impl ExtrusionParams {
    /// Applies the host's geometry scale hint to the length fields that depend on it.
    pub fn scaled(&self, geometry_scale: f32) -> Self {
        let scale = if geometry_scale.is_finite() && geometry_scale > 0.0 {
            geometry_scale
        } else {
            1.0
        };
        Self {
            depth: self.depth * scale,
            bevel_thickness: self.bevel_thickness * scale,
            bevel_size: self.bevel_size * scale,
            ..self.clone()
        }
    }

    fn sanitized(&self) -> Self {
        Self {
            depth: non_negative(self.depth),
            bevel_enabled: self.bevel_enabled,
            bevel_thickness: non_negative(self.bevel_thickness),
            bevel_size: non_negative(self.bevel_size),
            bevel_segments: self.bevel_segments.min(MAX_SEGMENTS),
            bevel_offset: non_negative(self.bevel_offset),
            curve_segments: self
                .curve_segments
                .map(|segments| segments.clamp(1, MAX_SEGMENTS)),
            steps: self.steps.map(|steps| steps.clamp(1, MAX_SEGMENTS)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    #[default]
    Standard,
    Physical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Front,
    Back,
    #[default]
    Double,
}

pub const IOR_MIN: f32 = 1.0;
pub const IOR_MAX: f32 = 2.33;

/// Surface shading controls. `thickness` and `attenuation_distance` are
/// normalized and rescaled against the solid's depth by the material factory.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaterialParams {
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    pub color: Color,
    pub emissive: Color,
    pub emissive_intensity: f32,
    pub opacity: f32,
    pub metalness: f32,
    pub roughness: f32,
    pub transparent: bool,
    pub transmission: f32,
    pub thickness: f32,
    pub ior: f32,
    pub attenuation_color: Color,
    pub attenuation_distance: f32,
    pub side: Side,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            kind: MaterialKind::Standard,
            color: Color::rgb(1.0, 215.0 / 255.0, 0.0),
            emissive: Color::BLACK,
            emissive_intensity: 1.0,
            opacity: 1.0,
            metalness: 1.0,
            roughness: 0.23,
            transparent: true,
            transmission: 0.0,
            thickness: 0.0,
            ior: 1.5,
            attenuation_color: Color::WHITE,
            attenuation_distance: 1.0,
            side: Side::Double,
        }
    }
}

impl MaterialParams {
    fn sanitized(&self) -> Self {
        Self {
            emissive_intensity: non_negative(self.emissive_intensity),
            opacity: unit(self.opacity),
            metalness: unit(self.metalness),
            roughness: unit(self.roughness),
            transmission: unit(self.transmission),
            thickness: unit(self.thickness),
            ior: finite_or(self.ior, 1.5).clamp(IOR_MIN, IOR_MAX),
            attenuation_distance: unit(self.attenuation_distance),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LightParams {
    pub color: Color,
    pub intensity: f32,
}

impl LightParams {
    pub const fn white(intensity: f32) -> Self {
        Self {
            color: Color::WHITE,
            intensity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LightingParams {
    pub key: LightParams,
    pub fill: LightParams,
    pub rim: LightParams,
}

impl Default for LightingParams {
    fn default() -> Self {
        Self {
            key: LightParams::white(5.0),
            fill: LightParams::white(2.5),
            rim: LightParams::white(0.5),
        }
    }
}

pub const FOV_MIN: f32 = 40.0;
pub const FOV_MAX: f32 = 100.0;

/// `zoom` is read back from the viewer and never applied as input.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CameraParams {
    pub fov: f32,
    pub zoom: f32,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self { fov: 75.0, zoom: 5.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    #[default]
    Dark,
    Light,
}

impl Background {
    pub fn clear_color(self) -> [f32; 4] {
        match self {
            Background::Dark => [0.07, 0.07, 0.08, 1.0],
            Background::Light => [0.95, 0.95, 0.96, 1.0],
        }
    }
}

/// Full parameter snapshot owned by the UI layer.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterState {
    pub svg: String,
    pub geometry_scale: f32,
    pub playing: bool,
    pub background: Background,
    pub extrusion: ExtrusionParams,
    pub material: MaterialParams,
    pub lighting: LightingParams,
    pub camera: CameraParams,
}

impl Default for ParameterState {
    fn default() -> Self {
        Self {
            svg: String::new(),
            geometry_scale: 1.0,
            playing: true,
            background: Background::Dark,
            extrusion: ExtrusionParams::default(),
            material: MaterialParams::default(),
            lighting: LightingParams::default(),
            camera: CameraParams::default(),
        }
    }
}

/// A slice of ParameterState that maps onto one viewer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSlice {
    Svg,
    Extrusion,
    Material,
    Lighting,
    Camera,
    Playing,
}

impl ParameterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with every numeric field clamped into its valid range.
    pub fn sanitized(&self) -> Self {
        let lighting = |light: &LightParams| LightParams {
            color: light.color,
            intensity: non_negative(light.intensity),
        };
        Self {
            svg: self.svg.clone(),
            geometry_scale: if self.geometry_scale.is_finite() && self.geometry_scale > 0.0 {
                self.geometry_scale
            } else {
                1.0
            },
            playing: self.playing,
            background: self.background,
            extrusion: self.extrusion.sanitized(),
            material: self.material.sanitized(),
            lighting: LightingParams {
                key: lighting(&self.lighting.key),
                fill: lighting(&self.lighting.fill),
                rim: lighting(&self.lighting.rim),
            },
            camera: CameraParams {
                fov: finite_or(self.camera.fov, 75.0).clamp(FOV_MIN, FOV_MAX),
                zoom: non_negative(self.camera.zoom),
            },
        }
    }

    /// Slices that differ from `previous`. Geometry scale changes count as an
    /// extrusion change since they rescale depth and bevel.
    pub fn changed_slices(&self, previous: &ParameterState) -> Vec<StateSlice> {
        let mut slices = Vec::new();
        if self.svg != previous.svg {
            slices.push(StateSlice::Svg);
        }
        if self.extrusion != previous.extrusion || self.geometry_scale != previous.geometry_scale
        {
            slices.push(StateSlice::Extrusion);
        }
        if self.material != previous.material {
            slices.push(StateSlice::Material);
        }
        if self.lighting != previous.lighting {
            slices.push(StateSlice::Lighting);
        }
        if self.camera.fov != previous.camera.fov {
            slices.push(StateSlice::Camera);
        }
        if self.playing != previous.playing {
            slices.push(StateSlice::Playing);
        }
        slices
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn non_negative(value: f32) -> f32 {
    finite_or(value, 0.0).max(0.0)
}

fn unit(value: f32) -> f32 {
    finite_or(value, 0.0).clamp(0.0, 1.0)
}
