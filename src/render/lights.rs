//! Three-point light rig placed relative to the subject's bounding box.

use glam::Vec3;

use crate::config::LightRigConfig;
use crate::geometry::BoundingBox;
use crate::state::{Color, LightParams, LightingParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightRole {
    Key,
    Fill,
    Rim,
    SecondaryRim,
}

impl LightRole {
    /// Unit offset from the subject center. Key upper-left-front, fill
    /// upper-right-front, rims upper rear.
    pub fn direction(self) -> Vec3 {
        match self {
            LightRole::Key => Vec3::new(-1.0, 1.0, 1.0).normalize(),
            LightRole::Fill => Vec3::new(1.0, 0.5, 1.0).normalize(),
            LightRole::Rim => Vec3::new(0.5, 1.0, -1.0).normalize(),
            LightRole::SecondaryRim => Vec3::new(-0.5, 1.0, -1.0).normalize(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemisphereLight {
    pub sky: Color,
    pub ground: Color,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub role: LightRole,
    pub color: Color,
    pub intensity: f32,
    pub position: Vec3,
    pub target: Vec3,
}

impl DirectionalLight {
    /// Direction the light travels (position toward target).
    pub fn direction(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }
}

/// Either empty or fully populated; `build` is the only way to fill one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightSet {
    pub ambient: Option<AmbientLight>,
    pub hemisphere: Option<HemisphereLight>,
    pub directional: Vec<DirectionalLight>,
}

impl LightSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ambient.is_none() && self.hemisphere.is_none() && self.directional.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.ambient.is_some() && self.hemisphere.is_some() && self.directional.len() >= 3
    }

    pub fn len(&self) -> usize {
        self.ambient.iter().count() + self.hemisphere.iter().count() + self.directional.len()
    }

    pub fn clear(&mut self) {
        *self = Self::empty();
    }

    pub fn get(&self, role: LightRole) -> Option<&DirectionalLight> {
        self.directional.iter().find(|light| light.role == role)
    }
}

/// Distance of the directional lights from the subject center.
pub fn rig_radius(bounds: Option<&BoundingBox>, config: &LightRigConfig) -> f32 {
    bounds
        .map(|b| b.diagonal() * config.radius_multiplier)
        .filter(|radius| radius.is_finite() && *radius > 0.0)
        .unwrap_or(config.default_radius)
}

pub fn build(
    bounds: Option<&BoundingBox>,
    params: &LightingParams,
    config: &LightRigConfig,
) -> LightSet {
    let center = bounds.map(BoundingBox::center).unwrap_or(Vec3::ZERO);
    let radius = rig_radius(bounds, config);

    let place = |role: LightRole, light: &LightParams| DirectionalLight {
        role,
        color: light.color,
        intensity: light.intensity.max(0.0),
        position: center + role.direction() * radius,
        target: center,
    };

    let mut directional = vec![
        place(LightRole::Key, &params.key),
        place(LightRole::Fill, &params.fill),
        place(LightRole::Rim, &params.rim),
    ];
    if config.secondary_rim {
        directional.push(place(LightRole::SecondaryRim, &params.rim));
    }

    log::debug!(
        "light rig: {} directional at radius {:.3} around {:?}",
        directional.len(),
        radius,
        center
    );

    LightSet {
        ambient: Some(AmbientLight {
            color: config.ambient_color,
            intensity: config.ambient_intensity,
        }),
        hemisphere: Some(HemisphereLight {
            sky: config.hemisphere_sky,
            ground: config.hemisphere_ground,
            intensity: config.hemisphere_intensity,
        }),
        directional,
    }
}
