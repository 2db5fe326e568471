//! Material factory: maps material parameters onto a surface description,
//! rescaling the physical variant's normalized sliders against solid depth.

use crate::geometry::Solid;
use crate::state::{Color, MaterialKind, MaterialParams, Side, IOR_MAX, IOR_MIN};

/// Floor for degenerate (flat) solids and for the thickness slider.
pub const DEPTH_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    /// Draw front faces only.
    Back,
    /// Draw back faces only.
    Front,
    None,
}

impl From<Side> for CullMode {
    fn from(side: Side) -> Self {
        match side {
            Side::Front => CullMode::Back,
            Side::Back => CullMode::Front,
            Side::Double => CullMode::None,
        }
    }
}

/// Refraction terms of the physical variant, in scene units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transmission {
    pub transmission: f32,
    pub thickness: f32,
    pub ior: f32,
    pub attenuation_color: Color,
    pub attenuation_distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMaterial {
    pub kind: MaterialKind,
    pub base_color: Color,
    pub emissive: Color,
    pub emissive_intensity: f32,
    pub metalness: f32,
    pub roughness: f32,
    pub transparent: bool,
    pub opacity: f32,
    pub cull: CullMode,
    pub transmission: Option<Transmission>,
}

impl SurfaceMaterial {
    /// Coverage used when blending; opaque unless the transparent flag is set.
    pub fn alpha(&self) -> f32 {
        let base = if self.transparent { self.opacity } else { 1.0 };
        match &self.transmission {
            Some(t) => base * (1.0 - 0.5 * t.transmission),
            None => base,
        }
    }

    pub fn emissive_radiance(&self) -> [f32; 3] {
        let e = self.emissive.to_array();
        [
            e[0] * self.emissive_intensity,
            e[1] * self.emissive_intensity,
            e[2] * self.emissive_intensity,
        ]
    }
}

/// `clamp(thickness, ε, 1) * depth`, depth floored at ε.
pub fn absolute_thickness(normalized: f32, depth: f32) -> f32 {
    normalized.clamp(DEPTH_EPSILON, 1.0) * depth.max(DEPTH_EPSILON)
}

/// `(0.01 + 4.99 * clamp(distance, 0, 1)) * max(depth, ε)`. The curve is
/// tuned by eye and kept as is.
pub fn absolute_attenuation_distance(normalized: f32, depth: f32) -> f32 {
    (0.01 + 4.99 * normalized.clamp(0.0, 1.0)) * depth.max(DEPTH_EPSILON)
}

pub fn build(solid: &Solid, params: &MaterialParams) -> SurfaceMaterial {
    build_for_depth(solid.depth(), params)
}

pub fn build_for_depth(depth: f32, params: &MaterialParams) -> SurfaceMaterial {
    let transmission = match params.kind {
        MaterialKind::Standard => None,
        MaterialKind::Physical => Some(Transmission {
            transmission: params.transmission.clamp(0.0, 1.0),
            thickness: absolute_thickness(params.thickness, depth),
            ior: params.ior.clamp(IOR_MIN, IOR_MAX),
            attenuation_color: params.attenuation_color,
            attenuation_distance: absolute_attenuation_distance(params.attenuation_distance, depth),
        }),
    };

    SurfaceMaterial {
        kind: params.kind,
        base_color: params.color,
        emissive: params.emissive,
        emissive_intensity: params.emissive_intensity.max(0.0),
        metalness: params.metalness.clamp(0.0, 1.0),
        roughness: params.roughness.clamp(0.0, 1.0),
        transparent: params.transparent,
        opacity: params.opacity.clamp(0.0, 1.0),
        cull: params.side.into(),
        transmission,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn thickness_scales_with_depth() {
        assert_relative_eq!(absolute_thickness(0.5, 10.0), 5.0);
        assert_relative_eq!(absolute_thickness(2.0, 10.0), 10.0);
        assert_relative_eq!(absolute_thickness(0.0, 10.0), DEPTH_EPSILON * 10.0, max_relative = 1e-5);
        assert!(absolute_thickness(0.5, 0.0) > 0.0);
    }

    #[test]
    fn attenuation_distance_curve() {
        assert_relative_eq!(absolute_attenuation_distance(0.0, 10.0), 0.1, max_relative = 1e-5);
        assert_relative_eq!(absolute_attenuation_distance(1.0, 10.0), 50.0, max_relative = 1e-5);
        assert_relative_eq!(
            absolute_attenuation_distance(1.0, 0.0),
            5.0 * DEPTH_EPSILON,
            max_relative = 1e-5
        );
    }

    #[test]
    fn standard_material_has_no_transmission() {
        let material = build_for_depth(10.0, &MaterialParams::default());
        assert_eq!(material.kind, MaterialKind::Standard);
        assert!(material.transmission.is_none());
        assert_eq!(material.cull, CullMode::None);
        assert_eq!(material.alpha(), 1.0);
    }

    #[test]
    fn physical_material_derives_absolute_units() {
        let params = MaterialParams {
            kind: MaterialKind::Physical,
            thickness: 0.5,
            attenuation_distance: 0.2,
            transmission: 1.0,
            ior: 9.0,
            side: Side::Front,
            ..MaterialParams::default()
        };
        let material = build_for_depth(10.0, &params);
        let t = material.transmission.unwrap();
        assert_relative_eq!(t.thickness, 5.0);
        assert_relative_eq!(t.attenuation_distance, (0.01 + 4.99 * 0.2) * 10.0, max_relative = 1e-5);
        assert_eq!(t.ior, IOR_MAX);
        assert_eq!(material.cull, CullMode::Back);
    }

    #[test]
    fn emissive_radiance_scales_color() {
        let params = MaterialParams {
            emissive: Color::rgb(1.0, 0.5, 0.0),
            emissive_intensity: 2.0,
            ..MaterialParams::default()
        };
        assert_eq!(build_for_depth(1.0, &params).emissive_radiance(), [2.0, 1.0, 0.0]);
    }
}
