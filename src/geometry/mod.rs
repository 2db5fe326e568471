//! Geometry builder: SVG outlines to a centered, extruded solid.

pub mod extrude;
pub mod shapes;
pub mod svg;

use glam::Vec3;

use crate::state::{ExtrusionParams, MAX_SEGMENTS};
pub use shapes::Shape2D;
pub use svg::SvgError;

/// Used when the extrusion parameters leave curve resolution unset.
pub const DEFAULT_CURVE_SEGMENTS: u32 = 12;

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("svg: {0}")]
    Svg(#[from] SvgError),
    #[error("cap tessellation failed: {0}")]
    Tessellation(String),
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl Iterator<Item = Vec3>) -> Option<Self> {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        let mut has_points = false;

        for p in points {
            min = min.min(p);
            max = max.max(p);
            has_points = true;
        }

        has_points.then_some(Self { min, max })
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn diagonal(&self) -> f32 {
        self.size().length()
    }

    pub fn max_extent(&self) -> f32 {
        self.size().max_element()
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// Triangle soup with per-vertex normals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Solid {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl Solid {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.positions.iter().copied())
    }

    /// Z extent of the bounding box, 0 for an empty solid.
    pub fn depth(&self) -> f32 {
        self.bounds().map(|b| b.size().z).unwrap_or(0.0)
    }

    pub fn translate(&mut self, offset: Vec3) {
        for p in &mut self.positions {
            *p += offset;
        }
    }

    /// Moves the bounding-box center to the origin on every axis.
    pub fn recenter(&mut self) {
        if let Some(bounds) = self.bounds() {
            self.translate(-bounds.center());
        }
    }
}

/// Parses `svg` into shapes using the curve resolution in `params`.
pub fn parse_shapes(svg: &str, params: &ExtrusionParams) -> Result<Vec<Shape2D>, GeometryError> {
    let segments = params
        .curve_segments
        .unwrap_or(DEFAULT_CURVE_SEGMENTS)
        .clamp(1, MAX_SEGMENTS);
    let sets = svg::parse_document(svg, segments)?;
    Ok(shapes::shapes_from_sets(&sets))
}

/// Extrudes every shape into one solid and recenters it. No shapes yields an
/// empty solid.
pub fn extrude_shapes(shapes: &[Shape2D], params: &ExtrusionParams) -> Result<Solid, GeometryError> {
    let mut solid = Solid::default();
    for shape in shapes {
        extrude::extrude_shape(shape, params, &mut solid)?;
    }
    solid.recenter();
    Ok(solid)
}

/// Full pipeline. Callers pre-scale depth and bevel lengths; nothing here
/// rescales.
pub fn build(svg: &str, params: &ExtrusionParams) -> Result<Solid, GeometryError> {
    let shapes = parse_shapes(svg, params)?;
    let solid = extrude_shapes(&shapes, params)?;
    if let Some(bounds) = solid.bounds() {
        log::debug!(
            "built solid: {} shape(s), {} triangles, size {:?}",
            shapes.len(),
            solid.triangle_count(),
            bounds.size()
        );
    }
    Ok(solid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const OFFSET_SQUARE: &str =
        r#"<svg><path d="M100 100 H140 V120 H100 Z"/></svg>"#;

    fn flat(depth: f32) -> ExtrusionParams {
        ExtrusionParams {
            depth,
            bevel_enabled: false,
            ..ExtrusionParams::default()
        }
    }

    #[test]
    fn solid_is_centered_regardless_of_source_offset() {
        let solid = build(OFFSET_SQUARE, &flat(10.0)).unwrap();
        let bounds = solid.bounds().unwrap();
        assert_abs_diff_eq!(bounds.center().x, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(bounds.center().y, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(bounds.center().z, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(bounds.size().x, 40.0, epsilon = 1e-4);
        assert_abs_diff_eq!(bounds.size().y, 20.0, epsilon = 1e-4);
        assert_abs_diff_eq!(solid.depth(), 10.0, epsilon = 1e-4);
    }

    #[test]
    fn empty_input_gives_empty_solid() {
        let params = ExtrusionParams::default();
        assert!(build("", &params).unwrap().is_empty());
        assert!(build("<svg></svg>", &params).unwrap().is_empty());
        assert!(build("<svg><path d=\"\"/></svg>", &params).unwrap().is_empty());
        assert_eq!(Solid::default().depth(), 0.0);
    }

    #[test]
    fn malformed_path_is_an_error() {
        let err = build("<svg><path d=\"M 0 0 L x\"/></svg>", &flat(1.0)).unwrap_err();
        assert!(matches!(err, GeometryError::Svg(_)));
    }

    #[test]
    fn oversized_curve_resolution_is_capped() {
        let params = ExtrusionParams {
            curve_segments: Some(u32::MAX / 2),
            ..flat(1.0)
        };
        let shapes = parse_shapes(r#"<svg><circle r="5"/></svg>"#, &params).unwrap();
        assert_eq!(shapes.len(), 1);
        assert!(shapes[0].outer.len() <= 8 * MAX_SEGMENTS as usize + 1);

        let solid = build(r#"<svg><circle r="5"/></svg>"#, &params).unwrap();
        assert_abs_diff_eq!(solid.bounds().unwrap().size().x, 10.0, epsilon = 1e-3);
    }

    #[test]
    fn bevel_adds_thickness_on_both_sides() {
        let params = ExtrusionParams::default();
        let solid = build(OFFSET_SQUARE, &params).unwrap();
        assert_abs_diff_eq!(solid.depth(), 11.0, epsilon = 1e-4);
        assert_abs_diff_eq!(solid.bounds().unwrap().size().x, 41.0, epsilon = 1e-3);
    }

    #[test]
    fn zero_bevel_size_does_not_produce_nan() {
        let params = ExtrusionParams {
            bevel_size: 0.0,
            bevel_thickness: 0.0,
            depth: 0.0,
            ..ExtrusionParams::default()
        };
        let solid = build(OFFSET_SQUARE, &params).unwrap();
        assert!(!solid.is_empty());
        assert!(solid.positions.iter().all(|p| p.is_finite()));
        assert!(solid.normals.iter().all(|n| n.is_finite()));
    }

    #[test]
    fn bounding_box_helpers() {
        let bounds = BoundingBox::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(bounds.center(), Vec3::ZERO);
        assert_eq!(bounds.max_extent(), 6.0);
        assert!(bounds.contains(Vec3::new(0.5, 0.5, 0.5)));
        assert!(!bounds.contains(Vec3::new(0.5, 3.0, 0.5)));
        let other = BoundingBox::new(Vec3::splat(2.0), Vec3::splat(4.0));
        assert_eq!(bounds.union(&other).max, Vec3::splat(4.0));
        assert!(BoundingBox::from_points(std::iter::empty()).is_none());
    }
}
