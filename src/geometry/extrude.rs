//! Solid generation: side walls along Z with an optional rounded bevel, plus
//! triangulated front and back caps.

use std::f32::consts::{FRAC_PI_2, SQRT_2};

use glam::{Vec2, Vec3};
use lyon::geom::point;
use lyon::path::Path;
use lyon::tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, VertexBuffers,
};

use super::shapes::Shape2D;
use super::{GeometryError, Solid};
use crate::state::{ExtrusionParams, MAX_SEGMENTS};

/// One ring of the extrusion profile: a z position and how far the outline is
/// pushed outwards at that z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layer {
    pub z: f32,
    pub offset: f32,
}

/// Back bevel, body steps, then front bevel. Without a bevel only the body
/// remains, spanning `0..=depth`.
pub fn profile(params: &ExtrusionParams) -> Vec<Layer> {
    let (segments, thickness, size, offset) = if params.bevel_enabled {
        (
            params.bevel_segments.min(MAX_SEGMENTS),
            params.bevel_thickness,
            params.bevel_size,
            params.bevel_offset,
        )
    } else {
        (0, 0.0, 0.0, 0.0)
    };
    let steps = params.steps.unwrap_or(1).clamp(1, MAX_SEGMENTS);
    let depth = params.depth;

    let bevel = |b: u32| {
        let angle = b as f32 / segments as f32 * FRAC_PI_2;
        (thickness * angle.cos(), size * angle.sin() + offset)
    };

    let capacity = segments.saturating_mul(2).saturating_add(steps) as usize + 1;
    let mut layers = Vec::with_capacity(capacity);
    for b in 0..segments {
        let (z, offset) = bevel(b);
        layers.push(Layer { z: -z, offset });
    }
    for s in 0..=steps {
        layers.push(Layer {
            z: depth * s as f32 / steps as f32,
            offset: size + offset,
        });
    }
    for b in (0..segments).rev() {
        let (z, offset) = bevel(b);
        layers.push(Layer {
            z: depth + z,
            offset,
        });
    }
    layers
}

/// Appends the walls and caps of `shape` to `solid`.
pub fn extrude_shape(
    shape: &Shape2D,
    params: &ExtrusionParams,
    solid: &mut Solid,
) -> Result<(), GeometryError> {
    let layers = profile(params);
    let (Some(back), Some(front)) = (layers.first().copied(), layers.last().copied()) else {
        return Ok(());
    };

    let rings: Vec<(&Vec<Vec2>, Vec<Vec2>)> = shape
        .contours()
        .map(|ring| (ring, bevel_vectors(ring)))
        .collect();

    for (ring, bevel) in &rings {
        push_walls(ring, bevel, &layers, solid);
    }
    push_cap(&rings, back, false, solid)?;
    push_cap(&rings, front, true, solid)?;
    Ok(())
}

fn outward(edge: Vec2) -> Vec2 {
    Vec2::new(edge.y, -edge.x).normalize_or_zero()
}

/// Per-vertex miter directions pointing away from the filled region. Outers
/// are CCW and holes CW, so the right-hand normal is outward for both.
fn bevel_vectors(ring: &[Vec2]) -> Vec<Vec2> {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let prev = ring[(i + n - 1) % n];
            let here = ring[i];
            let next = ring[(i + 1) % n];
            let n0 = outward(here - prev);
            let n1 = outward(next - here);
            let sum = n0 + n1;
            if sum.length_squared() < 1e-12 {
                return n0;
            }
            let direction = sum.normalize();
            let miter = direction / direction.dot(n0).max(1e-3);
            // Sharp corners would shoot far out; cap the miter length.
            if miter.length_squared() > 2.0 {
                direction * SQRT_2
            } else {
                miter
            }
        })
        .collect()
}

fn lift(ring_point: Vec2, bevel: Vec2, layer: Layer) -> Vec3 {
    let p = ring_point + bevel * layer.offset;
    Vec3::new(p.x, p.y, layer.z)
}

fn push_walls(ring: &[Vec2], bevel: &[Vec2], layers: &[Layer], solid: &mut Solid) {
    let n = ring.len();
    for pair in layers.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        for i in 0..n {
            let j = (i + 1) % n;
            let a = lift(ring[i], bevel[i], lower);
            let b = lift(ring[j], bevel[j], lower);
            let c = lift(ring[j], bevel[j], upper);
            let d = lift(ring[i], bevel[i], upper);
            push_flat_triangle(solid, a, b, c);
            push_flat_triangle(solid, a, c, d);
        }
    }
}

fn push_flat_triangle(solid: &mut Solid, a: Vec3, b: Vec3, c: Vec3) {
    let normal = (b - a).cross(c - a);
    if normal.length_squared() < 1e-14 {
        return;
    }
    let normal = normal.normalize();
    let base = solid.positions.len() as u32;
    solid.positions.extend([a, b, c]);
    solid.normals.extend([normal; 3]);
    solid.indices.extend([base, base + 1, base + 2]);
}

fn push_cap(
    rings: &[(&Vec<Vec2>, Vec<Vec2>)],
    layer: Layer,
    facing_front: bool,
    solid: &mut Solid,
) -> Result<(), GeometryError> {
    let mut builder = Path::builder();
    for (ring, bevel) in rings {
        let mut points = ring.iter().zip(bevel).map(|(p, v)| *p + *v * layer.offset);
        let Some(first) = points.next() else {
            continue;
        };
        builder.begin(point(first.x, first.y));
        for p in points {
            builder.line_to(point(p.x, p.y));
        }
        builder.end(true);
    }
    let path = builder.build();

    let mut buffers: VertexBuffers<Vec2, u32> = VertexBuffers::new();
    FillTessellator::new()
        .tessellate_path(
            &path,
            &FillOptions::default().with_fill_rule(FillRule::EvenOdd),
            &mut BuffersBuilder::new(&mut buffers, |vertex: FillVertex| {
                Vec2::new(vertex.position().x, vertex.position().y)
            }),
        )
        .map_err(|err| GeometryError::Tessellation(format!("{err:?}")))?;

    let normal = if facing_front { Vec3::Z } else { Vec3::NEG_Z };
    let base = solid.positions.len() as u32;
    solid.positions.extend(
        buffers
            .vertices
            .iter()
            .map(|v| Vec3::new(v.x, v.y, layer.z)),
    );
    solid
        .normals
        .extend(std::iter::repeat(normal).take(buffers.vertices.len()));

    for tri in buffers.indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0], tri[1], tri[2]];
        let (a, b, c) = (
            buffers.vertices[i0 as usize],
            buffers.vertices[i1 as usize],
            buffers.vertices[i2 as usize],
        );
        let counter_clockwise = (b - a).perp_dot(c - a) > 0.0;
        if counter_clockwise == facing_front {
            solid.indices.extend([base + i0, base + i1, base + i2]);
        } else {
            solid.indices.extend([base + i0, base + i2, base + i1]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit_square() -> Shape2D {
        Shape2D {
            outer: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ],
            holes: Vec::new(),
        }
    }

    fn flat(depth: f32) -> ExtrusionParams {
        ExtrusionParams {
            depth,
            bevel_enabled: false,
            ..ExtrusionParams::default()
        }
    }

    #[test]
    fn profile_without_bevel_spans_depth() {
        let params = ExtrusionParams {
            steps: Some(2),
            ..flat(10.0)
        };
        let layers = profile(&params);
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].z, 0.0);
        assert_eq!(layers[1].z, 5.0);
        assert_eq!(layers[2].z, 10.0);
        assert!(layers.iter().all(|l| l.offset == 0.0));
    }

    #[test]
    fn profile_with_bevel_extends_past_depth() {
        let params = ExtrusionParams::default();
        let layers = profile(&params);
        assert_eq!(layers.len(), 4 + 2 + 4);
        assert_abs_diff_eq!(layers[0].z, -0.5);
        assert_abs_diff_eq!(layers[0].offset, 0.0);
        assert_abs_diff_eq!(layers.last().unwrap().z, 10.5);
        assert_abs_diff_eq!(layers[4].offset, 0.5);
    }

    #[test]
    fn profile_caps_subdivision_counts() {
        let params = ExtrusionParams {
            bevel_segments: u32::MAX,
            steps: Some(u32::MAX),
            ..ExtrusionParams::default()
        };
        let layers = profile(&params);
        assert_eq!(layers.len(), MAX_SEGMENTS as usize * 3 + 1);
        assert_abs_diff_eq!(layers.last().unwrap().z, 10.5, epsilon = 1e-4);
        assert!(layers.iter().all(|l| l.z.is_finite() && l.offset.is_finite()));
    }

    #[test]
    fn box_walls_face_outward() {
        let mut solid = Solid::default();
        extrude_shape(&unit_square(), &flat(2.0), &mut solid).unwrap();
        // 4 walls x 2 triangles + 2 caps x 2 triangles
        assert_eq!(solid.triangle_count(), 12);

        let center = Vec3::new(0.5, 0.5, 1.0);
        for tri in solid.indices.chunks_exact(3) {
            let a = solid.positions[tri[0] as usize];
            let b = solid.positions[tri[1] as usize];
            let c = solid.positions[tri[2] as usize];
            let winding_normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(
                winding_normal.dot(centroid - center) > 0.0,
                "triangle {tri:?} faces inward"
            );
        }
    }

    #[test]
    fn bevel_widens_body() {
        let mut solid = Solid::default();
        extrude_shape(&unit_square(), &ExtrusionParams::default(), &mut solid).unwrap();
        let min_x = solid.positions.iter().map(|p| p.x).fold(f32::MAX, f32::min);
        let max_z = solid.positions.iter().map(|p| p.z).fold(f32::MIN, f32::max);
        assert_abs_diff_eq!(min_x, -0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(max_z, 10.5, epsilon = 1e-4);
    }

    #[test]
    fn hole_is_left_open_in_caps() {
        let mut shape = Shape2D {
            outer: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(4.0, 0.0),
                Vec2::new(4.0, 4.0),
                Vec2::new(0.0, 4.0),
            ],
            holes: vec![vec![
                Vec2::new(1.0, 1.0),
                Vec2::new(1.0, 3.0),
                Vec2::new(3.0, 3.0),
                Vec2::new(3.0, 1.0),
            ]],
        };
        let mut solid = Solid::default();
        extrude_shape(&shape, &flat(1.0), &mut solid).unwrap();

        let cap_area: f32 = solid
            .indices
            .chunks_exact(3)
            .filter(|tri| {
                tri.iter()
                    .all(|&i| solid.positions[i as usize].z == 1.0)
            })
            .map(|tri| {
                let a = solid.positions[tri[0] as usize];
                let b = solid.positions[tri[1] as usize];
                let c = solid.positions[tri[2] as usize];
                (b - a).cross(c - a).length() * 0.5
            })
            .sum();
        assert_abs_diff_eq!(cap_area, 12.0, epsilon = 1e-3);

        shape.holes.clear();
        let mut filled = Solid::default();
        extrude_shape(&shape, &flat(1.0), &mut filled).unwrap();
        assert!(filled.triangle_count() < solid.triangle_count());
    }

    #[test]
    fn zero_depth_without_bevel_is_flat() {
        let mut solid = Solid::default();
        extrude_shape(&unit_square(), &flat(0.0), &mut solid).unwrap();
        assert!(solid.positions.iter().all(|p| p.z == 0.0));
        assert!(solid.normals.iter().all(|n| n.is_finite()));
        // Only the two caps survive; degenerate walls are dropped.
        assert_eq!(solid.triangle_count(), 4);
    }
}
