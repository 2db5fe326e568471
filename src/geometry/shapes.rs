//! Groups flattened contours into outlines with holes.

use glam::Vec2;

use super::svg::{signed_area, ContourSet, FillRule};

/// One closed outline plus the holes cut out of it.
///
/// The outer ring is counter-clockwise and every hole clockwise (y-up).
#[derive(Debug, Clone, PartialEq)]
pub struct Shape2D {
    pub outer: Vec<Vec2>,
    pub holes: Vec<Vec<Vec2>>,
}

impl Shape2D {
    pub fn contours(&self) -> impl Iterator<Item = &Vec<Vec2>> {
        std::iter::once(&self.outer).chain(self.holes.iter())
    }

    /// Filled area (outer minus holes).
    pub fn area(&self) -> f32 {
        signed_area(&self.outer).abs()
            - self
                .holes
                .iter()
                .map(|hole| signed_area(hole).abs())
                .sum::<f32>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Outer,
    Hole,
    Skip,
}

/// Shapes for every element of a document, in document order.
pub fn shapes_from_sets(sets: &[ContourSet]) -> Vec<Shape2D> {
    sets.iter().flat_map(group_contours).collect()
}

/// Classifies each contour of one element as outer or hole under the
/// element's fill rule and attaches holes to their tightest enclosing outer.
pub fn group_contours(set: &ContourSet) -> Vec<Shape2D> {
    let contours = &set.contours;
    let roles: Vec<Role> = (0..contours.len())
        .map(|index| match set.fill_rule {
            FillRule::EvenOdd => even_odd_role(contours, index),
            FillRule::NonZero => non_zero_role(contours, index),
        })
        .collect();

    let mut shapes: Vec<(usize, Shape2D)> = Vec::new();
    for (index, contour) in contours.iter().enumerate() {
        if roles[index] == Role::Outer {
            shapes.push((
                index,
                Shape2D {
                    outer: oriented(contour, true),
                    holes: Vec::new(),
                },
            ));
        }
    }

    for (index, contour) in contours.iter().enumerate() {
        if roles[index] != Role::Hole {
            continue;
        }
        let probe = contour[0];
        let parent = shapes
            .iter_mut()
            .filter(|(outer_index, shape)| {
                *outer_index != index && winding_number(&shape.outer, probe) != 0
            })
            .min_by(|(_, a), (_, b)| {
                signed_area(&a.outer)
                    .abs()
                    .total_cmp(&signed_area(&b.outer).abs())
            });
        match parent {
            Some((_, shape)) => shape.holes.push(oriented(contour, false)),
            None => log::debug!("dropping hole contour with no enclosing outline"),
        }
    }

    shapes.into_iter().map(|(_, shape)| shape).collect()
}

fn even_odd_role(contours: &[Vec<Vec2>], index: usize) -> Role {
    let probe = contours[index][0];
    let depth = contours
        .iter()
        .enumerate()
        .filter(|(other, contour)| *other != index && winding_number(contour, probe) != 0)
        .count();
    if depth % 2 == 0 {
        Role::Outer
    } else {
        Role::Hole
    }
}

fn non_zero_role(contours: &[Vec<Vec2>], index: usize) -> Role {
    let probe = contours[index][0];
    let outside: i32 = contours
        .iter()
        .enumerate()
        .filter(|(other, _)| *other != index)
        .map(|(_, contour)| winding_number(contour, probe))
        .sum();
    let own = if signed_area(&contours[index]) > 0.0 { 1 } else { -1 };
    let inside = outside + own;
    match (inside != 0, outside != 0) {
        (true, false) => Role::Outer,
        (false, true) => Role::Hole,
        // Same fill on both sides: the contour adds no boundary.
        _ => Role::Skip,
    }
}

fn oriented(contour: &[Vec2], counter_clockwise: bool) -> Vec<Vec2> {
    let mut ring = contour.to_vec();
    if (signed_area(&ring) > 0.0) != counter_clockwise {
        ring.reverse();
    }
    ring
}

/// Winding number of `ring` around `point` (positive for CCW rings).
pub fn winding_number(ring: &[Vec2], point: Vec2) -> i32 {
    let mut winding = 0;
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let side = (b - a).perp_dot(point - a);
        if a.y <= point.y {
            if b.y > point.y && side > 0.0 {
                winding += 1;
            }
        } else if b.y <= point.y && side < 0.0 {
            winding -= 1;
        }
    }
    winding
}
