//! SVG document scanning and path data flattening.
//!
//! Only filled geometry matters for extrusion, so the scanner looks at the
//! shape elements the host exporter emits (`path`, `rect`, `circle`,
//! `ellipse`, `polygon`, `polyline`) and turns each into closed polylines.
//! Curves are sampled with a fixed number of points per segment. Output is in
//! y-up coordinates (SVG is y-down).

use glam::{Affine2, Vec2};
use lyon::geom::{
    point, vector, Angle, ArcFlags, Box2D, CubicBezierSegment, QuadraticBezierSegment, SvgArc,
};
use lyon::path::builder::BorderRadii;
use lyon::path::{Path, PathEvent, Winding};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::state::MAX_SEGMENTS;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SvgError {
    #[error("unexpected character '{found}' at offset {offset} in path data")]
    UnexpectedChar { found: char, offset: usize },
    #[error("path data ended while reading arguments for '{command}'")]
    MissingArguments { command: char },
    #[error("path data must start with a move command, found '{0}'")]
    MissingMoveTo(char),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unsupported transform '{0}'")]
    UnsupportedTransform(String),
}

pub type Result<T> = std::result::Result<T, SvgError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

/// Closed polylines of one filled element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContourSet {
    pub contours: Vec<Vec<Vec2>>,
    pub fill_rule: FillRule,
}

const MIN_CONTOUR_AREA: f32 = 1e-8;

fn element_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<(path|rect|circle|ellipse|polygon|polyline)\b([^>]*)>")
            .expect("element pattern is valid")
    })
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("attribute pattern is valid")
    })
}

fn transform_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z]+)\s*\(([^)]*)\)").expect("transform pattern is valid")
    })
}

/// Extracts every filled element of `svg` as contour sets.
///
/// A document without shape elements yields an empty list rather than an error.
pub fn parse_document(svg: &str, curve_segments: u32) -> Result<Vec<ContourSet>> {
    let segments = curve_segments.clamp(1, MAX_SEGMENTS);
    let mut sets = Vec::new();

    for element in element_regex().captures_iter(svg) {
        let tag = &element[1];
        let attrs = parse_attributes(&element[2]);
        if attrs.get("fill").map(|fill| fill.trim() == "none").unwrap_or(false) {
            continue;
        }

        let contours = match tag {
            "path" => match attrs.get("d") {
                Some(d) => parse_path_data(d, segments)?,
                None => continue,
            },
            "rect" => flatten_shape(rect_path(&attrs)?, segments),
            "circle" => {
                let r = length(&attrs, "r")?;
                let center = Vec2::new(length(&attrs, "cx")?, length(&attrs, "cy")?);
                flatten_shape(ellipse_path(center, r, r)?, segments)
            }
            "ellipse" => {
                let center = Vec2::new(length(&attrs, "cx")?, length(&attrs, "cy")?);
                let (rx, ry) = (length(&attrs, "rx")?, length(&attrs, "ry")?);
                flatten_shape(ellipse_path(center, rx, ry)?, segments)
            }
            "polygon" | "polyline" => {
                let numbers = number_list(attrs.get("points").map(String::as_str).unwrap_or(""))?;
                let points: Vec<Vec2> = numbers
                    .chunks_exact(2)
                    .map(|pair| Vec2::new(pair[0], pair[1]))
                    .collect();
                cleanup_contour(points).into_iter().collect()
            }
            _ => continue,
        };

        let transform = match attrs.get("transform") {
            Some(text) => parse_transform(text)?,
            None => Affine2::IDENTITY,
        };
        let contours: Vec<Vec<Vec2>> = contours
            .into_iter()
            .map(|contour| {
                contour
                    .into_iter()
                    .map(|p| {
                        let p = transform.transform_point2(p);
                        Vec2::new(p.x, -p.y)
                    })
                    .collect()
            })
            .collect();
        if contours.is_empty() {
            continue;
        }

        let fill_rule = match attrs.get("fill-rule").map(|rule| rule.trim()) {
            Some("evenodd") => FillRule::EvenOdd,
            _ => FillRule::NonZero,
        };
        log::debug!("svg <{}>: {} contour(s), {:?}", tag, contours.len(), fill_rule);
        sets.push(ContourSet {
            contours,
            fill_rule,
        });
    }

    Ok(sets)
}

fn parse_attributes(text: &str) -> HashMap<String, String> {
    attribute_regex()
        .captures_iter(text)
        .filter_map(|cap| {
            let value = cap.get(2).or_else(|| cap.get(3))?;
            Some((cap[1].to_string(), value.as_str().to_string()))
        })
        .collect()
}

fn length(attrs: &HashMap<String, String>, name: &str) -> Result<f32> {
    let Some(raw) = attrs.get(name) else {
        return Ok(0.0);
    };
    let trimmed = raw.trim().trim_end_matches("px");
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    match trimmed.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(SvgError::InvalidNumber(raw.clone())),
    }
}

fn rect_path(attrs: &HashMap<String, String>) -> Result<Option<Path>> {
    let x = length(attrs, "x")?;
    let y = length(attrs, "y")?;
    let width = length(attrs, "width")?;
    let height = length(attrs, "height")?;
    if width <= 0.0 || height <= 0.0 {
        return Ok(None);
    }

    // A missing radius mirrors the other one.
    let mut rx = attrs.get("rx").map(|_| length(attrs, "rx")).transpose()?;
    let mut ry = attrs.get("ry").map(|_| length(attrs, "ry")).transpose()?;
    if rx.is_none() {
        rx = ry;
    }
    if ry.is_none() {
        ry = rx;
    }
    let rx = rx.unwrap_or(0.0).clamp(0.0, width / 2.0);
    let ry = ry.unwrap_or(0.0).clamp(0.0, height / 2.0);

    let min = Vec2::new(x, y);
    let max = min + Vec2::new(width, height);
    if rx > 0.0 && ry > 0.0 && (rx - ry).abs() > f32::EPSILON * rx.max(ry) {
        return elliptical_corner_rect(min, max, Vec2::new(rx, ry)).map(Some);
    }

    let bounds = Box2D::new(to_point(min)?, to_point(max)?);
    let mut builder = Path::builder();
    if rx > 0.0 && ry > 0.0 {
        builder.add_rounded_rectangle(&bounds, &BorderRadii::new(rx), Winding::Positive);
    } else {
        builder.add_rectangle(&bounds, Winding::Positive);
    }
    Ok(Some(builder.build()))
}

fn elliptical_corner_rect(min: Vec2, max: Vec2, radii: Vec2) -> Result<Path> {
    let (rx, ry) = (radii.x, radii.y);
    let mut pen = Pen::new();
    pen.move_to(Vec2::new(min.x + rx, min.y))?;
    pen.line_to(Vec2::new(max.x - rx, min.y))?;
    pen.arc_to(radii, 0.0, false, true, Vec2::new(max.x, min.y + ry))?;
    pen.line_to(Vec2::new(max.x, max.y - ry))?;
    pen.arc_to(radii, 0.0, false, true, Vec2::new(max.x - rx, max.y))?;
    pen.line_to(Vec2::new(min.x + rx, max.y))?;
    pen.arc_to(radii, 0.0, false, true, Vec2::new(min.x, max.y - ry))?;
    pen.line_to(Vec2::new(min.x, min.y + ry))?;
    pen.arc_to(radii, 0.0, false, true, Vec2::new(min.x + rx, min.y))?;
    pen.close();
    Ok(pen.finish())
}

fn flatten_shape(shape: Option<Path>, segments: u32) -> Vec<Vec<Vec2>> {
    shape
        .map(|path| flatten(&path, segments))
        .unwrap_or_default()
}

fn ellipse_path(center: Vec2, rx: f32, ry: f32) -> Result<Option<Path>> {
    if rx <= 0.0 || ry <= 0.0 {
        return Ok(None);
    }
    let mut builder = Path::builder();
    builder.add_ellipse(
        to_point(center)?,
        vector(rx, ry),
        Angle::zero(),
        Winding::Positive,
    );
    Ok(Some(builder.build()))
}

/// Parses an SVG `transform` attribute into a single affine map.
pub fn parse_transform(text: &str) -> Result<Affine2> {
    let mut total = Affine2::IDENTITY;
    for cap in transform_regex().captures_iter(text) {
        let name = &cap[1];
        let args = number_list(&cap[2])?;
        let arg = |index: usize, fallback: f32| args.get(index).copied().unwrap_or(fallback);
        let step = match (name, args.len()) {
            ("matrix", 6) => Affine2::from_cols_array(&[
                args[0], args[1], args[2], args[3], args[4], args[5],
            ]),
            ("translate", 1 | 2) => Affine2::from_translation(Vec2::new(arg(0, 0.0), arg(1, 0.0))),
            ("scale", 1 | 2) => {
                let sx = arg(0, 1.0);
                Affine2::from_scale(Vec2::new(sx, arg(1, sx)))
            }
            ("rotate", 1 | 3) => {
                let pivot = Vec2::new(arg(1, 0.0), arg(2, 0.0));
                Affine2::from_translation(pivot)
                    * Affine2::from_angle(arg(0, 0.0).to_radians())
                    * Affine2::from_translation(-pivot)
            }
            ("skewX", 1) => Affine2::from_cols_array(&[
                1.0,
                0.0,
                arg(0, 0.0).to_radians().tan(),
                1.0,
                0.0,
                0.0,
            ]),
            ("skewY", 1) => Affine2::from_cols_array(&[
                1.0,
                arg(0, 0.0).to_radians().tan(),
                0.0,
                1.0,
                0.0,
                0.0,
            ]),
            _ => return Err(SvgError::UnsupportedTransform(cap[0].to_string())),
        };
        total = total * step;
    }
    Ok(total)
}

fn number_list(text: &str) -> Result<Vec<f32>> {
    let mut cursor = Cursor::new(text);
    let mut numbers = Vec::new();
    cursor.skip_separators();
    while !cursor.is_done() {
        numbers.push(cursor.number()?);
        cursor.skip_separators();
    }
    Ok(numbers)
}

/// Flattens SVG path data into closed polylines (still in SVG coordinates).
pub fn parse_path_data(d: &str, curve_segments: u32) -> Result<Vec<Vec<Vec2>>> {
    Ok(flatten(&build_path(d)?, curve_segments))
}

fn build_path(d: &str) -> Result<Path> {
    let mut cursor = Cursor::new(d);
    let mut pen = Pen::new();
    let mut command: Option<u8> = None;

    loop {
        cursor.skip_separators();
        if cursor.is_done() {
            break;
        }

        let current = match cursor.peek() {
            Some(byte) if byte.is_ascii_alphabetic() => {
                cursor.advance();
                byte
            }
            // Implicit repetition of the previous command; a repeated move is a line.
            Some(_) => match command {
                Some(b'M') => b'L',
                Some(b'm') => b'l',
                Some(previous) if !matches!(previous, b'Z' | b'z') => previous,
                _ => return Err(cursor.unexpected()),
            },
            None => break,
        };
        if command.is_none() && !matches!(current, b'M' | b'm') {
            return Err(SvgError::MissingMoveTo(current as char));
        }
        command = Some(current);

        let relative = current.is_ascii_lowercase();
        let origin = if relative { pen.cursor } else { Vec2::ZERO };
        let name = current as char;
        let mut point = |cursor: &mut Cursor| -> Result<Vec2> {
            let x = cursor.argument(name)?;
            let y = cursor.argument(name)?;
            Ok(origin + Vec2::new(x, y))
        };

        match current.to_ascii_uppercase() {
            b'M' => {
                let to = point(&mut cursor)?;
                pen.move_to(to)?;
            }
            b'L' => {
                let to = point(&mut cursor)?;
                pen.line_to(to)?;
            }
            b'H' => {
                let x = cursor.argument(name)?;
                let x = if relative { pen.cursor.x + x } else { x };
                pen.line_to(Vec2::new(x, pen.cursor.y))?;
            }
            b'V' => {
                let y = cursor.argument(name)?;
                let y = if relative { pen.cursor.y + y } else { y };
                pen.line_to(Vec2::new(pen.cursor.x, y))?;
            }
            b'C' => {
                let c1 = point(&mut cursor)?;
                let c2 = point(&mut cursor)?;
                let to = point(&mut cursor)?;
                pen.cubic_to(c1, c2, to)?;
            }
            b'S' => {
                let c1 = pen.reflected_cubic_control();
                let c2 = point(&mut cursor)?;
                let to = point(&mut cursor)?;
                pen.cubic_to(c1, c2, to)?;
            }
            b'Q' => {
                let ctrl = point(&mut cursor)?;
                let to = point(&mut cursor)?;
                pen.quadratic_to(ctrl, to)?;
            }
            b'T' => {
                let ctrl = pen.reflected_quadratic_control();
                let to = point(&mut cursor)?;
                pen.quadratic_to(ctrl, to)?;
            }
            b'A' => {
                let rx = cursor.argument(name)?;
                let ry = cursor.argument(name)?;
                let rotation = cursor.argument(name)?;
                let large_arc = cursor.flag(name)?;
                let sweep = cursor.flag(name)?;
                let to = point(&mut cursor)?;
                pen.arc_to(Vec2::new(rx, ry), rotation.to_radians(), large_arc, sweep, to)?;
            }
            b'Z' => pen.close(),
            _ => return Err(SvgError::UnexpectedChar {
                found: name,
                offset: cursor.pos.saturating_sub(1),
            }),
        }
    }

    Ok(pen.finish())
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn is_done(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn unexpected(&self) -> SvgError {
        SvgError::UnexpectedChar {
            found: self.peek().map(char::from).unwrap_or('\0'),
            offset: self.pos,
        }
    }

    fn skip_separators(&mut self) {
        while let Some(byte) = self.peek() {
            if byte.is_ascii_whitespace() || byte == b',' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn argument(&mut self, command: char) -> Result<f32> {
        self.skip_separators();
        if self.is_done() {
            return Err(SvgError::MissingArguments { command });
        }
        self.number()
    }

    /// Arc flags may be packed without separators (`a1 1 0 0110 10`).
    fn flag(&mut self, command: char) -> Result<bool> {
        self.skip_separators();
        match self.peek() {
            Some(b'0') => {
                self.advance();
                Ok(false)
            }
            Some(b'1') => {
                self.advance();
                Ok(true)
            }
            Some(_) => Err(self.unexpected()),
            None => Err(SvgError::MissingArguments { command }),
        }
    }

    fn number(&mut self) -> Result<f32> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.advance();
        }
        let mut digits = 0;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
            digits += 1;
        }
        if self.peek() == Some(b'.') {
            self.advance();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.advance();
                digits += 1;
            }
        }
        if digits == 0 {
            self.pos = start;
            return Err(self.unexpected());
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mark = self.pos;
            self.advance();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.advance();
            }
            if matches!(self.peek(), Some(b'0'..=b'9')) {
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.advance();
                }
            } else {
                self.pos = mark;
            }
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]);
        match text.parse::<f32>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(SvgError::InvalidNumber(text.into_owned())),
        }
    }
}

/// SVG pen state on top of a lyon path builder: current point, subpath start
/// and the control points smooth curves reflect.
struct Pen {
    builder: lyon::path::path::Builder,
    open: bool,
    start: Vec2,
    cursor: Vec2,
    last_cubic_control: Option<Vec2>,
    last_quadratic_control: Option<Vec2>,
}

impl Pen {
    fn new() -> Self {
        Self {
            builder: Path::builder(),
            open: false,
            start: Vec2::ZERO,
            cursor: Vec2::ZERO,
            last_cubic_control: None,
            last_quadratic_control: None,
        }
    }

    fn move_to(&mut self, to: Vec2) -> Result<()> {
        let at = to_point(to)?;
        self.end_subpath();
        self.builder.begin(at);
        self.open = true;
        self.start = to;
        self.cursor = to;
        self.clear_controls();
        Ok(())
    }

    fn ensure_open(&mut self) -> Result<()> {
        if !self.open {
            self.builder.begin(to_point(self.cursor)?);
            self.open = true;
            self.start = self.cursor;
        }
        Ok(())
    }

    fn line_to(&mut self, to: Vec2) -> Result<()> {
        let end = to_point(to)?;
        self.ensure_open()?;
        self.builder.line_to(end);
        self.cursor = to;
        self.clear_controls();
        Ok(())
    }

    fn cubic_to(&mut self, c1: Vec2, c2: Vec2, to: Vec2) -> Result<()> {
        let (ctrl1, ctrl2, end) = (to_point(c1)?, to_point(c2)?, to_point(to)?);
        self.ensure_open()?;
        self.builder.cubic_bezier_to(ctrl1, ctrl2, end);
        self.cursor = to;
        self.last_cubic_control = Some(c2);
        self.last_quadratic_control = None;
        Ok(())
    }

    fn quadratic_to(&mut self, ctrl: Vec2, to: Vec2) -> Result<()> {
        let (control, end) = (to_point(ctrl)?, to_point(to)?);
        self.ensure_open()?;
        self.builder.quadratic_bezier_to(control, end);
        self.cursor = to;
        self.last_quadratic_control = Some(ctrl);
        self.last_cubic_control = None;
        Ok(())
    }

    fn reflected_cubic_control(&self) -> Vec2 {
        self.last_cubic_control
            .map(|ctrl| self.cursor * 2.0 - ctrl)
            .unwrap_or(self.cursor)
    }

    fn reflected_quadratic_control(&self) -> Vec2 {
        self.last_quadratic_control
            .map(|ctrl| self.cursor * 2.0 - ctrl)
            .unwrap_or(self.cursor)
    }

    /// Endpoint-parameterized elliptical arc, emitted as quadratic pieces.
    fn arc_to(
        &mut self,
        radii: Vec2,
        rotation: f32,
        large_arc: bool,
        sweep: bool,
        to: Vec2,
    ) -> Result<()> {
        if self.cursor.distance_squared(to) < f32::EPSILON {
            return Ok(());
        }
        let arc = SvgArc {
            from: to_point(self.cursor)?,
            to: to_point(to)?,
            radii: vector(radii.x.abs(), radii.y.abs()),
            x_rotation: Angle::radians(rotation),
            flags: ArcFlags { large_arc, sweep },
        };
        if arc.is_straight_line() {
            return self.line_to(to);
        }
        self.ensure_open()?;
        let builder = &mut self.builder;
        arc.for_each_quadratic_bezier(&mut |piece| {
            builder.quadratic_bezier_to(piece.ctrl, piece.to);
        });
        self.cursor = to;
        self.clear_controls();
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.builder.end(true);
            self.open = false;
        }
        self.cursor = self.start;
        self.clear_controls();
    }

    fn clear_controls(&mut self) {
        self.last_cubic_control = None;
        self.last_quadratic_control = None;
    }

    fn end_subpath(&mut self) {
        if self.open {
            self.builder.end(false);
            self.open = false;
        }
    }

    fn finish(mut self) -> Path {
        self.end_subpath();
        self.builder.build()
    }
}

fn to_point(v: Vec2) -> Result<lyon::geom::Point<f32>> {
    if v.is_finite() {
        Ok(point(v.x, v.y))
    } else {
        Err(SvgError::InvalidNumber(format!("{} {}", v.x, v.y)))
    }
}

fn to_vec2(p: lyon::geom::Point<f32>) -> Vec2 {
    Vec2::new(p.x, p.y)
}

/// Samples every curve of `path` at `curve_segments` evenly spaced
/// parameters; open subpaths are closed like fills close them.
fn flatten(path: &Path, curve_segments: u32) -> Vec<Vec<Vec2>> {
    let segments = curve_segments.clamp(1, MAX_SEGMENTS);
    let parameters = move || (1..=segments).map(move |i| i as f32 / segments as f32);
    let mut contours = Vec::new();
    let mut current: Vec<Vec2> = Vec::new();

    for event in path.iter() {
        match event {
            PathEvent::Begin { at } => current.push(to_vec2(at)),
            PathEvent::Line { to, .. } => current.push(to_vec2(to)),
            PathEvent::Quadratic { from, ctrl, to } => {
                let curve = QuadraticBezierSegment { from, ctrl, to };
                current.extend(parameters().map(|t| to_vec2(curve.sample(t))));
            }
            PathEvent::Cubic {
                from,
                ctrl1,
                ctrl2,
                to,
            } => {
                let curve = CubicBezierSegment {
                    from,
                    ctrl1,
                    ctrl2,
                    to,
                };
                current.extend(parameters().map(|t| to_vec2(curve.sample(t))));
            }
            PathEvent::End { .. } => {
                if let Some(contour) = cleanup_contour(std::mem::take(&mut current)) {
                    contours.push(contour);
                }
            }
        }
    }
    contours
}

/// Drops repeated points and the closing duplicate; rejects degenerate rings.
fn cleanup_contour(points: Vec<Vec2>) -> Option<Vec<Vec2>> {
    let mut cleaned: Vec<Vec2> = Vec::with_capacity(points.len());
    for p in points {
        if !p.is_finite() {
            continue;
        }
        if cleaned
            .last()
            .map(|last| last.distance_squared(p) > 1e-12)
            .unwrap_or(true)
        {
            cleaned.push(p);
        }
    }
    while cleaned.len() > 1
        && cleaned
            .first()
            .zip(cleaned.last())
            .map(|(first, last)| first.distance_squared(*last) <= 1e-12)
            .unwrap_or(false)
    {
        cleaned.pop();
    }
    if cleaned.len() < 3 || signed_area(&cleaned).abs() < MIN_CONTOUR_AREA {
        return None;
    }
    Some(cleaned)
}

/// Shoelace area; positive for counter-clockwise rings in y-up space.
pub fn signed_area(points: &[Vec2]) -> f32 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        twice += a.x * b.y - b.x * a.y;
    }
    twice * 0.5
}
