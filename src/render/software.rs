//! CPU rasterizing surface with a depth buffer and PNG still capture.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use glam::{Vec3, Vec4};

use super::lights::LightSet;
use super::material::{CullMode, SurfaceMaterial};
use super::{
    FrameView, GeometryHandle, MaterialHandle, RenderError, RenderSurface, SurfaceStats,
};
use crate::geometry::Solid;

pub struct SoftwareSurface {
    width: u32,
    height: u32,
    color_buffer: Vec<u8>,
    depth_buffer: Vec<f32>,
    geometries: HashMap<u64, Solid>,
    materials: HashMap<u64, SurfaceMaterial>,
    next_id: u64,
    stats: SurfaceStats,
}

impl SoftwareSurface {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        let mut surface = Self {
            width: 0,
            height: 0,
            color_buffer: Vec::new(),
            depth_buffer: Vec::new(),
            geometries: HashMap::new(),
            materials: HashMap::new(),
            next_id: 1,
            stats: SurfaceStats::default(),
        };
        surface.resize(width, height)?;
        Ok(surface)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA8 pixels of the last frame, row-major from the top.
    pub fn pixels(&self) -> &[u8] {
        &self.color_buffer
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        Some([
            self.color_buffer[i],
            self.color_buffer[i + 1],
            self.color_buffer[i + 2],
            self.color_buffer[i + 3],
        ])
    }

    pub fn capture_png(&self, path: &Path) -> Result<(), RenderError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        image::save_buffer_with_format(
            PathBuf::from(path),
            &self.color_buffer,
            self.width,
            self.height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .map_err(|err| RenderError::Capture(format!("writing '{}': {}", path.display(), err)))
    }

    pub fn capture_png_bytes(&self) -> Result<Vec<u8>, RenderError> {
        let image = image::RgbaImage::from_raw(self.width, self.height, self.color_buffer.clone())
            .ok_or_else(|| RenderError::Capture("color buffer size mismatch".to_string()))?;
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|err| RenderError::Capture(err.to_string()))?;
        Ok(bytes)
    }

    /// `data:image/png;base64,...` for the host's add-image request.
    pub fn capture_png_data_url(&self) -> Result<String, RenderError> {
        let bytes = self.capture_png_bytes()?;
        Ok(crate::protocol::encode_data_url("image/png", &bytes))
    }

    fn clear(&mut self, color: [f32; 4]) {
        let rgba = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        for chunk in self.color_buffer.chunks_exact_mut(4) {
            chunk.copy_from_slice(&rgba);
        }
        self.depth_buffer.fill(f32::INFINITY);
    }

    fn ndc_to_screen(&self, ndc: Vec3) -> Vec3 {
        Vec3::new(
            (ndc.x + 1.0) * 0.5 * self.width as f32,
            (1.0 - ndc.y) * 0.5 * self.height as f32,
            ndc.z,
        )
    }

    fn draw_mesh(
        &mut self,
        solid: &Solid,
        material: &SurfaceMaterial,
        frame: &FrameView<'_>,
    ) {
        let view_proj = frame.camera.view_projection();
        let eye = frame.camera.position;
        let alpha = material.alpha();

        for tri in solid.indices.chunks_exact(3) {
            let ids = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let world = ids.map(|i| solid.positions[i]);
            let normals = ids.map(|i| solid.normals.get(i).copied().unwrap_or(Vec3::Z));

            let clip = world.map(|p| view_proj * Vec4::new(p.x, p.y, p.z, 1.0));
            // Triangles crossing the near plane are dropped.
            if clip.iter().any(|c| c.w <= 0.0) {
                continue;
            }
            let ndc = clip.map(|c| c.truncate() / c.w);

            let facing_area = (ndc[1].x - ndc[0].x) * (ndc[2].y - ndc[0].y)
                - (ndc[1].y - ndc[0].y) * (ndc[2].x - ndc[0].x);
            let front_facing = facing_area > 0.0;
            let flip = match material.cull {
                CullMode::Back if !front_facing => continue,
                CullMode::Front if front_facing => continue,
                CullMode::Front => true,
                CullMode::None => !front_facing,
                CullMode::Back => false,
            };
            let normals = if flip { normals.map(|n| -n) } else { normals };

            let screen = ndc.map(|p| self.ndc_to_screen(p));
            self.rasterize(screen, world, normals, material, frame.lights, eye, alpha);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rasterize(
        &mut self,
        s: [Vec3; 3],
        world: [Vec3; 3],
        normals: [Vec3; 3],
        material: &SurfaceMaterial,
        lights: &LightSet,
        eye: Vec3,
        alpha: f32,
    ) {
        let min_x = s[0].x.min(s[1].x).min(s[2].x).max(0.0).floor() as i64;
        let max_x = s[0].x.max(s[1].x).max(s[2].x).min(self.width as f32 - 1.0).ceil() as i64;
        let min_y = s[0].y.min(s[1].y).min(s[2].y).max(0.0).floor() as i64;
        let max_y = s[0].y.max(s[1].y).max(s[2].y).min(self.height as f32 - 1.0).ceil() as i64;
        if min_x > max_x || min_y > max_y {
            return;
        }

        let area = edge_function(s[0], s[1], s[2]);
        if area.abs() < 1e-8 {
            return;
        }
        let inv_area = 1.0 / area;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, 0.0);
                let w0 = edge_function(s[1], s[2], p) * inv_area;
                let w1 = edge_function(s[2], s[0], p) * inv_area;
                let w2 = edge_function(s[0], s[1], p) * inv_area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                let depth = s[0].z * w0 + s[1].z * w1 + s[2].z * w2;
                let idx = (y as u32 * self.width + x as u32) as usize;
                if depth >= self.depth_buffer[idx] {
                    continue;
                }
                self.depth_buffer[idx] = depth;

                let position = world[0] * w0 + world[1] * w1 + world[2] * w2;
                let normal = (normals[0] * w0 + normals[1] * w1 + normals[2] * w2)
                    .try_normalize()
                    .unwrap_or(Vec3::Z);
                let shaded = shade(position, normal, material, lights, eye);

                let px = idx * 4;
                for channel in 0..3 {
                    let dst = self.color_buffer[px + channel] as f32 / 255.0;
                    let out = shaded[channel] * alpha + dst * (1.0 - alpha);
                    self.color_buffer[px + channel] = (out.clamp(0.0, 1.0) * 255.0).round() as u8;
                }
                self.color_buffer[px + 3] = 255;
            }
        }
    }
}

#[inline]
fn edge_function(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    (p.x - a.x) * (b.y - a.y) - (p.y - a.y) * (b.x - a.x)
}

/// Lambert diffuse plus Blinn specular, metals tint the highlight.
fn shade(
    position: Vec3,
    normal: Vec3,
    material: &SurfaceMaterial,
    lights: &LightSet,
    eye: Vec3,
) -> [f32; 3] {
    let base = Vec3::from_array(material.base_color.to_array());
    let diffuse_color = base * (1.0 - material.metalness * 0.8);
    let specular_color = Vec3::splat(0.04).lerp(base, material.metalness);
    let view_dir = (eye - position).try_normalize().unwrap_or(Vec3::Z);
    let shininess = (1.0 - material.roughness) * 128.0 + 2.0;

    let mut result = Vec3::ZERO;

    if let Some(ambient) = &lights.ambient {
        result += diffuse_color * Vec3::from_array(ambient.color.to_array()) * ambient.intensity;
    }
    if let Some(hemi) = &lights.hemisphere {
        let sky = Vec3::from_array(hemi.sky.to_array());
        let ground = Vec3::from_array(hemi.ground.to_array());
        let w = normal.y * 0.5 + 0.5;
        result += diffuse_color * ground.lerp(sky, w) * hemi.intensity;
    }
    for light in &lights.directional {
        let to_light = -light.direction();
        let n_dot_l = normal.dot(to_light);
        if n_dot_l <= 0.0 {
            continue;
        }
        let radiance = Vec3::from_array(light.color.to_array()) * light.intensity;
        let half = (to_light + view_dir).try_normalize().unwrap_or(normal);
        let specular = normal.dot(half).max(0.0).powf(shininess) * (1.0 - material.roughness * 0.5);
        result += (diffuse_color * n_dot_l * std::f32::consts::FRAC_1_PI
            + specular_color * specular)
            * radiance;
    }

    if let Some(transmission) = &material.transmission {
        let tint = Vec3::from_array(transmission.attenuation_color.to_array());
        result = result.lerp(result * tint, transmission.transmission * 0.5);
    }

    let emissive = material.emissive_radiance();
    result += Vec3::from_array(emissive);

    result
        .clamp(Vec3::ZERO, Vec3::ONE)
        .to_array()
        .map(|c| c.powf(1.0 / 2.2))
}

impl RenderSurface for SoftwareSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        self.width = width;
        self.height = height;
        let pixels = (width as usize) * (height as usize);
        self.color_buffer = vec![0; pixels * 4];
        self.depth_buffer = vec![f32::INFINITY; pixels];
        log::debug!("software surface resized to {}x{}", width, height);
        Ok(())
    }

    fn allocate_geometry(&mut self, solid: &Solid) -> Result<GeometryHandle, RenderError> {
        if solid.normals.len() != solid.positions.len() {
            return Err(RenderError::GeometryRejected(format!(
                "{} positions but {} normals",
                solid.positions.len(),
                solid.normals.len()
            )));
        }
        if let Some(bad) = solid
            .indices
            .iter()
            .find(|&&i| i as usize >= solid.positions.len())
        {
            return Err(RenderError::GeometryRejected(format!(
                "index {} out of range for {} vertices",
                bad,
                solid.positions.len()
            )));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.geometries.insert(id, solid.clone());
        self.stats.geometries_allocated += 1;
        Ok(GeometryHandle::new(id))
    }

    fn release_geometry(&mut self, handle: GeometryHandle) {
        if self.geometries.remove(&handle.id()).is_some() {
            self.stats.geometries_released += 1;
        } else {
            log::warn!("release of unknown geometry #{}", handle.id());
        }
    }

    fn allocate_material(
        &mut self,
        material: &SurfaceMaterial,
    ) -> Result<MaterialHandle, RenderError> {
        let id = self.next_id;
        self.next_id += 1;
        self.materials.insert(id, material.clone());
        self.stats.materials_allocated += 1;
        Ok(MaterialHandle::new(id))
    }

    fn release_material(&mut self, handle: MaterialHandle) {
        if self.materials.remove(&handle.id()).is_some() {
            self.stats.materials_released += 1;
        } else {
            log::warn!("release of unknown material #{}", handle.id());
        }
    }

    fn render(&mut self, frame: &FrameView<'_>) -> Result<(), RenderError> {
        self.clear(frame.clear_color);

        if let Some((geometry, material)) = frame.mesh {
            // Temporarily take the resources out so the buffers can be borrowed mutably.
            let solid = self
                .geometries
                .remove(&geometry.id())
                .ok_or(RenderError::UnknownGeometry(geometry.id()))?;
            let surface_material = match self.materials.get(&material.id()) {
                Some(material) => material.clone(),
                None => {
                    self.geometries.insert(geometry.id(), solid);
                    return Err(RenderError::UnknownMaterial(material.id()));
                }
            };
            self.draw_mesh(&solid, &surface_material, frame);
            self.geometries.insert(geometry.id(), solid);
        }

        self.stats.frames_rendered += 1;
        Ok(())
    }

    fn stats(&self) -> SurfaceStats {
        self.stats
    }
}

impl Drop for SoftwareSurface {
    fn drop(&mut self) {
        let live = (self.geometries.len(), self.materials.len());
        if live != (0, 0) {
            log::warn!(
                "software surface dropped with {} geometries and {} materials still allocated",
                live.0,
                live.1
            );
        }
    }
}
