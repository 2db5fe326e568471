pub mod camera;
pub mod lights;
pub mod material;
pub mod software;

pub use camera::{CameraController, PerspectiveCamera, Spherical};
pub use lights::{DirectionalLight, LightRole, LightSet};
pub use material::{CullMode, SurfaceMaterial};
pub use software::SoftwareSurface;

use crate::geometry::Solid;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("geometry upload rejected: {0}")]
    GeometryRejected(String),
    #[error("unknown geometry handle #{0}")]
    UnknownGeometry(u64),
    #[error("unknown material handle #{0}")]
    UnknownMaterial(u64),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Surface-owned geometry buffers. Not `Clone`: releasing consumes the handle.
///
/// Only surfaces mint handles:
///
/// ```compile_fail
/// let forged = extrude_viewer::render::GeometryHandle::new(7);
/// ```
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct GeometryHandle(u64);

/// Surface-owned material state. Not `Clone`: releasing consumes the handle.
///
/// ```compile_fail
/// let forged = extrude_viewer::render::MaterialHandle::new(7);
/// ```
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MaterialHandle(u64);

impl GeometryHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl MaterialHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Everything one frame needs, borrowed from the viewer.
pub struct FrameView<'a> {
    pub camera: &'a PerspectiveCamera,
    pub mesh: Option<(&'a GeometryHandle, &'a MaterialHandle)>,
    pub lights: &'a LightSet,
    pub clear_color: [f32; 4],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    pub geometries_allocated: usize,
    pub geometries_released: usize,
    pub materials_allocated: usize,
    pub materials_released: usize,
    pub frames_rendered: usize,
}

impl SurfaceStats {
    pub fn live_geometries(&self) -> usize {
        self.geometries_allocated - self.geometries_released
    }

    pub fn live_materials(&self) -> usize {
        self.materials_allocated - self.materials_released
    }
}

/// Rendering backend seam. The viewer is the only caller and owns every
/// handle it receives.
pub trait RenderSurface {
    fn size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    fn allocate_geometry(&mut self, solid: &Solid) -> Result<GeometryHandle, RenderError>;

    fn release_geometry(&mut self, handle: GeometryHandle);

    fn allocate_material(&mut self, material: &SurfaceMaterial)
        -> Result<MaterialHandle, RenderError>;

    fn release_material(&mut self, handle: MaterialHandle);

    fn render(&mut self, frame: &FrameView<'_>) -> Result<(), RenderError>;

    fn stats(&self) -> SurfaceStats;

    fn aspect(&self) -> f32 {
        let (width, height) = self.size();
        if height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        }
    }
}
