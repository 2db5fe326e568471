pub mod frame_loop;
pub mod timing;

#[cfg(test)]
mod tests;

pub use frame_loop::{FrameId, FrameScheduler};
pub use timing::{AnimationClock, Clock, FrameTiming, ManualClock, SystemClock};

use std::fmt;

use crate::config::ViewerConfig;
use crate::geometry::{self, BoundingBox, Solid};
use crate::render::{
    lights, material, CameraController, FrameView, GeometryHandle, LightSet, MaterialHandle,
    PerspectiveCamera, RenderError, RenderSurface,
};
use crate::state::{
    Background, ExtrusionParams, LightingParams, MaterialKind, MaterialParams, ParameterState,
};

/// Why an update left the scene as it was. Displayed as a transient notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    NoShapes,
    InvalidSvg(String),
    NoMesh,
    Surface(String),
    TornDown,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::NoShapes => f.write_str("The selection has no fillable shapes"),
            Advisory::InvalidSvg(err) => write!(f, "Could not read the selection: {err}"),
            Advisory::NoMesh => f.write_str("Nothing to update yet"),
            Advisory::Surface(err) => write!(f, "Rendering failed: {err}"),
            Advisory::TornDown => f.write_str("The viewer has been closed"),
        }
    }
}

/// Outcome of a viewer operation. Failures never escape as errors.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Applied,
    Skipped(Advisory),
}

impl Update {
    pub fn is_applied(&self) -> bool {
        matches!(self, Update::Applied)
    }

    pub fn advisory(&self) -> Option<&Advisory> {
        match self {
            Update::Applied => None,
            Update::Skipped(advisory) => Some(advisory),
        }
    }
}

/// The one live mesh and what it was built from.
struct MeshResources {
    geometry: GeometryHandle,
    material: MaterialHandle,
    bounds: BoundingBox,
    depth: f32,
}

/// Scene orchestrator: owns the mesh resources, light rig, camera and the
/// frame loop, and applies parameter slices through explicit operations.
pub struct Viewer<S: RenderSurface, C: Clock> {
    surface: S,
    config: ViewerConfig,
    camera: CameraController,
    clock: AnimationClock<C>,
    scheduler: FrameScheduler,
    loop_handle: Option<FrameId>,
    timing: FrameTiming,
    mesh: Option<MeshResources>,
    svg: String,
    material_params: MaterialParams,
    lighting: LightingParams,
    lights: LightSet,
    background: Background,
    torn_down: bool,
}

impl<S: RenderSurface, C: Clock> Viewer<S, C> {
    /// Fails only when the surface cannot be used at all.
    pub fn new(surface: S, clock: C, config: ViewerConfig) -> Result<Self, RenderError> {
        let (width, height) = surface.size();
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }

        let camera = CameraController::new(&config.camera, config.orbit, surface.aspect());
        log::info!("viewer ready on a {}x{} surface", width, height);

        Ok(Self {
            surface,
            background: config.output.background,
            config,
            camera,
            clock: AnimationClock::new(clock),
            scheduler: FrameScheduler::new(),
            loop_handle: None,
            timing: FrameTiming::new(),
            mesh: None,
            svg: String::new(),
            material_params: MaterialParams::default(),
            lighting: LightingParams::default(),
            lights: LightSet::empty(),
            torn_down: false,
        })
    }

    // === Accessors ===

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        self.camera.camera()
    }

    pub fn camera_controller(&self) -> &CameraController {
        &self.camera
    }

    pub fn lights(&self) -> &LightSet {
        &self.lights
    }

    pub fn has_mesh(&self) -> bool {
        self.mesh.is_some()
    }

    pub fn mesh_bounds(&self) -> Option<BoundingBox> {
        self.mesh.as_ref().map(|mesh| mesh.bounds)
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    /// Play time driving the orbit phase.
    pub fn elapsed(&self) -> f32 {
        self.clock.elapsed()
    }

    pub fn is_loop_running(&self) -> bool {
        self.loop_handle.is_some()
    }

    pub fn frame_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Current camera-to-target distance (the read-back zoom value).
    pub fn zoom(&self) -> f32 {
        self.camera.distance()
    }

    // === Parameter operations ===

    /// Initial build: lights, mesh and framing, with the orbit clock at zero.
    pub fn set_scene(&mut self, state: &ParameterState) -> Update {
        if self.torn_down {
            return Update::Skipped(Advisory::TornDown);
        }
        self.background = state.background;
        self.camera.set_fov(state.camera.fov);
        self.rebuild_lights(&state.lighting);
        let update = self.set_mesh(state);
        self.clock.set_playing(state.playing);
        self.restart_orbit();
        update
    }

    /// Replaces the mesh from the full SVG. Zero shapes keeps the old mesh.
    pub fn set_mesh(&mut self, state: &ParameterState) -> Update {
        if self.torn_down {
            return Update::Skipped(Advisory::TornDown);
        }
        let params = state.extrusion.scaled(state.geometry_scale);
        let solid = match build_solid(&state.svg, &params) {
            Ok(solid) => solid,
            Err(advisory) => return Update::Skipped(advisory),
        };
        let Some(bounds) = solid.bounds() else {
            return Update::Skipped(Advisory::NoShapes);
        };
        let surface_material = material::build(&solid, &state.material);

        let geometry = match self.surface.allocate_geometry(&solid) {
            Ok(handle) => handle,
            Err(err) => return self.surface_failure("geometry upload", err),
        };
        let material_handle = match self.surface.allocate_material(&surface_material) {
            Ok(handle) => handle,
            Err(err) => {
                self.surface.release_geometry(geometry);
                return self.surface_failure("material upload", err);
            }
        };

        let replaced = self.mesh.replace(MeshResources {
            geometry,
            material: material_handle,
            bounds,
            depth: solid.depth(),
        });
        if let Some(old) = replaced {
            self.surface.release_geometry(old.geometry);
            self.surface.release_material(old.material);
        }

        self.svg = state.svg.clone();
        self.material_params = state.material.clone();
        log::info!(
            "mesh replaced: {} triangles, size {:?}",
            solid.triangle_count(),
            bounds.size()
        );

        self.reframe();
        self.rebuild_lights(&state.lighting);
        self.restart_orbit();
        Update::Applied
    }

    pub fn set_text(&mut self, state: &ParameterState) -> Update {
        self.set_mesh(state)
    }

    /// Rebuilds the geometry from the current SVG with new extrusion values.
    /// A physical material is rebuilt too since its thickness follows depth.
    pub fn set_extrusion(&mut self, state: &ParameterState) -> Update {
        if self.torn_down {
            return Update::Skipped(Advisory::TornDown);
        }
        if self.mesh.is_none() {
            return Update::Skipped(Advisory::NoMesh);
        }
        let params = state.extrusion.scaled(state.geometry_scale);
        let solid = match build_solid(&self.svg, &params) {
            Ok(solid) => solid,
            Err(advisory) => return Update::Skipped(advisory),
        };
        let Some(bounds) = solid.bounds() else {
            return Update::Skipped(Advisory::NoShapes);
        };

        let geometry = match self.surface.allocate_geometry(&solid) {
            Ok(handle) => handle,
            Err(err) => return self.surface_failure("geometry upload", err),
        };
        let new_material = if self.material_params.kind == MaterialKind::Physical {
            let surface_material = material::build(&solid, &self.material_params);
            match self.surface.allocate_material(&surface_material) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    self.surface.release_geometry(geometry);
                    return self.surface_failure("material upload", err);
                }
            }
        } else {
            None
        };

        let Some(mesh) = self.mesh.as_mut() else {
            return Update::Skipped(Advisory::NoMesh);
        };
        let old_geometry = std::mem::replace(&mut mesh.geometry, geometry);
        let old_material = new_material.map(|handle| std::mem::replace(&mut mesh.material, handle));
        mesh.bounds = bounds;
        mesh.depth = solid.depth();
        self.surface.release_geometry(old_geometry);
        if let Some(old) = old_material {
            self.surface.release_material(old);
        }
        log::debug!("extrusion rebuilt: depth {:.3}", solid.depth());

        self.reframe();
        let lighting = self.lighting.clone();
        self.rebuild_lights(&lighting);
        Update::Applied
    }

    pub fn set_material(&mut self, state: &ParameterState) -> Update {
        if self.torn_down {
            return Update::Skipped(Advisory::TornDown);
        }
        let Some(depth) = self.mesh.as_ref().map(|mesh| mesh.depth) else {
            return Update::Skipped(Advisory::NoMesh);
        };
        let surface_material = material::build_for_depth(depth, &state.material);
        let handle = match self.surface.allocate_material(&surface_material) {
            Ok(handle) => handle,
            Err(err) => return self.surface_failure("material upload", err),
        };
        let Some(mesh) = self.mesh.as_mut() else {
            self.surface.release_material(handle);
            return Update::Skipped(Advisory::NoMesh);
        };
        let old = std::mem::replace(&mut mesh.material, handle);
        self.surface.release_material(old);
        self.material_params = state.material.clone();
        log::debug!("material replaced ({:?})", state.material.kind);
        Update::Applied
    }

    /// Full clear-and-rebuild of the light rig; works with or without a mesh.
    pub fn set_lights(&mut self, state: &ParameterState) -> Update {
        if self.torn_down {
            return Update::Skipped(Advisory::TornDown);
        }
        self.rebuild_lights(&state.lighting);
        Update::Applied
    }

    /// Applies the field of view and renders one frame even when paused.
    pub fn set_camera(&mut self, state: &ParameterState) -> Update {
        if self.torn_down {
            return Update::Skipped(Advisory::TornDown);
        }
        let fov = self.camera.set_fov(state.camera.fov);
        log::debug!("fov set to {:.1}", fov);
        match self.render_now() {
            Ok(()) => Update::Applied,
            Err(err) => Update::Skipped(Advisory::Surface(err.to_string())),
        }
    }

    pub fn set_background(&mut self, background: Background) {
        self.background = background;
    }

    /// Pausing freezes play time; resuming continues from the same phase.
    pub fn set_playing(&mut self, playing: bool) -> Update {
        if self.clock.set_playing(playing) {
            log::debug!(
                "{} at play time {:.3}s",
                if playing { "resumed" } else { "paused" },
                self.clock.elapsed()
            );
        }
        Update::Applied
    }

    /// Stops playback, reframes and restarts the orbit phase from now.
    pub fn reset_view(&mut self) -> Update {
        if self.torn_down {
            return Update::Skipped(Advisory::TornDown);
        }
        if self.mesh.is_none() {
            return Update::Skipped(Advisory::NoMesh);
        }
        self.clock.set_playing(false);
        self.reframe();
        self.restart_orbit();
        Update::Applied
    }

    /// Size change notification from the host layout.
    pub fn resize(&mut self, width: u32, height: u32) -> Update {
        match self.surface.resize(width, height) {
            Ok(()) => {
                self.camera.set_aspect(self.surface.aspect());
                Update::Applied
            }
            Err(err) => {
                log::warn!("resize to {}x{} rejected: {}", width, height, err);
                Update::Skipped(Advisory::Surface(err.to_string()))
            }
        }
    }

    // === User camera input ===

    /// Registers the telemetry sink for user zoom/rotate. The value is never
    /// read back as input.
    pub fn on_user_zoom(&mut self, callback: impl FnMut(f32) + 'static) {
        self.camera.on_user_zoom(callback);
    }

    pub fn user_zoom(&mut self, scale: f32) -> f32 {
        self.camera.dolly(scale)
    }

    pub fn user_rotate(&mut self, delta_theta: f32, delta_phi: f32) -> f32 {
        self.camera.rotate(delta_theta, delta_phi)
    }

    // === Frame loop ===

    pub fn start_loop(&mut self) {
        if self.torn_down || self.loop_handle.is_some() {
            return;
        }
        self.loop_handle = Some(self.scheduler.request());
        log::info!("frame loop started");
    }

    /// `full_stop` cancels the scheduled frame. Otherwise only the handle is
    /// forgotten and an in-flight frame still runs and reschedules itself.
    pub fn stop_loop(&mut self, full_stop: bool) {
        if full_stop && self.scheduler.cancel().is_some() {
            log::info!("frame loop stopped");
        }
        self.loop_handle = None;
    }

    /// Runs the due frame, if any: orbit update, render, reschedule.
    pub fn pump_frame(&mut self) -> bool {
        if self.torn_down || self.scheduler.take_due().is_none() {
            return false;
        }
        self.timing.update(self.clock.wall_time());
        if self.clock.is_playing() {
            self.camera.advance_orbit(self.clock.elapsed());
        }
        if let Err(err) = self.render_now() {
            log::warn!("frame render failed: {}", err);
        }
        self.loop_handle = Some(self.scheduler.request());
        true
    }

    /// Renders the current scene immediately.
    pub fn render_now(&mut self) -> Result<(), RenderError> {
        let frame = FrameView {
            camera: self.camera.camera(),
            mesh: self
                .mesh
                .as_ref()
                .map(|mesh| (&mesh.geometry, &mesh.material)),
            lights: &self.lights,
            clear_color: self.background.clear_color(),
        };
        self.surface.render(&frame)
    }

    /// Stops the loop, then releases every surface resource. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.stop_loop(true);
        if let Some(mesh) = self.mesh.take() {
            self.surface.release_geometry(mesh.geometry);
            self.surface.release_material(mesh.material);
        }
        self.lights.clear();
        self.torn_down = true;
        log::info!("viewer torn down");
    }

    // === Internals ===

    fn reframe(&mut self) {
        if let Some(bounds) = self.mesh.as_ref().map(|mesh| mesh.bounds) {
            self.camera
                .zoom_to_fit(&bounds, self.config.framing.padding);
            self.camera.rebase_orbit(self.clock.elapsed());
        }
    }

    fn restart_orbit(&mut self) {
        self.clock.reset();
        self.camera.begin_orbit();
    }

    fn rebuild_lights(&mut self, lighting: &LightingParams) {
        self.lights.clear();
        self.lights = lights::build(
            self.mesh.as_ref().map(|mesh| &mesh.bounds),
            lighting,
            &self.config.lights,
        );
        self.lighting = lighting.clone();
    }

    fn surface_failure(&self, what: &str, err: RenderError) -> Update {
        log::warn!("{} failed: {}", what, err);
        Update::Skipped(Advisory::Surface(err.to_string()))
    }
}

impl<S: RenderSurface, C: Clock> Drop for Viewer<S, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Builds a non-empty solid or explains why not.
fn build_solid(svg: &str, params: &ExtrusionParams) -> Result<Solid, Advisory> {
    match geometry::build(svg, params) {
        Ok(solid) if solid.is_empty() => {
            log::warn!("selection produced no shapes; keeping the current mesh");
            Err(Advisory::NoShapes)
        }
        Ok(solid) => Ok(solid),
        Err(err) => {
            log::warn!("failed to build geometry: {}", err);
            Err(Advisory::InvalidSvg(err.to_string()))
        }
    }
}
