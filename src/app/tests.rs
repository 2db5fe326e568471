use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use glam::Vec3;

use super::*;
use crate::config::ViewerConfig;
use crate::render::{RenderSurface, SoftwareSurface};
use crate::state::{MaterialKind, ParameterState};

const SQUARE: &str = r#"<svg width="20" height="20"><path d="M100 100 H120 V120 H100 Z"/></svg>"#;

const TWO_GLYPHS: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="60" height="40">
  <path d="M0 0 H10 V40 H0 Z" fill="black"/>
  <path fill-rule="evenodd" d="M20 0 H50 V40 H20 Z M28 8 H42 V32 H28 Z" fill="black"/>
</svg>"#;

fn viewer() -> (Viewer<SoftwareSurface, ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    let surface = SoftwareSurface::new(32, 32).unwrap();
    let viewer = Viewer::new(surface, clock.clone(), ViewerConfig::default()).unwrap();
    (viewer, clock)
}

fn state(svg: &str) -> ParameterState {
    ParameterState {
        svg: svg.to_string(),
        ..ParameterState::default()
    }
}

fn flat_state(svg: &str, depth: f32) -> ParameterState {
    let mut state = state(svg);
    state.extrusion.depth = depth;
    state.extrusion.bevel_enabled = false;
    state
}

fn assert_vec_eq(a: Vec3, b: Vec3) {
    assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-4);
    assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-4);
    assert_abs_diff_eq!(a.z, b.z, epsilon = 1e-4);
}

#[test]
fn construction_rejects_unusable_surface() {
    struct ZeroSurface(SoftwareSurface);
    impl RenderSurface for ZeroSurface {
        fn size(&self) -> (u32, u32) {
            (0, 0)
        }
        fn resize(&mut self, w: u32, h: u32) -> Result<(), RenderError> {
            self.0.resize(w, h)
        }
        fn allocate_geometry(&mut self, solid: &Solid) -> Result<GeometryHandle, RenderError> {
            self.0.allocate_geometry(solid)
        }
        fn release_geometry(&mut self, handle: GeometryHandle) {
            self.0.release_geometry(handle)
        }
        fn allocate_material(
            &mut self,
            material: &crate::render::SurfaceMaterial,
        ) -> Result<MaterialHandle, RenderError> {
            self.0.allocate_material(material)
        }
        fn release_material(&mut self, handle: MaterialHandle) {
            self.0.release_material(handle)
        }
        fn render(&mut self, frame: &FrameView<'_>) -> Result<(), RenderError> {
            self.0.render(frame)
        }
        fn stats(&self) -> crate::render::SurfaceStats {
            self.0.stats()
        }
    }

    let surface = ZeroSurface(SoftwareSurface::new(4, 4).unwrap());
    let result = Viewer::new(surface, ManualClock::new(), ViewerConfig::default());
    assert!(matches!(result, Err(RenderError::InvalidSize { .. })));
}

#[test]
fn mesh_is_centered_and_targeted() {
    let (mut viewer, _clock) = viewer();
    assert!(viewer.set_scene(&state(SQUARE)).is_applied());

    let bounds = viewer.mesh_bounds().unwrap();
    assert_vec_eq(bounds.center(), Vec3::ZERO);
    assert_eq!(viewer.camera().target, bounds.center());
    assert!(viewer.lights().is_complete());
}

#[test]
fn repeated_mesh_replacement_releases_all_but_one() {
    let (mut viewer, _clock) = viewer();
    let n = 5;
    for i in 0..n {
        let mut s = state(SQUARE);
        s.extrusion.depth = 1.0 + i as f32;
        assert!(viewer.set_mesh(&s).is_applied());
    }
    let stats = viewer.surface().stats();
    assert_eq!(stats.geometries_allocated, n);
    assert_eq!(stats.geometries_released, n - 1);
    assert_eq!(stats.materials_released, n - 1);
    assert_eq!(stats.live_geometries(), 1);
    assert_eq!(stats.live_materials(), 1);
}

#[test]
fn extrusion_and_material_updates_release_only_what_they_replace() {
    let (mut viewer, _clock) = viewer();
    let mut s = state(SQUARE);
    assert!(viewer.set_scene(&s).is_applied());

    for depth in [2.0, 3.0, 4.0] {
        s.extrusion.depth = depth;
        assert!(viewer.set_extrusion(&s).is_applied());
    }
    let stats = viewer.surface().stats();
    assert_eq!(stats.geometries_released, 3);
    assert_eq!(stats.materials_released, 0);

    for roughness in [0.1, 0.5] {
        s.material.roughness = roughness;
        assert!(viewer.set_material(&s).is_applied());
    }
    let stats = viewer.surface().stats();
    assert_eq!(stats.materials_released, 2);
    assert_eq!(stats.live_geometries(), 1);
    assert_eq!(stats.live_materials(), 1);
}

#[test]
fn physical_material_is_rebuilt_with_extrusion() {
    let (mut viewer, _clock) = viewer();
    let mut s = state(SQUARE);
    s.material.kind = MaterialKind::Physical;
    assert!(viewer.set_scene(&s).is_applied());

    s.extrusion.depth = 30.0;
    assert!(viewer.set_extrusion(&s).is_applied());
    let stats = viewer.surface().stats();
    assert_eq!(stats.geometries_released, 1);
    assert_eq!(stats.materials_released, 1);
    assert_eq!(stats.live_materials(), 1);
}

#[test]
fn empty_selection_keeps_previous_mesh() {
    let (mut viewer, _clock) = viewer();
    assert!(viewer.set_scene(&state(SQUARE)).is_applied());
    let before = viewer.mesh_bounds();
    let stats_before = viewer.surface().stats();

    let update = viewer.set_mesh(&state("<svg width=\"10\" height=\"10\"></svg>"));
    assert_eq!(update, Update::Skipped(Advisory::NoShapes));
    assert_eq!(viewer.mesh_bounds(), before);
    assert_eq!(viewer.surface().stats(), stats_before);

    let update = viewer.set_mesh(&state("<svg><path d=\"M 0 0 L x\"/></svg>"));
    assert!(matches!(update, Update::Skipped(Advisory::InvalidSvg(_))));
    assert_eq!(viewer.mesh_bounds(), before);
}

#[test]
fn empty_first_selection_creates_no_mesh() {
    let (mut viewer, _clock) = viewer();
    let update = viewer.set_scene(&state(""));
    assert_eq!(update, Update::Skipped(Advisory::NoShapes));
    assert!(!viewer.has_mesh());
    assert_eq!(viewer.surface().stats().geometries_allocated, 0);
    // Lights still come up with the default radius.
    assert!(viewer.lights().is_complete());
}

#[test]
fn mesh_dependent_operations_need_a_mesh() {
    let (mut viewer, _clock) = viewer();
    let s = state(SQUARE);
    assert_eq!(viewer.set_extrusion(&s), Update::Skipped(Advisory::NoMesh));
    assert_eq!(viewer.set_material(&s), Update::Skipped(Advisory::NoMesh));
    assert_eq!(viewer.reset_view(), Update::Skipped(Advisory::NoMesh));
    assert!(viewer.set_lights(&s).is_applied());
    assert!(viewer.set_camera(&s).is_applied());
}

#[test]
fn geometry_scale_prescales_depth() {
    let (mut viewer, _clock) = viewer();
    let mut s = flat_state(SQUARE, 10.0);
    s.geometry_scale = 2.0;
    assert!(viewer.set_scene(&s).is_applied());
    assert_abs_diff_eq!(viewer.mesh_bounds().unwrap().size().z, 20.0, epsilon = 1e-3);
    // The outline itself is not scaled.
    assert_abs_diff_eq!(viewer.mesh_bounds().unwrap().size().x, 20.0, epsilon = 1e-3);
}

#[test]
fn pause_resume_keeps_orbit_phase() {
    let (mut paused, clock) = viewer();
    assert!(paused.set_scene(&state(SQUARE)).is_applied());
    paused.start_loop();

    clock.advance_secs(1.0);
    assert!(paused.pump_frame());
    let at_t = paused.camera().position;

    assert!(paused.set_playing(false).is_applied());
    clock.advance_secs(5.0);
    assert!(paused.pump_frame());
    assert_vec_eq(paused.camera().position, at_t);

    assert!(paused.set_playing(true).is_applied());
    assert!(paused.pump_frame());
    assert_vec_eq(paused.camera().position, at_t);

    clock.advance_secs(2.0);
    assert!(paused.pump_frame());
    assert_abs_diff_eq!(paused.elapsed(), 3.0, epsilon = 1e-4);

    let (mut straight, straight_clock) = viewer();
    assert!(straight.set_scene(&state(SQUARE)).is_applied());
    straight.start_loop();
    straight_clock.advance_secs(3.0);
    assert!(straight.pump_frame());

    assert_vec_eq(paused.camera().position, straight.camera().position);
}

#[test]
fn orbit_sways_while_playing() {
    let (mut viewer, clock) = viewer();
    assert!(viewer.set_scene(&state(SQUARE)).is_applied());
    viewer.start_loop();
    assert!(viewer.pump_frame());
    let start = viewer.camera().position;
    let radius = viewer.zoom();

    clock.advance_secs(2.0);
    assert!(viewer.pump_frame());
    let moved = viewer.camera().position;
    assert!(start.distance(moved) > 1e-3);
    assert_abs_diff_eq!(viewer.zoom(), radius, epsilon = 1e-3);
    assert_eq!(viewer.camera().target, Vec3::ZERO);
}

#[test]
fn extrusion_reframe_survives_the_next_frame() {
    let (mut viewer, clock) = viewer();
    assert!(viewer.set_scene(&flat_state(SQUARE, 1.0)).is_applied());
    viewer.start_loop();
    clock.advance_secs(1.0);
    assert!(viewer.pump_frame());
    let before = viewer.zoom();

    assert!(viewer.set_extrusion(&flat_state(SQUARE, 200.0)).is_applied());
    let framed = viewer.zoom();
    assert!(framed > before * 2.0);
    let placed = viewer.camera().position;

    // Same play time: the frame reproduces the reframed placement.
    assert!(viewer.pump_frame());
    assert!(viewer.camera().position.distance(placed) < 1e-2);

    clock.advance_secs(0.5);
    assert!(viewer.pump_frame());
    assert_abs_diff_eq!(viewer.zoom(), framed, epsilon = 1e-2);
    assert_abs_diff_eq!(viewer.elapsed(), 1.5, epsilon = 1e-4);
}

#[test]
fn full_stop_cancels_the_scheduled_frame() {
    let (mut viewer, _clock) = viewer();
    viewer.start_loop();
    assert!(viewer.frame_pending());
    viewer.stop_loop(true);
    assert!(!viewer.is_loop_running());
    assert!(!viewer.pump_frame());
    assert_eq!(viewer.surface().stats().frames_rendered, 0);
}

#[test]
fn soft_stop_only_forgets_the_handle() {
    let (mut viewer, _clock) = viewer();
    viewer.start_loop();
    viewer.stop_loop(false);
    assert!(!viewer.is_loop_running());
    // The in-flight frame still runs and reschedules.
    assert!(viewer.pump_frame());
    assert!(viewer.is_loop_running());

    // Starting twice never stacks frames.
    viewer.stop_loop(false);
    viewer.start_loop();
    viewer.start_loop();
    assert!(viewer.pump_frame());
    assert!(viewer.pump_frame());
    assert_eq!(viewer.surface().stats().frames_rendered, 3);
}

#[test]
fn set_camera_renders_even_when_stopped() {
    let (mut viewer, _clock) = viewer();
    assert!(viewer.set_scene(&state(SQUARE)).is_applied());
    assert!(viewer.set_playing(false).is_applied());
    let mut s = state(SQUARE);
    s.camera.fov = 50.0;
    assert!(viewer.set_camera(&s).is_applied());
    assert_eq!(viewer.camera().fov, 50.0);
    assert_eq!(viewer.surface().stats().frames_rendered, 1);
}

#[test]
fn reset_view_pauses_and_reframes_identically() {
    let (mut viewer, clock) = viewer();
    assert!(viewer.set_scene(&state(SQUARE)).is_applied());
    viewer.start_loop();
    clock.advance_secs(1.5);
    assert!(viewer.pump_frame());

    assert!(viewer.reset_view().is_applied());
    assert!(!viewer.is_playing());
    assert_abs_diff_eq!(viewer.elapsed(), 0.0, epsilon = 1e-6);
    let first = viewer.camera().clone();

    assert!(viewer.reset_view().is_applied());
    let second = viewer.camera().clone();
    assert_vec_eq(first.position, second.position);
    assert_eq!(first.target, second.target);
}

#[test]
fn user_zoom_is_reported_not_applied_back() {
    let (mut viewer, _clock) = viewer();
    assert!(viewer.set_scene(&state(SQUARE)).is_applied());
    let reported = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&reported);
    viewer.on_user_zoom(move |distance| *sink.borrow_mut() = Some(distance));

    let before = viewer.zoom();
    let after = viewer.user_zoom(0.5);
    assert_abs_diff_eq!(after, before * 0.5, epsilon = 1e-3);
    assert_eq!(*reported.borrow(), Some(after));

    // A camera update with a stale zoom value leaves the distance alone.
    let mut s = state(SQUARE);
    s.camera.zoom = 123.0;
    assert!(viewer.set_camera(&s).is_applied());
    assert_abs_diff_eq!(viewer.zoom(), after, epsilon = 1e-4);

    viewer.user_rotate(0.2, 0.1);
    assert_eq!(viewer.camera().target, Vec3::ZERO);
}

#[test]
fn resize_updates_aspect() {
    let (mut viewer, _clock) = viewer();
    assert!(viewer.resize(64, 32).is_applied());
    assert_abs_diff_eq!(viewer.camera().aspect, 2.0);
    assert!(matches!(
        viewer.resize(0, 32),
        Update::Skipped(Advisory::Surface(_))
    ));
    assert_abs_diff_eq!(viewer.camera().aspect, 2.0);
}

#[test]
fn teardown_stops_loop_then_releases() {
    let (mut viewer, _clock) = viewer();
    assert!(viewer.set_scene(&state(SQUARE)).is_applied());
    viewer.start_loop();
    viewer.teardown();

    assert!(!viewer.pump_frame());
    let stats = viewer.surface().stats();
    assert_eq!(stats.live_geometries(), 0);
    assert_eq!(stats.live_materials(), 0);
    assert!(viewer.lights().is_empty());
    assert_eq!(viewer.set_mesh(&state(SQUARE)), Update::Skipped(Advisory::TornDown));
    viewer.teardown();
}

#[test]
fn two_glyph_scene_end_to_end() {
    let (mut viewer, _clock) = viewer();
    let mut s = state(TWO_GLYPHS);
    s.extrusion.depth = 10.0;
    assert!(viewer.set_scene(&s).is_applied());

    let bounds = viewer.mesh_bounds().unwrap();
    let depth = bounds.size().z;
    // Depth plus the default bevel thickness on both faces.
    assert_abs_diff_eq!(depth, 11.0, epsilon = 1e-3);
    assert_vec_eq(bounds.center(), Vec3::ZERO);
    assert_abs_diff_eq!(bounds.size().x, 51.0, epsilon = 1e-2);

    let released_before = viewer.surface().stats().geometries_released;
    s.extrusion.depth = 20.0;
    assert!(viewer.set_extrusion(&s).is_applied());
    let doubled = viewer.mesh_bounds().unwrap().size().z;
    assert_abs_diff_eq!(doubled, 21.0, epsilon = 1e-3);
    assert!((doubled / depth - 2.0).abs() < 0.1);
    assert_eq!(
        viewer.surface().stats().geometries_released,
        released_before + 1
    );
    assert_vec_eq(viewer.mesh_bounds().unwrap().center(), Vec3::ZERO);
    assert_eq!(viewer.camera().target, Vec3::ZERO);
}

#[test]
fn advisories_read_as_notices() {
    assert_eq!(
        Advisory::NoShapes.to_string(),
        "The selection has no fillable shapes"
    );
    let update = Update::Skipped(Advisory::Surface("lost".into()));
    assert_eq!(update.advisory().map(|a| a.to_string()).as_deref(), Some("Rendering failed: lost"));
    assert!(Update::Applied.advisory().is_none());
}
