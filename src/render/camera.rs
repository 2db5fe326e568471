use std::f32::consts::PI;

use glam::{Mat4, Vec3};

use crate::config::{CameraConfig, OrbitConfig};
use crate::geometry::BoundingBox;
use crate::state::{FOV_MAX, FOV_MIN};

/// Keeps the polar angle away from the poles.
const POLAR_EPSILON: f32 = 1e-4;
const MIN_DISTANCE: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl PerspectiveCamera {
    pub fn new(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            position: Vec3::from_array(config.position),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: config.fov.clamp(FOV_MIN, FOV_MAX),
            aspect: sanitize_aspect(aspect),
            near: config.near,
            far: config.far,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn distance_to_target(&self) -> f32 {
        self.position.distance(self.target)
    }

    /// Unit vector from the target toward the camera.
    pub fn view_offset_direction(&self) -> Vec3 {
        (self.position - self.target)
            .try_normalize()
            .unwrap_or(Vec3::Z)
    }
}

fn sanitize_aspect(aspect: f32) -> f32 {
    if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    }
}

/// Radius, polar angle from +Y, and azimuth around Y measured from +Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spherical {
    pub radius: f32,
    pub phi: f32,
    pub theta: f32,
}

impl Spherical {
    pub fn from_offset(offset: Vec3) -> Self {
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return Self {
                radius: 0.0,
                phi: PI / 2.0,
                theta: 0.0,
            };
        }
        Self {
            radius,
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
            theta: offset.x.atan2(offset.z),
        }
    }

    pub fn to_offset(self) -> Vec3 {
        let sin_phi = self.phi.sin();
        Vec3::new(
            self.radius * sin_phi * self.theta.sin(),
            self.radius * self.phi.cos(),
            self.radius * sin_phi * self.theta.cos(),
        )
    }

    pub fn clamp_polar(mut self) -> Self {
        self.phi = self.phi.clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        self
    }
}

/// Framing, idle sway, and user orbit input for one perspective camera.
///
/// The sway perturbs a reference spherical position (`base`) around the
/// look-at target as a function of elapsed play time only, so the same
/// elapsed value always yields the same camera transform.
pub struct CameraController {
    camera: PerspectiveCamera,
    orbit: OrbitConfig,
    configured_far: f32,
    base: Spherical,
    on_user_zoom: Option<Box<dyn FnMut(f32)>>,
}

impl std::fmt::Debug for CameraController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraController")
            .field("camera", &self.camera)
            .field("orbit", &self.orbit)
            .field("base", &self.base)
            .field("on_user_zoom", &self.on_user_zoom.is_some())
            .finish()
    }
}

impl CameraController {
    pub fn new(config: &CameraConfig, orbit: OrbitConfig, aspect: f32) -> Self {
        let camera = PerspectiveCamera::new(config, aspect);
        let mut controller = Self {
            configured_far: camera.far,
            camera,
            orbit,
            base: Spherical::from_offset(Vec3::Z),
            on_user_zoom: None,
        };
        controller.begin_orbit();
        controller
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn orbit_config(&self) -> OrbitConfig {
        self.orbit
    }

    pub fn distance(&self) -> f32 {
        self.camera.distance_to_target()
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.camera.aspect = sanitize_aspect(aspect);
    }

    /// Clamped to the supported range; returns the applied value.
    pub fn set_fov(&mut self, fov: f32) -> f32 {
        let fov = if fov.is_finite() { fov } else { self.camera.fov };
        self.camera.fov = fov.clamp(FOV_MIN, FOV_MAX);
        self.camera.fov
    }

    /// Moves the camera along its current view direction until the box fits
    /// the frame, then aims at the box center. Returns the new distance.
    pub fn zoom_to_fit(&mut self, bounds: &BoundingBox, padding: f32) -> f32 {
        let size = bounds.size();
        let center = bounds.center();
        let half_fov_tan = (self.camera.fov.to_radians() * 0.5).tan();

        let fit_height = size.y / (2.0 * half_fov_tan);
        let fit_width = size.x / (2.0 * half_fov_tan * self.camera.aspect);
        let padding = if padding.is_finite() && padding > 0.0 {
            padding
        } else {
            1.0
        };
        let distance =
            ((fit_height.max(fit_width) + size.z * 0.5) * padding).max(self.camera.near + MIN_DISTANCE);

        let direction = self.camera.view_offset_direction();
        self.camera.target = center;
        self.camera.position = center + direction * distance;
        self.camera.far = self.configured_far.max(distance + size.length() * 2.0);

        log::debug!(
            "zoom to fit: size {:?}, distance {:.3}, padding {:.2}",
            size,
            distance,
            padding
        );
        distance
    }

    /// Records the current camera placement as the sway reference. The
    /// reference is shifted so that elapsed 0 reproduces the current view.
    pub fn begin_orbit(&mut self) {
        self.rebase_orbit(0.0);
    }

    /// Re-derives the sway reference from the current placement so that
    /// `advance_orbit(elapsed)` reproduces it without restarting play time.
    pub fn rebase_orbit(&mut self, elapsed: f32) {
        let phase = elapsed * self.orbit.speed;
        let mut base = Spherical::from_offset(self.camera.position - self.camera.target);
        base.theta -= self.orbit.amplitude_theta * phase.cos();
        base.phi -= self.orbit.amplitude_phi * phase.sin();
        self.base = base;
    }

    /// Places the camera for `elapsed` seconds of play time.
    pub fn advance_orbit(&mut self, elapsed: f32) {
        let phase = elapsed * self.orbit.speed;
        let spherical = Spherical {
            radius: self.base.radius,
            phi: self.base.phi + self.orbit.amplitude_phi * phase.sin(),
            theta: self.base.theta + self.orbit.amplitude_theta * phase.cos(),
        }
        .clamp_polar();
        self.camera.position = self.camera.target + spherical.to_offset();
    }

    /// Current (theta, phi) of the camera around its target.
    pub fn orbit_angles(&self) -> (f32, f32) {
        let s = Spherical::from_offset(self.camera.position - self.camera.target);
        (s.theta, s.phi)
    }

    pub fn on_user_zoom(&mut self, callback: impl FnMut(f32) + 'static) {
        self.on_user_zoom = Some(Box::new(callback));
    }

    /// Scroll zoom: scales the distance to the target (`scale < 1` moves in).
    pub fn dolly(&mut self, scale: f32) -> f32 {
        if !(scale.is_finite() && scale > 0.0) {
            return self.distance();
        }
        let mut current = Spherical::from_offset(self.camera.position - self.camera.target);
        current.radius = (current.radius * scale).clamp(MIN_DISTANCE, self.camera.far * 0.5);
        self.camera.position = self.camera.target + current.to_offset();
        self.base.radius = current.radius;
        self.report_user_change()
    }

    /// Drag rotation around the target; the sway continues from here.
    pub fn rotate(&mut self, delta_theta: f32, delta_phi: f32) -> f32 {
        let current = Spherical::from_offset(self.camera.position - self.camera.target);
        let rotated = Spherical {
            theta: current.theta + delta_theta,
            phi: current.phi + delta_phi,
            ..current
        }
        .clamp_polar();
        self.camera.position = self.camera.target + rotated.to_offset();
        self.base.theta += delta_theta;
        self.base.phi = (self.base.phi + delta_phi).clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        self.report_user_change()
    }

    fn report_user_change(&mut self) -> f32 {
        let distance = self.distance();
        if let Some(callback) = self.on_user_zoom.as_mut() {
            callback(distance);
        }
        distance
    }
}
