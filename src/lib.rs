//! Extruded SVG viewer core.
//!
//! Turns an SVG selection into an extruded, bevelled solid, frames and lights
//! it, and keeps a gently orbiting camera running while parameter slices
//! (material, lighting, extrusion, camera) are applied incrementally.

pub mod app;
pub mod config;
pub mod geometry;
pub mod protocol;
pub mod render;
pub mod state;

pub use app::{Advisory, Update, Viewer};
pub use config::ViewerConfig;
pub use geometry::{BoundingBox, GeometryError, Solid};
pub use render::{RenderError, RenderSurface, SoftwareSurface};
pub use state::ParameterState;
