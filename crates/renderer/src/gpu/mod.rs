//! GPU side of the scene.
//!
//! - `context` owns the wgpu instance/device and, for the preview, the window
//!   surface.
//! - `pipeline` compiles the material shader and caches one pipeline per
//!   output format.
//! - `uniforms` mirrors the material shader's uniform block.
//! - `state` holds the three materials and implements the capture traits on
//!   top of them.

mod context;
mod pipeline;
mod state;
mod uniforms;

pub(crate) use context::GpuContext;
pub(crate) use state::GpuScene;
