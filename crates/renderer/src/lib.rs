//! wgpu renderer for the warp scene.
//!
//! ```text
//!   CLI / warpshade
//!          │ RendererConfig
//!          ├──▶ run_preview ──▶ winit event loop ──▶ Preview::redraw
//!          │                                            ├─▶ UniformSynchronizer ─▶ GpuScene
//!          │                                            └─▶ scheduler::drive ─▶ capture ─▶ sink
//!          └──▶ run_headless_export ──▶ scheduler loop ──▶ (same capture path)
//! ```
//!
//! `GpuScene` owns the device, the three material uniform buffers and any
//! off-screen capture targets. It implements the scene crate's
//! `RenderBackend` and `SceneBindings` traits, so the capture lease and the
//! synchroniser drive it without knowing about wgpu.

mod camera;
mod compile;
mod gpu;
mod headless;
mod keymap;
mod session;
mod types;
mod window;

pub use headless::{run_headless_export, HeadlessSummary};
pub use scheduler::ExportMode;
pub use types::{AdapterProfile, RendererConfig};
pub use window::run_preview;
