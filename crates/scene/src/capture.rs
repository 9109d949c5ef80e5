//! Off-screen capture of a single high-resolution frame.
//!
//! A capture borrows the renderer exclusively through a [`CaptureLease`]. The
//! lease swaps in a dedicated target at the requested size, forces every
//! material to full opacity and hands everything back when dropped, so a
//! failing render or readback never leaves the live view pointing at a
//! released target.

use image::RgbaImage;
use tracing::{debug, warn};

use crate::uniforms::{MaterialRole, SceneBindings};

/// Which side currently drives the renderer's output target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOwner {
    Live,
    Capture,
}

/// Opaque handle to a render target created by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetHandle(pub u64);

/// Device limits that bound capture sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLimits {
    pub max_dimension: u32,
    pub max_buffer_bytes: u64,
}

/// Vertical order of rows returned by [`RenderBackend::read_pixels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    /// First row is the bottom of the image (GL convention).
    BottomUp,
    TopDown,
}

/// Raw RGBA8 pixels read back from a target.
#[derive(Debug, Clone, PartialEq)]
pub struct Readback {
    pub width: u32,
    pub height: u32,
    pub rows: RowOrder,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no renderer is available for capture")]
    RendererUnavailable,
    #[error("failed to allocate {width}x{height} capture target: {reason}")]
    TargetAllocation {
        width: u32,
        height: u32,
        reason: String,
    },
    #[error("render pass failed: {0}")]
    Render(String),
    #[error("pixel readback failed: {0}")]
    Readback(String),
    #[error("readback returned {actual} bytes, expected {expected}")]
    PixelLength { expected: usize, actual: usize },
}

/// Renderer collaborator driven by the capture pipeline.
pub trait RenderBackend {
    fn output_size(&self) -> (u32, u32);
    fn set_output_size(&mut self, width: u32, height: u32);
    fn create_target(&mut self, width: u32, height: u32) -> Result<TargetHandle, CaptureError>;
    /// `None` means the live presentation surface.
    fn active_target(&self) -> Option<TargetHandle>;
    fn set_render_target(&mut self, target: Option<TargetHandle>);
    fn render_once(&mut self) -> Result<(), CaptureError>;
    fn read_pixels(&mut self, target: TargetHandle) -> Result<Readback, CaptureError>;
    fn release_target(&mut self, target: TargetHandle);
    fn ownership(&self) -> RenderOwner;
    fn set_ownership(&mut self, owner: RenderOwner);
    fn limits(&self) -> CaptureLimits;
}

/// A renderer that also owns the scene's material bindings.
pub trait SceneRenderer: RenderBackend + SceneBindings {}

impl<T: RenderBackend + SceneBindings + ?Sized> SceneRenderer for T {}

/// Final capture dimensions after applying device limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSize {
    pub width: u32,
    pub height: u32,
    pub clamped: bool,
}

const ROW_ALIGNMENT: u64 = 256;

fn padded_bytes(width: u32, height: u32) -> u64 {
    let row = u64::from(width) * 4;
    let padded_row = row.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT;
    padded_row * u64::from(height)
}

/// Scales the viewport and shrinks the result, keeping aspect, until it fits
/// the device's texture and buffer limits.
pub fn capture_size(viewport: (u32, u32), scale: f32, limits: CaptureLimits) -> CaptureSize {
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
    let mut width = ((viewport.0.max(1) as f64) * f64::from(scale)).floor().max(1.0);
    let mut height = ((viewport.1.max(1) as f64) * f64::from(scale)).floor().max(1.0);
    let mut clamped = false;

    let max_dim = f64::from(limits.max_dimension.max(1));
    let dim_factor = (max_dim / width).min(max_dim / height);
    if dim_factor < 1.0 {
        width = (width * dim_factor).floor().max(1.0);
        height = (height * dim_factor).floor().max(1.0);
        clamped = true;
    }

    let mut size = (width as u32, height as u32);
    if padded_bytes(size.0, size.1) > limits.max_buffer_bytes {
        let factor = (limits.max_buffer_bytes as f64 / padded_bytes(size.0, size.1) as f64).sqrt();
        size.0 = ((width * factor).floor() as u32).max(1);
        size.1 = ((height * factor).floor() as u32).max(1);
        while padded_bytes(size.0, size.1) > limits.max_buffer_bytes && size.0 > 1 && size.1 > 1 {
            size.0 = ((size.0 as f64) * 0.99).floor() as u32;
            size.1 = ((size.1 as f64) * 0.99).floor() as u32;
        }
        clamped = true;
    }

    CaptureSize {
        width: size.0,
        height: size.1,
        clamped,
    }
}

/// Scoped exclusive use of the renderer for one off-screen frame.
pub struct CaptureLease<'a, R: SceneRenderer + ?Sized> {
    renderer: &'a mut R,
    target: TargetHandle,
    width: u32,
    height: u32,
    previous_size: (u32, u32),
    previous_target: Option<TargetHandle>,
    saved_opacity: Vec<(MaterialRole, f32)>,
}

impl<'a, R: SceneRenderer + ?Sized> CaptureLease<'a, R> {
    pub fn acquire(renderer: &'a mut R, width: u32, height: u32) -> Result<Self, CaptureError> {
        let previous_size = renderer.output_size();
        let previous_target = renderer.active_target();
        renderer.set_ownership(RenderOwner::Capture);

        let target = match renderer.create_target(width, height) {
            Ok(target) => target,
            Err(err) => {
                renderer.set_ownership(RenderOwner::Live);
                return Err(err);
            }
        };
        renderer.set_render_target(Some(target));
        renderer.set_output_size(width, height);

        let mut saved_opacity = Vec::new();
        for role in MaterialRole::ALL {
            if let Some(binding) = renderer.binding_mut(role) {
                if let Some(opacity) = binding.opacity() {
                    saved_opacity.push((role, opacity));
                    binding.set_opacity(1.0);
                }
            }
        }

        debug!(width, height, "capture lease acquired");
        Ok(Self {
            renderer,
            target,
            width,
            height,
            previous_size,
            previous_target,
            saved_opacity,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn render(&mut self) -> Result<(), CaptureError> {
        self.renderer.render_once()
    }

    pub fn read(&mut self) -> Result<Readback, CaptureError> {
        self.renderer.read_pixels(self.target)
    }
}

impl<R: SceneRenderer + ?Sized> Drop for CaptureLease<'_, R> {
    fn drop(&mut self) {
        self.renderer.release_target(self.target);
        self.renderer.set_render_target(self.previous_target);
        let (width, height) = self.previous_size;
        self.renderer.set_output_size(width, height);
        for (role, opacity) in self.saved_opacity.drain(..) {
            if let Some(binding) = self.renderer.binding_mut(role) {
                binding.set_opacity(opacity);
            }
        }
        self.renderer.set_ownership(RenderOwner::Live);
        debug!("capture lease released");
    }
}

/// Renders one frame at `scale` times the current output size and returns it
/// with a top-left origin.
pub fn capture<R: SceneRenderer + ?Sized>(renderer: &mut R, scale: f32) -> Result<RgbaImage, CaptureError> {
    let viewport = renderer.output_size();
    let size = capture_size(viewport, scale, renderer.limits());
    if size.clamped {
        warn!(
            requested_scale = scale,
            width = size.width,
            height = size.height,
            "capture size clamped to device limits"
        );
    }

    let readback = {
        let mut lease = CaptureLease::acquire(renderer, size.width, size.height)?;
        lease.render()?;
        lease.read()?
    };
    into_image(readback)
}

/// Converts raw readback into a top-left origin image, reversing rows when the
/// backend produced them bottom-up.
pub fn into_image(readback: Readback) -> Result<RgbaImage, CaptureError> {
    let Readback {
        width,
        height,
        rows,
        bytes,
    } = readback;
    let expected = width as usize * height as usize * 4;
    let actual = bytes.len();
    let mut image = RgbaImage::from_raw(width, height, bytes)
        .filter(|_| actual == expected)
        .ok_or(CaptureError::PixelLength { expected, actual })?;
    if rows == RowOrder::BottomUp {
        image::imageops::flip_vertical_in_place(&mut image);
    }
    Ok(image)
}
