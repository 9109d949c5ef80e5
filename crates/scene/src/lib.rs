//! Scene state and the synchronisation/capture pipeline that is independent of
//! any particular GPU backend.

pub mod animation;
pub mod capture;
pub mod clock;
pub mod controls;
pub mod encode;
pub mod error;
pub mod ramp;
pub mod sink;
pub mod state;
pub mod sync;
pub mod uniforms;

pub use animation::{AnimationState, Param};
pub use capture::{
    capture, CaptureError, CaptureLease, CaptureLimits, Readback, RenderBackend, RenderOwner,
    RowOrder, SceneRenderer, TargetHandle,
};
pub use clock::{SystemTimeSource, TimeSample, TimeSource, VirtualTimeSource};
pub use controls::{Control, ControlOutcome, ExportRequest};
pub use encode::{encode, ImageFormat};
pub use error::{RampBoundary, SceneError};
pub use ramp::{ColorRamp, ColorStop, RampAvailability, Rgb, StopId};
pub use sink::{DirectorySink, FrameSink};
pub use state::SceneState;
pub use sync::UniformSynchronizer;
pub use uniforms::{
    EnvironmentMap, Lighting, MaterialBinding, MaterialRole, SceneBindings, SceneTuning,
    UniformSet, MAX_COLORS,
};
