use rand::Rng;
use tracing::debug;

use crate::animation::Param;
use crate::ramp::{Rgb, StopId, NEW_STOP_COLOR, NEW_STOP_INTENSITY};
use crate::state::SceneState;

/// Commands issued by the editing surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    SetParam(Param, f32),
    /// Moves a parameter by a number of editing steps.
    NudgeParam(Param, f32),
    AddStop,
    RemoveStop(StopId),
    SetStopColor(StopId, Rgb),
    SetStopIntensity(StopId, f32),
    MoveStopUp(usize),
    MoveStopDown(usize),
    RandomizeColors,
    RunExport,
    StartExportVideo,
    CancelExport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportRequest {
    Burst,
    Sequence,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Updated,
    Unchanged,
    /// Export commands are handed back to whoever owns the scheduler.
    Export(ExportRequest),
}

/// Applies an editing command. Ramp edits that hit a size boundary and
/// out-of-range values leave the state as it was (after clamping).
pub fn apply<R: Rng + ?Sized>(state: &mut SceneState, control: &Control, rng: &mut R) -> ControlOutcome {
    let before = state.clone();
    match *control {
        Control::SetParam(param, value) => state.animation = state.animation.with(param, value),
        Control::NudgeParam(param, steps) => state.animation = state.animation.nudge(param, steps),
        Control::AddStop => state.ramp = state.ramp.add(NEW_STOP_COLOR, NEW_STOP_INTENSITY),
        Control::RemoveStop(id) => state.ramp = state.ramp.remove(id),
        Control::SetStopColor(id, color) => state.ramp = state.ramp.set_color(id, color),
        Control::SetStopIntensity(id, value) => state.ramp = state.ramp.set_intensity(id, value),
        Control::MoveStopUp(index) => state.ramp = state.ramp.move_up(index),
        Control::MoveStopDown(index) => state.ramp = state.ramp.move_down(index),
        Control::RandomizeColors => state.ramp = state.ramp.randomize_free(rng),
        Control::RunExport => return ControlOutcome::Export(ExportRequest::Burst),
        Control::StartExportVideo => return ControlOutcome::Export(ExportRequest::Sequence),
        Control::CancelExport => return ControlOutcome::Export(ExportRequest::Cancel),
    }
    if *state == before {
        debug!(?control, "control left scene unchanged");
        ControlOutcome::Unchanged
    } else {
        ControlOutcome::Updated
    }
}
