//! Keyboard editing for the preview window.
//!
//! | key            | action                                     |
//! |----------------|--------------------------------------------|
//! | `[` / `]`      | select previous / next animation parameter |
//! | Up / Down      | nudge the selected parameter by one step   |
//! | Tab            | select the next ramp stop                  |
//! | `a` / `x`      | add a stop / remove the selected stop      |
//! | `c`            | give the selected stop a random hue        |
//! | `i` / `k`      | raise / lower the selected stop intensity  |
//! | PageUp / Down  | move the selected stop within the ramp     |
//! | `r`            | randomize the free stops                   |
//! | `e` / `v`      | start a still burst / an image sequence    |
//! | Escape         | cancel the running export                  |
//!
//! Ramp keys that would cross a size boundary (adding to a full ramp,
//! removing the last stop, moving past either end) are disabled.

use rand::Rng;
use scene::{Control, Param, Rgb, SceneState};
use winit::keyboard::{Key, NamedKey};

const INTENSITY_STEP: f32 = 0.1;

/// Maps key presses to scene controls, tracking which parameter and stop are selected.
#[derive(Debug, Default, Clone)]
pub(crate) struct KeyBindings {
    param: usize,
    stop: usize,
}

impl KeyBindings {
    pub fn selected_param(&self) -> Param {
        Param::ALL[self.param % Param::ALL.len()]
    }

    pub fn control_for<R: Rng + ?Sized>(
        &mut self,
        key: &Key,
        state: &SceneState,
        rng: &mut R,
    ) -> Option<Control> {
        self.stop = self.stop.min(state.ramp.len().saturating_sub(1));
        let selected_stop = state.ramp.stops().get(self.stop).map(|stop| (stop.id, stop.intensity));
        let available = state.ramp.availability();

        match key {
            Key::Named(NamedKey::ArrowUp) => Some(Control::NudgeParam(self.selected_param(), 1.0)),
            Key::Named(NamedKey::ArrowDown) => Some(Control::NudgeParam(self.selected_param(), -1.0)),
            Key::Named(NamedKey::Tab) => {
                self.stop = (self.stop + 1) % state.ramp.len().max(1);
                tracing::info!(stop = self.stop, "selected ramp stop");
                None
            }
            Key::Named(NamedKey::PageUp) => {
                enabled(available.can_move_up(self.stop), "move stop up").then_some(Control::MoveStopUp(self.stop))
            }
            Key::Named(NamedKey::PageDown) => {
                enabled(available.can_move_down(self.stop), "move stop down")
                    .then_some(Control::MoveStopDown(self.stop))
            }
            Key::Named(NamedKey::Escape) => Some(Control::CancelExport),
            Key::Character(text) => match text.as_str() {
                "[" => {
                    self.param = (self.param + Param::ALL.len() - 1) % Param::ALL.len();
                    tracing::info!(param = self.selected_param().name(), "selected parameter");
                    None
                }
                "]" => {
                    self.param = (self.param + 1) % Param::ALL.len();
                    tracing::info!(param = self.selected_param().name(), "selected parameter");
                    None
                }
                "a" => enabled(available.can_add, "add stop").then_some(Control::AddStop),
                "x" => selected_stop
                    .filter(|_| enabled(available.can_remove, "remove stop"))
                    .map(|(id, _)| Control::RemoveStop(id)),
                "c" => selected_stop.map(|(id, _)| Control::SetStopColor(id, Rgb::random_hue(rng))),
                "i" => selected_stop.map(|(id, value)| Control::SetStopIntensity(id, value + INTENSITY_STEP)),
                "k" => selected_stop.map(|(id, value)| Control::SetStopIntensity(id, value - INTENSITY_STEP)),
                "r" => Some(Control::RandomizeColors),
                "e" => Some(Control::RunExport),
                "v" => Some(Control::StartExportVideo),
                _ => None,
            },
            _ => None,
        }
    }
}

fn enabled(allowed: bool, control: &str) -> bool {
    if !allowed {
        tracing::debug!(control, "ramp control disabled at this size");
    }
    allowed
}
