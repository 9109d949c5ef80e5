use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::SceneError;
use crate::state::SceneState;
use crate::uniforms::{project, FrameInputs, MaterialRole, SceneBindings, SceneTuning};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Pushes the shared scene state into every material once per rendered frame.
///
/// A frame is written to all three bindings or to none of them; partially
/// attached scenes are skipped and counted.
#[derive(Debug)]
pub struct UniformSynchronizer {
    tuning: SceneTuning,
    frames_written: u64,
    frames_skipped: u64,
    last_report: Option<Instant>,
}

impl UniformSynchronizer {
    pub fn new(tuning: SceneTuning) -> Self {
        Self {
            tuning,
            frames_written: 0,
            frames_skipped: 0,
            last_report: None,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// `time` is the final scene time; any offset must already be applied.
    pub fn synchronize<S>(&mut self, scene: &mut S, time: f32, state: &SceneState) -> Result<(), SceneError>
    where
        S: SceneBindings + ?Sized,
    {
        if let Some(missing) = MaterialRole::ALL.into_iter().find(|role| !scene.attached(*role)) {
            self.frames_skipped += 1;
            self.report();
            return Err(SceneError::BindingNotReady(missing));
        }

        let (width, height) = scene.viewport_size();
        let inputs = FrameInputs {
            time,
            resolution: [width as f32, height as f32],
            camera_position: scene.camera_position(),
        };
        let shared = project(&inputs, &state.animation, &state.ramp, &self.tuning);

        for role in MaterialRole::ALL {
            let set = role.specialise(&shared, &self.tuning);
            match scene.binding_mut(role) {
                Some(binding) => binding.write_uniforms(&set),
                None => return Err(SceneError::BindingNotReady(role)),
            }
        }
        self.frames_written += 1;
        self.report();
        Ok(())
    }

    fn report(&mut self) {
        let now = Instant::now();
        let due = self
            .last_report
            .map_or(true, |last| now.duration_since(last) >= REPORT_INTERVAL);
        if due {
            self.last_report = Some(now);
            debug!(
                written = self.frames_written,
                skipped = self.frames_skipped,
                "uniform synchronizer stats"
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::animation::{AnimationState, Param};
    use crate::ramp::{ColorRamp, Rgb};
    use crate::uniforms::{MaterialBinding, UniformSet};

    #[derive(Default)]
    pub(crate) struct RecordingBinding {
        pub role: Option<MaterialRole>,
        pub writes: Vec<UniformSet>,
        pub opacity: f32,
    }

    impl MaterialBinding for RecordingBinding {
        fn role(&self) -> MaterialRole {
            self.role.unwrap_or(MaterialRole::Background)
        }

        fn write_uniforms(&mut self, uniforms: &UniformSet) {
            self.opacity = uniforms.opacity;
            self.writes.push(*uniforms);
        }

        fn opacity(&self) -> Option<f32> {
            Some(self.opacity)
        }

        fn set_opacity(&mut self, opacity: f32) {
            self.opacity = opacity;
        }
    }

    #[derive(Default)]
    pub(crate) struct MockScene {
        pub slots: [Option<RecordingBinding>; 3],
    }

    impl MockScene {
        pub fn attached() -> Self {
            let mut scene = Self::default();
            for role in MaterialRole::ALL {
                scene.slots[role.index()] = Some(RecordingBinding {
                    role: Some(role),
                    opacity: 1.0,
                    ..RecordingBinding::default()
                });
            }
            scene
        }

        pub fn binding(&self, role: MaterialRole) -> &RecordingBinding {
            self.slots[role.index()].as_ref().unwrap()
        }
    }

    impl SceneBindings for MockScene {
        fn attached(&self, role: MaterialRole) -> bool {
            self.slots[role.index()].is_some()
        }

        fn binding_mut(&mut self, role: MaterialRole) -> Option<&mut dyn MaterialBinding> {
            self.slots[role.index()]
                .as_mut()
                .map(|binding| binding as &mut dyn MaterialBinding)
        }

        fn viewport_size(&self) -> (u32, u32) {
            (320, 180)
        }

        fn camera_position(&self) -> [f32; 3] {
            [0.0, 0.0, -2.0]
        }
    }

    fn state() -> SceneState {
        let ramp = ColorRamp::new([(Rgb::BLACK, 2.0), (Rgb::WHITE, 1.0)]).unwrap();
        SceneState::new(AnimationState::default().with(Param::Opacity, 0.4), ramp)
    }

    #[test]
    fn writes_all_bindings_when_attached() {
        let mut scene = MockScene::attached();
        let mut sync = UniformSynchronizer::new(SceneTuning::default());
        sync.synchronize(&mut scene, 5.0, &state()).unwrap();
        for role in MaterialRole::ALL {
            let binding = scene.binding(role);
            assert_eq!(binding.writes.len(), 1);
            assert_eq!(binding.writes[0].resolution, [320.0, 180.0]);
            assert_eq!(binding.opacity, 0.4);
        }
        assert_eq!(sync.frames_written(), 1);
    }

    #[test]
    fn writes_nothing_unless_all_attached() {
        for missing in MaterialRole::ALL {
            let mut scene = MockScene::attached();
            scene.slots[missing.index()] = None;
            let mut sync = UniformSynchronizer::new(SceneTuning::default());
            let err = sync.synchronize(&mut scene, 5.0, &state()).unwrap_err();
            assert!(matches!(err, SceneError::BindingNotReady(role) if role == missing));
            for slot in scene.slots.iter().flatten() {
                assert!(slot.writes.is_empty());
            }
            assert_eq!(sync.frames_skipped(), 1);
            assert_eq!(sync.frames_written(), 0);
        }
    }
}
