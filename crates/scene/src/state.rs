use rand::Rng;
use sceneconfig::SceneConfig;

use crate::animation::AnimationState;
use crate::error::SceneError;
use crate::ramp::ColorRamp;

/// Animation-time offset the scene starts from.
pub const INITIAL_TIME_OFFSET: f32 = 300.0;

/// Live user state shared by the preview and the exporters.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneState {
    pub animation: AnimationState,
    pub ramp: ColorRamp,
    /// Added to the clock before it reaches the materials.
    pub time_offset: f32,
}

impl SceneState {
    pub fn new(animation: AnimationState, ramp: ColorRamp) -> Self {
        Self {
            animation,
            ramp,
            time_offset: INITIAL_TIME_OFFSET,
        }
    }

    pub fn from_config<R: Rng + ?Sized>(config: &SceneConfig, rng: &mut R) -> Result<Self, SceneError> {
        let animation = AnimationState::from_config(&config.animation)?;
        let ramp = ColorRamp::from_config(&config.ramp, rng)?;
        Ok(Self::new(animation, ramp))
    }

    /// Scene time for a raw clock reading.
    pub fn scene_time(&self, clock_seconds: f32) -> f32 {
        clock_seconds + self.time_offset
    }

    /// Moves the animation forward by a random amount in `[0, max_jump)`.
    pub fn jump_time<R: Rng + ?Sized>(&mut self, rng: &mut R, max_jump: f32) -> f32 {
        let jump = if max_jump > 0.0 {
            rng.gen_range(0.0..max_jump).floor()
        } else {
            0.0
        };
        self.time_offset += jump;
        jump
    }
}
