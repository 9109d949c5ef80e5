//! Projection of the shared scene state into per-material uniform sets.

use std::fmt;

use sceneconfig::MaterialsConfig;

use crate::animation::AnimationState;
use crate::ramp::{ColorRamp, MAX_STOPS};

/// Number of ramp slots every material program declares.
pub const MAX_COLORS: usize = MAX_STOPS;

/// The three shaded surfaces of the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialRole {
    /// Full-screen pattern behind everything else.
    Background,
    /// Lit mask surface; the only one sampling the environment.
    ModelA,
    /// Lit body surface with flat shading.
    ModelB,
}

impl MaterialRole {
    pub const ALL: [MaterialRole; 3] = [
        MaterialRole::Background,
        MaterialRole::ModelA,
        MaterialRole::ModelB,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MaterialRole::Background => "background",
            MaterialRole::ModelA => "model-a",
            MaterialRole::ModelB => "model-b",
        }
    }

    pub fn index(self) -> usize {
        match self {
            MaterialRole::Background => 0,
            MaterialRole::ModelA => 1,
            MaterialRole::ModelB => 2,
        }
    }

    /// Applies the per-role overrides on top of the shared projection.
    pub fn specialise(self, shared: &UniformSet, tuning: &SceneTuning) -> UniformSet {
        let mut set = *shared;
        match self {
            MaterialRole::Background => {
                set.noise_scale = shared.noise_scale * 2.0;
                set.reflectivity = 0.0;
                set.environment = EnvironmentMap::None;
                set.lighting = None;
                set.camera_position = None;
            }
            MaterialRole::ModelA => {
                set.noise_scale = shared.noise_scale * 1.5;
                set.environment = EnvironmentMap::Scene;
            }
            MaterialRole::ModelB => {
                set.reflectivity = 0.0;
                set.cartoon_levels = 1.0;
                set.roughness = 0.0;
                set.environment = EnvironmentMap::None;
                set.time = shared.time + tuning.model_b_time_bias;
            }
        }
        set
    }
}

impl fmt::Display for MaterialRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentMap {
    None,
    Scene,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lighting {
    /// Unit vector pointing towards the light.
    pub direction: [f32; 3],
    pub intensity: f32,
}

/// Scene-wide constants that feed the per-role overrides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneTuning {
    pub model_b_time_bias: f32,
    pub lighting: Lighting,
}

impl SceneTuning {
    pub fn from_config(config: &MaterialsConfig) -> Self {
        Self {
            model_b_time_bias: config.model_b_time_bias,
            lighting: Lighting {
                direction: normalise(config.light_direction),
                intensity: config.light_intensity,
            },
        }
    }
}

impl Default for SceneTuning {
    fn default() -> Self {
        Self::from_config(&MaterialsConfig::default())
    }
}

/// Per-frame values that do not come from user state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub time: f32,
    pub resolution: [f32; 2],
    pub camera_position: [f32; 3],
}

/// Everything one material program reads, before any GPU layout concerns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformSet {
    pub time: f32,
    pub resolution: [f32; 2],
    pub displacement: [f32; 2],
    pub deform_amplitude: f32,
    pub noise_scale: f32,
    pub opacity: f32,
    pub cartoon_levels: f32,
    pub roughness: f32,
    pub reflectivity: f32,
    pub brightness: f32,
    pub liquid_intensity: f32,
    pub liquid_level: f32,
    pub liquid_seed: f32,
    pub liquid_y_bias: f32,
    pub colors: [[f32; 3]; MAX_COLORS],
    pub color_intensities: [f32; MAX_COLORS],
    pub color_count: u32,
    pub lighting: Option<Lighting>,
    pub camera_position: Option<[f32; 3]>,
    pub environment: EnvironmentMap,
}

/// Shared projection of frame inputs and user state. Unused ramp slots are zeroed.
pub fn project(
    inputs: &FrameInputs,
    animation: &AnimationState,
    ramp: &ColorRamp,
    tuning: &SceneTuning,
) -> UniformSet {
    let mut colors = [[0.0; 3]; MAX_COLORS];
    let mut color_intensities = [0.0; MAX_COLORS];
    for (index, stop) in ramp.stops().iter().take(MAX_COLORS).enumerate() {
        colors[index] = stop.color.to_unit();
        color_intensities[index] = stop.intensity;
    }

    UniformSet {
        time: inputs.time,
        resolution: inputs.resolution,
        displacement: [animation.displacement_x, animation.displacement_y],
        deform_amplitude: animation.deform_amplitude,
        noise_scale: animation.noise_scale,
        opacity: animation.opacity,
        cartoon_levels: animation.cartoon_levels,
        roughness: animation.roughness,
        reflectivity: animation.reflectivity,
        brightness: animation.brightness,
        liquid_intensity: animation.liquid_intensity,
        liquid_level: animation.liquid_level,
        liquid_seed: animation.liquid_seed,
        liquid_y_bias: animation.liquid_y_bias,
        colors,
        color_intensities,
        color_count: ramp.len().min(MAX_COLORS) as u32,
        lighting: Some(tuning.lighting),
        camera_position: Some(inputs.camera_position),
        environment: EnvironmentMap::None,
    }
}

/// Live handle to one shaded surface.
pub trait MaterialBinding {
    fn role(&self) -> MaterialRole;
    fn write_uniforms(&mut self, uniforms: &UniformSet);
    /// Current opacity, for bindings that expose an opacity control.
    fn opacity(&self) -> Option<f32> {
        None
    }
    fn set_opacity(&mut self, _opacity: f32) {}
}

/// Scene collaborator: the attachable material bindings plus view state.
pub trait SceneBindings {
    fn attached(&self, role: MaterialRole) -> bool;
    fn binding_mut(&mut self, role: MaterialRole) -> Option<&mut dyn MaterialBinding>;
    /// Logical size of the live view in pixels.
    fn viewport_size(&self) -> (u32, u32);
    fn camera_position(&self) -> [f32; 3];
}

fn normalise(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > f32::EPSILON {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0, 1.0, 0.0]
    }
}
