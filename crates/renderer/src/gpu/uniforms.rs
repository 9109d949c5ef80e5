use bytemuck::{Pod, Zeroable};
use scene::{EnvironmentMap, MaterialRole, UniformSet, MAX_COLORS};

/// std140 image of the `MaterialParams` block in the material shader.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct MaterialUniforms {
    /// resolution.xy, time, opacity
    pub frame: [f32; 4],
    /// displacement.xy, deform amplitude, noise scale
    pub warp: [f32; 4],
    /// cartoon levels, brightness, roughness, reflectivity
    pub surface: [f32; 4],
    /// liquid intensity, level, seed, y bias
    pub liquid: [f32; 4],
    /// camera position, w = 1 when the material tracks the camera
    pub camera: [f32; 4],
    /// light direction, w = intensity
    pub light: [f32; 4],
    /// color count, lighting enabled, environment enabled, silhouette
    pub flags: [i32; 4],
    /// ramp color in rgb, stop intensity in w
    pub colors: [[f32; 4]; MAX_COLORS],
}

unsafe impl Zeroable for MaterialUniforms {}
unsafe impl Pod for MaterialUniforms {}

impl MaterialUniforms {
    /// Blank parameters for a freshly attached material: transparent until
    /// the first synchronisation lands.
    pub fn new(role: MaterialRole) -> Self {
        let mut uniforms = Self::zeroed();
        uniforms.frame = [1.0, 1.0, 0.0, 0.0];
        uniforms.flags[3] = silhouette(role);
        uniforms
    }

    pub fn from_set(set: &UniformSet, role: MaterialRole) -> Self {
        let mut colors = [[0.0; 4]; MAX_COLORS];
        for (slot, (rgb, intensity)) in colors
            .iter_mut()
            .zip(set.colors.iter().zip(set.color_intensities.iter()))
        {
            *slot = [rgb[0], rgb[1], rgb[2], *intensity];
        }

        let (light, lighting) = match set.lighting {
            Some(light) => (
                [light.direction[0], light.direction[1], light.direction[2], light.intensity],
                1,
            ),
            None => ([0.0, 0.0, 1.0, 0.0], 0),
        };
        let camera = match set.camera_position {
            Some([x, y, z]) => [x, y, z, 1.0],
            None => [0.0; 4],
        };
        let environment = match set.environment {
            EnvironmentMap::Scene => 1,
            EnvironmentMap::None => 0,
        };

        Self {
            frame: [
                set.resolution[0].max(1.0),
                set.resolution[1].max(1.0),
                set.time,
                set.opacity,
            ],
            warp: [
                set.displacement[0],
                set.displacement[1],
                set.deform_amplitude,
                set.noise_scale,
            ],
            surface: [
                set.cartoon_levels.max(1.0),
                set.brightness,
                set.roughness,
                set.reflectivity,
            ],
            liquid: [
                set.liquid_intensity,
                set.liquid_level,
                set.liquid_seed,
                set.liquid_y_bias,
            ],
            camera,
            light,
            flags: [
                set.color_count.min(MAX_COLORS as u32) as i32,
                lighting,
                environment,
                silhouette(role),
            ],
            colors,
        }
    }

    pub fn opacity(&self) -> f32 {
        self.frame[3]
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.frame[3] = opacity;
    }
}

/// Background fills its whole viewport; the models are drawn as spheres.
fn silhouette(role: MaterialRole) -> i32 {
    match role {
        MaterialRole::Background => 0,
        MaterialRole::ModelA | MaterialRole::ModelB => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene::uniforms::{project, FrameInputs};
    use scene::{AnimationState, ColorRamp, Rgb, SceneTuning};

    fn shared() -> UniformSet {
        let ramp = ColorRamp::new([(Rgb::BLACK, 2.0), (Rgb::new(255, 0, 0), 1.5)]).unwrap();
        let inputs = FrameInputs {
            time: 301.5,
            resolution: [1280.0, 720.0],
            camera_position: [0.0, 0.0, -2.0],
        };
        project(&inputs, &AnimationState::default(), &ramp, &SceneTuning::default())
    }

    #[test]
    fn layout_matches_std140_block() {
        assert_eq!(std::mem::size_of::<MaterialUniforms>(), 16 * (7 + MAX_COLORS));
        assert_eq!(std::mem::align_of::<MaterialUniforms>(), 16);
        assert_eq!(std::mem::offset_of!(MaterialUniforms, flags), 96);
        assert_eq!(std::mem::offset_of!(MaterialUniforms, colors), 112);
    }

    #[test]
    fn packs_ramp_and_frame_values() {
        let set = shared();
        let uniforms = MaterialUniforms::from_set(&set, MaterialRole::ModelA);
        assert_eq!(uniforms.frame, [1280.0, 720.0, 301.5, set.opacity]);
        assert_eq!(uniforms.colors[0], [0.0, 0.0, 0.0, 2.0]);
        assert_eq!(uniforms.colors[1], [1.0, 0.0, 0.0, 1.5]);
        assert_eq!(uniforms.colors[2], [0.0; 4]);
        assert_eq!(uniforms.flags[0], 2);
        assert_eq!(uniforms.flags[3], 1);
    }

    #[test]
    fn missing_lighting_and_camera_clear_their_flags() {
        let set = MaterialRole::Background.specialise(&shared(), &SceneTuning::default());
        let uniforms = MaterialUniforms::from_set(&set, MaterialRole::Background);
        assert_eq!(uniforms.flags[1], 0);
        assert_eq!(uniforms.flags[2], 0);
        assert_eq!(uniforms.flags[3], 0);
        assert_eq!(uniforms.camera[3], 0.0);
    }

    #[test]
    fn environment_flag_follows_role() {
        let tuning = SceneTuning::default();
        let a = MaterialRole::ModelA.specialise(&shared(), &tuning);
        assert_eq!(MaterialUniforms::from_set(&a, MaterialRole::ModelA).flags[2], 1);
    }

    #[test]
    fn opacity_round_trips() {
        let mut uniforms = MaterialUniforms::new(MaterialRole::ModelB);
        assert_eq!(uniforms.opacity(), 0.0);
        uniforms.set_opacity(1.0);
        assert_eq!(uniforms.opacity(), 1.0);
    }
}
