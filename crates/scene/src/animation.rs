use std::fmt;

use sceneconfig::AnimationConfig;

use crate::error::SceneError;

/// User-adjustable scalar driving the material programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    DisplacementX,
    DisplacementY,
    DeformAmplitude,
    NoiseScale,
    Opacity,
    CartoonLevels,
    Roughness,
    Reflectivity,
    Brightness,
    LiquidIntensity,
    LiquidLevel,
    LiquidYBias,
    LiquidSeed,
}

impl Param {
    pub const ALL: [Param; 13] = [
        Param::DisplacementX,
        Param::DisplacementY,
        Param::DeformAmplitude,
        Param::NoiseScale,
        Param::Opacity,
        Param::CartoonLevels,
        Param::Roughness,
        Param::Reflectivity,
        Param::Brightness,
        Param::LiquidIntensity,
        Param::LiquidLevel,
        Param::LiquidYBias,
        Param::LiquidSeed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Param::DisplacementX => "displacement_x",
            Param::DisplacementY => "displacement_y",
            Param::DeformAmplitude => "deform_amplitude",
            Param::NoiseScale => "noise_scale",
            Param::Opacity => "opacity",
            Param::CartoonLevels => "cartoon_levels",
            Param::Roughness => "roughness",
            Param::Reflectivity => "reflectivity",
            Param::Brightness => "brightness",
            Param::LiquidIntensity => "liquid_intensity",
            Param::LiquidLevel => "liquid_level",
            Param::LiquidYBias => "liquid_y_bias",
            Param::LiquidSeed => "liquid_seed",
        }
    }

    /// Inclusive editing range; `None` means any finite value.
    pub fn range(self) -> Option<(f32, f32)> {
        match self {
            Param::DisplacementX | Param::DisplacementY => Some((0.0, 1.0)),
            Param::DeformAmplitude => Some((0.0, 2.0)),
            Param::NoiseScale => Some((1.9, 2.0)),
            Param::Opacity => Some((0.0, 1.0)),
            Param::CartoonLevels => Some((50.0, 50.0)),
            Param::Roughness | Param::Reflectivity | Param::Brightness => Some((0.0, 1.0)),
            Param::LiquidIntensity => Some((0.0, 2.0)),
            Param::LiquidLevel => Some((-2.0, 2.0)),
            Param::LiquidYBias => Some((-10.0, 10.0)),
            Param::LiquidSeed => None,
        }
    }

    /// Increment used by stepping controls: a twentieth of the range.
    pub fn step(self) -> f32 {
        match self.range() {
            Some((min, max)) if max > min => (max - min) / 20.0,
            Some(_) => 0.0,
            None => 1.0,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationState {
    pub(crate) displacement_x: f32,
    pub(crate) displacement_y: f32,
    pub(crate) deform_amplitude: f32,
    pub(crate) noise_scale: f32,
    pub(crate) opacity: f32,
    pub(crate) cartoon_levels: f32,
    pub(crate) roughness: f32,
    pub(crate) reflectivity: f32,
    pub(crate) brightness: f32,
    pub(crate) liquid_intensity: f32,
    pub(crate) liquid_level: f32,
    pub(crate) liquid_y_bias: f32,
    pub(crate) liquid_seed: f32,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self {
            displacement_x: 1.0,
            displacement_y: 1.0,
            deform_amplitude: 1.0,
            noise_scale: 1.9,
            opacity: 1.0,
            cartoon_levels: 50.0,
            roughness: 1.0,
            reflectivity: 0.0,
            brightness: 0.0,
            liquid_intensity: 2.0,
            liquid_level: 2.0,
            liquid_y_bias: 10.0,
            liquid_seed: 0.0,
        }
    }
}

impl AnimationState {
    /// Loads configured values, rejecting anything outside the declared ranges.
    pub fn from_config(config: &AnimationConfig) -> Result<Self, SceneError> {
        let values = [
            (Param::DisplacementX, config.displacement_x),
            (Param::DisplacementY, config.displacement_y),
            (Param::DeformAmplitude, config.deform_amplitude),
            (Param::NoiseScale, config.noise_scale),
            (Param::Opacity, config.opacity),
            (Param::CartoonLevels, config.cartoon_levels),
            (Param::Roughness, config.roughness),
            (Param::Reflectivity, config.reflectivity),
            (Param::Brightness, config.brightness),
            (Param::LiquidIntensity, config.liquid_intensity),
            (Param::LiquidLevel, config.liquid_level),
            (Param::LiquidYBias, config.liquid_y_bias),
            (Param::LiquidSeed, config.liquid_seed),
        ];
        let mut state = Self::default();
        for (param, value) in values {
            validate(param, value)?;
            *state.slot(param) = value;
        }
        Ok(state)
    }

    pub fn get(&self, param: Param) -> f32 {
        match param {
            Param::DisplacementX => self.displacement_x,
            Param::DisplacementY => self.displacement_y,
            Param::DeformAmplitude => self.deform_amplitude,
            Param::NoiseScale => self.noise_scale,
            Param::Opacity => self.opacity,
            Param::CartoonLevels => self.cartoon_levels,
            Param::Roughness => self.roughness,
            Param::Reflectivity => self.reflectivity,
            Param::Brightness => self.brightness,
            Param::LiquidIntensity => self.liquid_intensity,
            Param::LiquidLevel => self.liquid_level,
            Param::LiquidYBias => self.liquid_y_bias,
            Param::LiquidSeed => self.liquid_seed,
        }
    }

    /// Returns a copy with `param` set, clamped into its range. Non-finite
    /// input leaves the state unchanged.
    #[must_use]
    pub fn with(&self, param: Param, value: f32) -> Self {
        let mut next = *self;
        if !value.is_finite() {
            return next;
        }
        let value = match param.range() {
            Some((min, max)) => value.clamp(min, max),
            None => value,
        };
        *next.slot(param) = value;
        next
    }

    #[must_use]
    pub fn nudge(&self, param: Param, steps: f32) -> Self {
        self.with(param, self.get(param) + param.step() * steps)
    }

    fn slot(&mut self, param: Param) -> &mut f32 {
        match param {
            Param::DisplacementX => &mut self.displacement_x,
            Param::DisplacementY => &mut self.displacement_y,
            Param::DeformAmplitude => &mut self.deform_amplitude,
            Param::NoiseScale => &mut self.noise_scale,
            Param::Opacity => &mut self.opacity,
            Param::CartoonLevels => &mut self.cartoon_levels,
            Param::Roughness => &mut self.roughness,
            Param::Reflectivity => &mut self.reflectivity,
            Param::Brightness => &mut self.brightness,
            Param::LiquidIntensity => &mut self.liquid_intensity,
            Param::LiquidLevel => &mut self.liquid_level,
            Param::LiquidYBias => &mut self.liquid_y_bias,
            Param::LiquidSeed => &mut self.liquid_seed,
        }
    }
}

fn validate(param: Param, value: f32) -> Result<(), SceneError> {
    let (min, max) = param.range().unwrap_or((f32::MIN, f32::MAX));
    if !value.is_finite() || value < min || value > max {
        return Err(SceneError::ParameterOutOfRange {
            param,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_sit_inside_ranges() {
        let state = AnimationState::default();
        for param in Param::ALL {
            validate(param, state.get(param)).unwrap();
        }
    }

    #[test]
    fn default_config_matches_default_state() {
        let state = AnimationState::from_config(&AnimationConfig::default()).unwrap();
        assert_eq!(state, AnimationState::default());
    }

    #[test]
    fn setters_clamp_to_range() {
        let state = AnimationState::default()
            .with(Param::NoiseScale, 5.0)
            .with(Param::LiquidLevel, -9.0)
            .with(Param::CartoonLevels, 3.0)
            .with(Param::LiquidSeed, 1234.5);
        assert_eq!(state.get(Param::NoiseScale), 2.0);
        assert_eq!(state.get(Param::LiquidLevel), -2.0);
        assert_eq!(state.get(Param::CartoonLevels), 50.0);
        assert_eq!(state.get(Param::LiquidSeed), 1234.5);
        assert_eq!(state.with(Param::Opacity, f32::NAN), state);
    }

    #[test]
    fn nudge_moves_by_step() {
        let state = AnimationState::default().with(Param::Brightness, 0.5);
        let raised = state.nudge(Param::Brightness, 1.0);
        assert!((raised.get(Param::Brightness) - 0.55).abs() < 1e-6);
        let lowered = state.nudge(Param::Brightness, -100.0);
        assert_eq!(lowered.get(Param::Brightness), 0.0);
    }

    #[test]
    fn config_out_of_range_is_rejected() {
        let config = AnimationConfig {
            opacity: 1.5,
            ..AnimationConfig::default()
        };
        let err = AnimationState::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            SceneError::ParameterOutOfRange {
                param: Param::Opacity,
                ..
            }
        ));
    }
}
