use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Highest configuration schema version understood by this build.
pub const CONFIG_VERSION: u32 = 1;

/// Ramp capacity mirrored from the scene crate so configs can be checked early.
pub const MAX_RAMP_STOPS: usize = 5;

/// Upper bound for export pacing delays and sequence length.
pub const MAX_EXPORT_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SceneConfig {
    pub version: u32,
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub ramp: RampConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub materials: MaterialsConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            animation: AnimationConfig::default(),
            ramp: RampConfig::default(),
            camera: CameraConfig::default(),
            materials: MaterialsConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// Initial values for the user-adjustable animation parameters.
///
/// Range checks live with the animation state itself; this struct only carries
/// the raw numbers read from disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub displacement_x: f32,
    pub displacement_y: f32,
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
}

impl Default for AnimationConfig {
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
            liquid_seed: 0.0,
            liquid_y_bias: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RampConfig {
    pub stops: Vec<StopConfig>,
}

impl Default for RampConfig {
    fn default() -> Self {
        let anchor = StopConfig {
            color: ColorSpec::Rgb([0, 0, 0]),
            intensity: 2.0,
        };
        let free = StopConfig {
            color: ColorSpec::Random,
            intensity: 2.0,
        };
        Self {
            stops: vec![anchor.clone(), anchor, free.clone(), free.clone(), free],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StopConfig {
    pub color: ColorSpec,
    #[serde(default = "default_stop_intensity")]
    pub intensity: f32,
}

fn default_stop_intensity() -> f32 {
    1.0
}

/// Color entry in the ramp table: a `#rgb` / `#rrggbb` hex value or `"random"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColorSpec {
    Random,
    Rgb([u8; 3]),
}

impl FromStr for ColorSpec {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("random") {
            return Ok(ColorSpec::Random);
        }
        parse_hex_color(trimmed).map(ColorSpec::Rgb)
    }
}

impl TryFrom<String> for ColorSpec {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColorSpec> for String {
    fn from(value: ColorSpec) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ColorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpec::Random => f.write_str("random"),
            ColorSpec::Rgb([r, g, b]) => write!(f, "#{r:02x}{g:02x}{b:02x}"),
        }
    }
}

/// Parses `#rgb` or `#rrggbb` (leading `#` optional) into 8-bit channels.
pub fn parse_hex_color(raw: &str) -> Result<[u8; 3], ConfigError> {
    let digits = raw.strip_prefix('#').unwrap_or(raw);
    if !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(ConfigError::Invalid(format!(
            "color '{raw}' is not a hex value; expected #rgb, #rrggbb, or random"
        )));
    }
    let channel = |text: &str| {
        u8::from_str_radix(text, 16)
            .map_err(|err| ConfigError::Invalid(format!("color '{raw}' is invalid: {err}")))
    };
    match digits.len() {
        3 => {
            let mut out = [0u8; 3];
            for (slot, index) in out.iter_mut().zip(0..3) {
                let nibble = channel(&digits[index..index + 1])?;
                *slot = nibble * 17;
            }
            Ok(out)
        }
        6 => Ok([
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
        ]),
        _ => Err(ConfigError::Invalid(format!(
            "color '{raw}' must have 3 or 6 hex digits"
        ))),
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    /// Radians of orbit per dragged pixel in the preview window.
    pub orbit_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, -2.0],
            orbit_sensitivity: 0.005,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaterialsConfig {
    /// Seconds added to the animation time of the body (model B) surface.
    pub model_b_time_bias: f32,
    pub light_direction: [f32; 3],
    pub light_intensity: f32,
}

impl Default for MaterialsConfig {
    fn default() -> Self {
        Self {
            model_b_time_bias: 0.5,
            light_direction: [0.0, 10.0, 10.0],
            light_intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Destination directory; falls back to the platform picture directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Seed for the export randomiser; random per process when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub burst: BurstConfig,
    pub sequence: SequenceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BurstConfig {
    pub count: u32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub interval: Duration,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub settle_delay: Duration,
    pub scale: f32,
    /// Upper bound (exclusive) of the random animation-time jump between stills.
    pub time_jump_max: f32,
    pub jpeg_quality: u8,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            count: 100,
            interval: Duration::from_secs(10),
            settle_delay: Duration::from_secs(1),
            scale: 20.0,
            time_jump_max: 10_000.0,
            jpeg_quality: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// `base + frame_index / frame_rate`; reproducible regardless of capture latency.
    #[default]
    Virtual,
    /// Wall-clock time, matching what the live preview shows.
    Wall,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub frame_rate: u32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub duration: Duration,
    pub scale: f32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub cooldown: Duration,
    pub clock: ClockMode,
    /// Upper bound (exclusive) of the random base time drawn per run.
    pub base_time_max: f32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            duration: Duration::from_secs(5),
            scale: 10.0,
            cooldown: Duration::from_secs(5),
            clock: ClockMode::Virtual,
            base_time_max: 100.0,
        }
    }
}

impl SequenceConfig {
    pub fn frame_count(&self) -> u32 {
        (f64::from(self.frame_rate) * self.duration.as_secs_f64()).round() as u32
    }
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_duration_opt(deserializer)?
        .ok_or_else(|| de::Error::custom("expected a duration"))
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl SceneConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SceneConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        let stops = self.ramp.stops.len();
        if stops == 0 || stops > MAX_RAMP_STOPS {
            return Err(ConfigError::Invalid(format!(
                "ramp must define between 1 and {MAX_RAMP_STOPS} stops (found {stops})"
            )));
        }
        for (index, stop) in self.ramp.stops.iter().enumerate() {
            if !stop.intensity.is_finite() || stop.intensity < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "ramp stop {index} intensity must be a non-negative number"
                )));
            }
        }

        if self.camera.position.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::Invalid(
                "camera.position must contain finite values".into(),
            ));
        }

        if self.materials.light_direction.iter().all(|v| *v == 0.0) {
            return Err(ConfigError::Invalid(
                "materials.light_direction must not be the zero vector".into(),
            ));
        }

        let burst = &self.export.burst;
        if burst.count == 0 {
            return Err(ConfigError::Invalid(
                "export.burst.count must be greater than zero".into(),
            ));
        }
        if burst.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "export.burst.interval must be greater than zero".into(),
            ));
        }
        if burst.settle_delay >= burst.interval {
            return Err(ConfigError::Invalid(
                "export.burst.settle_delay must be shorter than export.burst.interval".into(),
            ));
        }
        validate_delay("export.burst.interval", burst.interval)?;
        validate_scale("export.burst.scale", burst.scale)?;
        if !burst.time_jump_max.is_finite() || burst.time_jump_max <= 0.0 {
            return Err(ConfigError::Invalid(
                "export.burst.time_jump_max must be positive".into(),
            ));
        }
        if !(1..=100).contains(&burst.jpeg_quality) {
            return Err(ConfigError::Invalid(
                "export.burst.jpeg_quality must be within 1-100".into(),
            ));
        }

        let sequence = &self.export.sequence;
        if sequence.frame_rate == 0 {
            return Err(ConfigError::Invalid(
                "export.sequence.frame_rate must be greater than zero".into(),
            ));
        }
        if sequence.frame_count() == 0 {
            return Err(ConfigError::Invalid(
                "export.sequence.duration must cover at least one frame".into(),
            ));
        }
        validate_delay("export.sequence.duration", sequence.duration)?;
        validate_delay("export.sequence.cooldown", sequence.cooldown)?;
        validate_scale("export.sequence.scale", sequence.scale)?;
        if !sequence.base_time_max.is_finite() || sequence.base_time_max < 0.0 {
            return Err(ConfigError::Invalid(
                "export.sequence.base_time_max must be non-negative".into(),
            ));
        }

        Ok(())
    }
}

fn validate_delay(name: &str, value: Duration) -> Result<(), ConfigError> {
    if value > MAX_EXPORT_DELAY {
        return Err(ConfigError::Invalid(format!(
            "{name} must not exceed {}",
            humantime::format_duration(MAX_EXPORT_DELAY)
        )));
    }
    Ok(())
}

fn validate_scale(name: &str, scale: f32) -> Result<(), ConfigError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(ConfigError::Invalid(format!("{name} must be positive")));
    }
    Ok(())
}
