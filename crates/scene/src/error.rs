use std::fmt;
use std::path::PathBuf;

use crate::animation::Param;
use crate::ramp::StopId;
use crate::uniforms::MaterialRole;

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("material binding '{0}' is not attached")]
    BindingNotReady(MaterialRole),
    #[error("ramp boundary violation: {0}")]
    RampBoundaryViolation(RampBoundary),
    #[error("{param} value {value} is outside [{min}, {max}]")]
    ParameterOutOfRange {
        param: Param,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("invalid color ramp: {0}")]
    InvalidRamp(String),
    #[error(transparent)]
    Config(#[from] sceneconfig::ConfigError),
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a ramp edit was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampBoundary {
    Full,
    LastStop,
    UnknownStop(StopId),
}

impl fmt::Display for RampBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RampBoundary::Full => f.write_str("ramp already holds the maximum number of stops"),
            RampBoundary::LastStop => f.write_str("the last remaining stop cannot be removed"),
            RampBoundary::UnknownStop(id) => write!(f, "no stop with id {id}"),
        }
    }
}
