use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::{ProjectDirs, UserDirs};

pub const ENV_CONFIG_DIR: &str = "WARPSHADE_CONFIG_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "Warpshade";
const APPLICATION: &str = "warpshade";
const CONFIG_FILE: &str = "warpshade.toml";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    default_export_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;

        let config_dir = env_override(ENV_CONFIG_DIR)
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());
        let default_export_dir = UserDirs::new()
            .and_then(|dirs| dirs.picture_dir().map(|dir| dir.join(APPLICATION)))
            .unwrap_or_else(|| project_dirs.data_dir().join("exports"));

        Ok(Self {
            config_dir,
            default_export_dir,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Used when neither the command line nor the config names a directory.
    pub fn default_export_dir(&self) -> &Path {
        &self.default_export_dir
    }
}

#[cfg(test)]
impl AppPaths {
    pub fn from_raw(config_dir: PathBuf, default_export_dir: PathBuf) -> Self {
        Self {
            config_dir,
            default_export_dir,
        }
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.as_os_str().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
