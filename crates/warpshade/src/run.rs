use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use renderer::{ExportMode, RendererConfig};
use sceneconfig::SceneConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::{ExportAction, RunArgs};
use crate::paths::AppPaths;

const DEFAULT_VIEWPORT: (u32, u32) = (1280, 720);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// No file at the default location; built-in defaults apply.
    Defaults(PathBuf),
}

impl ConfigOrigin {
    pub fn describe(&self) -> String {
        match self {
            ConfigOrigin::File(path) => path.display().to_string(),
            ConfigOrigin::Defaults(path) => format!("built-in defaults ({} not found)", path.display()),
        }
    }
}

/// Loads and validates the configuration. An explicit `--config` path must
/// exist; the default location may be absent.
pub fn load_config(args: &RunArgs, paths: &AppPaths) -> Result<(SceneConfig, ConfigOrigin)> {
    let (path, required) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (paths.config_file(), false),
    };
    if !required && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok((SceneConfig::default(), ConfigOrigin::Defaults(path)));
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let config = SceneConfig::from_toml_str(&raw)
        .with_context(|| format!("invalid config at {}", path.display()))?;
    Ok((config, ConfigOrigin::File(path)))
}

/// Command line beats the config file, which beats the platform picture directory.
pub fn resolve_export_dir(args: &RunArgs, config: &SceneConfig, paths: &AppPaths) -> PathBuf {
    args.output
        .clone()
        .or_else(|| config.export.output_dir.clone())
        .unwrap_or_else(|| paths.default_export_dir().to_path_buf())
}

pub fn build_renderer_config(args: &RunArgs, paths: &AppPaths) -> Result<RendererConfig> {
    let (scene, origin) = load_config(args, paths)?;
    let export_dir = resolve_export_dir(args, &scene, paths);
    let seed = args
        .seed
        .or(scene.export.seed)
        .unwrap_or_else(rand::random);
    let size = args.size.unwrap_or(DEFAULT_VIEWPORT);
    tracing::debug!(
        config = %origin.describe(),
        export_dir = %export_dir.display(),
        seed,
        width = size.0,
        height = size.1,
        "resolved warpshade settings"
    );
    Ok(RendererConfig::new(scene, size, export_dir, seed))
}

pub fn run_preview(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config = build_renderer_config(&args, &paths)?;
    renderer::run_preview(config)
}

pub fn run_export(args: RunArgs, action: ExportAction) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config = build_renderer_config(&args, &paths)?;
    let mode = match action {
        ExportAction::Burst => ExportMode::Burst,
        ExportAction::Sequence => ExportMode::Sequence,
    };
    let summary = renderer::run_headless_export(config, mode)?;
    println!("Wrote {} file(s) using {}:", summary.files.len(), summary.adapter);
    for file in &summary.files {
        println!("  {}", file.display());
    }
    Ok(())
}

pub fn config_check(args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let (config, origin) = load_config(args, &paths)?;
    println!("Configuration OK: {}", origin.describe());
    println!(
        "  ramp stops: {}  burst: {} stills at {}x  sequence: {} frames at {}x",
        config.ramp.stops.len(),
        config.export.burst.count,
        config.export.burst.scale,
        config.export.sequence.frame_count(),
        config.export.sequence.scale,
    );
    Ok(())
}

pub fn config_print(args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let (config, _) = load_config(args, &paths)?;
    let rendered = config
        .to_toml_string()
        .context("failed to serialise configuration")?;
    print!("{rendered}");
    Ok(())
}

pub fn config_where(args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config_path = args.config.clone().unwrap_or_else(|| paths.config_file());
    let export_dir = match load_config(args, &paths) {
        Ok((config, _)) => resolve_export_dir(args, &config, &paths),
        Err(_) => resolve_export_dir(args, &SceneConfig::default(), &paths),
    };
    println!("Configuration:");
    println!("  config dir:  {}", paths.config_dir().display());
    println!("  config file: {}", describe_path(&config_path));
    println!("  export dir:  {}", export_dir.display());
    Ok(())
}

fn describe_path(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (missing)", path.display())
    }
}
