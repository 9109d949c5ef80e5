use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "warpshade",
    author,
    version,
    about = "Procedural warp scene with still and image-sequence export"
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scene configuration file; defaults to `warpshade.toml` in the config directory.
    #[arg(long, global = true, value_name = "FILE", env = "WARPSHADE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Live viewport size (e.g. `1280x720`); captures scale from this.
    #[arg(long, global = true, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Directory exported stills and frames are written to.
    #[arg(long, global = true, value_name = "DIR", env = "WARPSHADE_EXPORT_DIR")]
    pub output: Option<PathBuf>,

    /// Seed for the initial colors and export randomisation.
    #[arg(long, global = true, value_name = "SEED")]
    pub seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect the scene configuration.
    Config(ConfigCommand),
    /// Run an export without opening the preview window.
    Export(ExportCommand),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report what it resolves to.
    Check,
    /// Print the effective configuration as TOML.
    Print,
    /// Print the resolved config file and export directory.
    Where,
}

#[derive(Parser, Debug)]
pub struct ExportCommand {
    #[command(subcommand)]
    pub mode: ExportAction,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportAction {
    /// Randomized JPEG stills at the burst interval.
    Burst,
    /// A numbered PNG image sequence.
    Sequence,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WxH format, e.g. 1920x1080".to_string())?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in size '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in size '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err("viewport dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}
