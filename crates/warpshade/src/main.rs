mod cli;
mod paths;
mod run;

use anyhow::Result;
use cli::{Command, ConfigAction};

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Config(config_cmd)) => match config_cmd.action {
            ConfigAction::Check => run::config_check(&cli.run),
            ConfigAction::Print => run::config_print(&cli.run),
            ConfigAction::Where => run::config_where(&cli.run),
        },
        Some(Command::Export(export_cmd)) => run::run_export(cli.run, export_cmd.mode),
        None => run::run_preview(cli.run),
    }
}
