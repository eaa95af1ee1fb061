use clap::{ArgAction, Parser};
use color_eyre::eyre::eyre;
use std::path::PathBuf;
use syncarr_config::{Config, PathManager};

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "syncarr")]
#[command(about = "Syncarr - Mirror labeled media, files and metadata from one Plex server to another")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,

    /// Output format
    #[arg(long, default_value = "human", value_enum)]
    output: output::OutputFormat,

    /// Run a single sync cycle and exit
    #[arg(long, action = ArgAction::SetTrue)]
    oneshot: bool,

    /// Force a full sync (same as FORCE_FULL_SYNC=true)
    #[arg(long, action = ArgAction::SetTrue)]
    force_full_sync: bool,

    /// Validate the configuration and exit
    #[arg(long, action = ArgAction::SetTrue)]
    validate: bool,

    /// TOML file with fallback values for unset environment variables
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let paths = PathManager::default();
    let config_file = cli.config.clone().or_else(|| {
        let default = paths.config_file();
        default.exists().then_some(default)
    });
    let config = Config::load(config_file.as_deref()).map_err(|e| eyre!("{:#}", e))?;

    let log_file = config.log_file.as_deref().map(|file| paths.log_file(file));
    logging::init_logging(cli.verbose, cli.quiet, &config.log_level, log_file).map_err(|e| eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    if cli.validate {
        return commands::validate::run_validate(&config, &output);
    }

    config
        .validate()
        .map_err(|e| eyre!("Invalid configuration: {}", e))?;

    commands::run::run_sync(config, &paths, cli.oneshot, cli.force_full_sync, &output).await
}
