mod cli_logger;

use anyhow::Result;
use clap::Parser;
use procstats::{Config, Reporter, StatsCommand, StatsOutput, stats_command};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;

use cli_logger::CliLogger;

#[derive(Debug, Parser)]
#[command(name = "procstats", version, about = "Process memory statistics viewer")]
struct Cli {
    /// Config file (missing file means defaults)
    #[arg(long, global = true, default_value = "procstats.toml")]
    config: PathBuf,
    /// Emit machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: StatsCommand,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli, logger: &CliLogger, config: &Config) -> Result<()> {
    match stats_command(config, &cli.command)? {
        StatsOutput::Report(report) => logger.print_report(&report),
        StatsOutput::Value(value) => logger.print_serialized(&value),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load_optional(&cli.config);
    let json = cli.json || config.reporter == Reporter::Json;
    let logger = CliLogger::new(json, cli.no_color);

    match run(&cli, &logger, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            logger.print_error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}
