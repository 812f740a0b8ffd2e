//! Cadence CLI entry point.

use anyhow::Context;
use clap::Parser;

use cadence::cli::{handle_error, Cli, Commands};
use cadence::domain::models::CadenceConfig;
use cadence::infrastructure::{config::ConfigLoader, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.output),
    };

    // Guard must outlive main so buffered file logs are flushed on exit.
    let _log_guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(err) => handle_error(err, cli.output),
    };

    let result = match cli.command {
        Commands::Init(args) => cadence::cli::commands::init::execute(args, cli.output).await,
        Commands::Plan(args) => {
            cadence::cli::commands::plan::execute(args, &config, cli.output).await
        }
        Commands::Run(args) => cadence::cli::commands::run::execute(args, &config, cli.output).await,
        Commands::Ledger(args) => {
            cadence::cli::commands::ledger::execute(args, &config, cli.output).await
        }
        Commands::History(args) => {
            cadence::cli::commands::history::execute(args, &config, cli.output).await
        }
    };

    if let Err(err) = result {
        handle_error(err, cli.output);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<CadenceConfig> {
    match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => ConfigLoader::load().context("Failed to load configuration"),
    }
}
