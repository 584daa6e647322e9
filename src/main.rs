// ABOUTME: Entry point for the verdigris CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use tracing_subscriber::EnvFilter;
use verdigris::config;
use verdigris::error::Result;
use verdigris::output::{Output, OutputMode};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the verbose flag picks the level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    if let Err(e) = run(cli.command, Output::new(mode)).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(command: Commands, output: Output) -> Result<()> {
    let cwd = env::current_dir()?;
    match command {
        Commands::Init {
            group,
            repository,
            force,
        } => {
            config::init_config(&cwd, group.as_deref(), repository.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Validate => {
            let config = config::Config::discover(&cwd)?;
            commands::validate(&config, &output)
        }
        Commands::Simulate(args) => {
            let config = config::Config::discover(&cwd)?;
            commands::simulate(config, args, output).await
        }
        Commands::History { record_file } => commands::history(&cwd.join(record_file), &output),
    }
}
