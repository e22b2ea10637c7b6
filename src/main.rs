//! rbup - Ruby runtime provisioner for CI workers
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use rbup::cli::{Cli, Commands};
use rbup::config::ConfigManager;
use rbup::error::RbupResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> RbupResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("rbup=warn"),
        1 => EnvFilter::new("rbup=info"),
        _ => EnvFilter::new("rbup=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        // Completions need no config
        Commands::Completions(args) => rbup::cli::commands::completions(args).await,
        command => {
            let config_manager = if let Some(ref path) = cli.config {
                ConfigManager::with_path(path.clone())
            } else {
                ConfigManager::new()
            };
            let config = config_manager.load().await?;

            match command {
                Commands::Completions(_) => unreachable!("Completions handled above"),
                Commands::Install(args) => rbup::cli::commands::install(args, &config).await,
                Commands::Versions(args) => rbup::cli::commands::versions(args, &config).await,
                Commands::Cache(args) => rbup::cli::commands::cache(args, &config).await,
            }
        }
    }
}
