//! Hoard - content-addressed storage for large project data
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use hoard::cli::commands::{self, Workspace};
use hoard::cli::{Cli, Commands};
use hoard::config::ConfigManager;
use hoard::error::{HoardError, HoardResult};
use hoard::ui::UiContext;
use std::process::ExitCode;
use tracing::debug;
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

async fn run() -> HoardResult<()> {
    let cli = Cli::parse();

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("hoard=warn"),
        1 => EnvFilter::new("hoard=info"),
        _ => EnvFilter::new("hoard=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let ctx = UiContext::detect();

    // Init creates the project the other commands discover
    if let Commands::Init(args) = cli.command {
        return commands::init(args, &ctx).await;
    }

    let manager = match cli.config {
        Some(path) => {
            let root = std::env::current_dir()
                .map_err(|e| HoardError::io("reading current directory", e))?;
            ConfigManager::with_path(path, root)
        }
        None => ConfigManager::new()?,
    };
    debug!(
        "Project root {} (config {})",
        manager.project_root().display(),
        manager.path().display()
    );

    if let Commands::Config(args) = cli.command {
        return commands::config(args, &manager, &ctx).await;
    }

    let ws = Workspace::open(manager).await?;

    match cli.command {
        Commands::Init(_) | Commands::Config(_) => unreachable!("handled above"),
        Commands::Save(args) => commands::save(args, &ws, &ctx).await,
        Commands::Checkout(args) => commands::checkout(args, &ws, &ctx).await,
        Commands::Push(args) => commands::push(args, &ws, &ctx).await,
        Commands::Pull(args) => commands::pull(args, &ws, &ctx).await,
        Commands::Status(args) => commands::status(args, &ws, &ctx).await,
        Commands::Gc(args) => commands::gc(args, &ws, &ctx).await,
        Commands::Unprotect(args) => commands::unprotect(args, &ws, &ctx).await,
    }
}
