mod analyzer;
mod cli;
mod config;
mod detect;
mod error;
mod import;
mod llm;
mod model;
mod observer;
mod parser;
mod samples;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing - only show warnings by default, use RUST_LOG=info for more detail
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            cli::commands::init::run(force).await?;
        }
        Commands::Import {
            paths,
            hybrid,
            no_ai,
            json,
            out,
        } => {
            cli::commands::import::run(paths, hybrid, no_ai, json, out).await?;
        }
        Commands::Detect { path } => {
            cli::commands::detect::run(path)?;
        }
        Commands::Analyze { path, json } => {
            cli::commands::analyze::run(path, json)?;
        }
        Commands::Sample { format } => {
            cli::commands::sample::run(format)?;
        }
        Commands::Doctor => {
            cli::commands::doctor::run().await?;
        }
    }

    Ok(())
}
