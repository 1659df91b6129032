//! agentloop CLI — a non-interactive harness around the reasoning loop.
//!
//! Commands:
//! - `replay`  — Run scripted queries through the real loop with scripted
//!   model replies and tool results
//! - `parse`   — Show how a piece of model output parses and gates
//! - `config`  — Print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod script;

#[derive(Parser)]
#[command(
    name = "agentloop",
    about = "agentloop — replay harness for the agent reasoning loop",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.agentloop/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted transcript through the loop
    Replay {
        /// TOML script with queries, model replies and tool results
        #[arg(short, long)]
        script: PathBuf,

        /// Approve every dangerous call instead of asking on stdin
        #[arg(short, long)]
        yes: bool,
    },

    /// Parse model output and classify the resulting call
    Parse {
        /// The raw model output
        text: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay { script, yes } => commands::replay::run(&config, &script, yes).await?,
        Commands::Parse { text } => commands::parse::run(&config, &text)?,
        Commands::Config => commands::config_cmd::show(&config)?,
    }

    Ok(())
}
