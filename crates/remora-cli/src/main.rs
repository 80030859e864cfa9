//! Remora CLI
//!
//! Command-line interface for Remora - mirrors a remote content store
//! into a local directory and keeps it consistent.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "remora")]
#[command(about = "Remora - mirror a remote content store into a local directory")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror the source and keep watching for changes
    Run {
        /// Directory treated as the remote store (overrides config)
        #[arg(long)]
        source: Option<PathBuf>,
        /// Mirror destination directory (overrides config)
        #[arg(long)]
        mirror: Option<PathBuf>,
        /// Stop after the initial full sync instead of watching
        #[arg(long)]
        once: bool,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (remote_root, mirror_dir, source_dir, ...)
        key: String,
        /// Configuration value
        value: String,
    },
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("remora_core=info,remora_cli=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    match cli.command {
        Commands::Run {
            source,
            mirror,
            once,
        } => commands::run::run(source, mirror, once, &output).await,
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => commands::config::show(&output),
            Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, &output),
            Some(ConfigCommands::Path) => commands::config::path(&output),
        },
    }
}
