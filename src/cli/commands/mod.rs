//! CLI parser and dispatch.

mod config_cmd;
mod extract;
mod tools;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use scanlayer::Settings;

#[derive(Parser)]
#[command(name = "scanlayer")]
#[command(about = "Hybrid text extraction for digital, scanned and mixed documents")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from a document
    Extract {
        /// Document to read
        file: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Fail if extraction takes longer than this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Skip input validation of the extracted text
        #[arg(long)]
        no_validate: bool,
    },

    /// Show which external tools and OCR backends are available
    Tools,

    /// Print the effective configuration as TOML
    Config,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Extract {
            file,
            json,
            timeout,
            no_validate,
        } => extract::cmd_extract(&settings, &file, json, timeout, no_validate).await,
        Commands::Tools => tools::cmd_tools(&settings),
        Commands::Config => config_cmd::cmd_config(&settings),
    }
}
