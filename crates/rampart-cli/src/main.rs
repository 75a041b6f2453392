//! Rampart CLI
//!
//! Command-line interface for the Rampart ransomware playbook engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod config;

use commands::{run_playbook, RunOptions};
use config::AppConfig;
use rampart_core::Playbook;

#[derive(Parser)]
#[command(name = "rampart")]
#[command(version)]
#[command(about = "Ransomware incident playbook engine", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the shipped ransomware playbook against mock connectors
    Run {
        /// File containing the ransom note text (sample note if omitted)
        #[arg(long)]
        note: Option<PathBuf>,

        /// Leave the data encryption status unset instead of Confirmed
        #[arg(long)]
        unconfirmed: bool,

        /// Inject a containment connector outage
        #[arg(long)]
        fail_containment: bool,
    },

    /// Validate a playbook definition file
    Validate {
        /// YAML playbook file to validate
        playbook: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    let mut logging = rampart_observability::LoggingConfig::default();
    logging.json_format = config.logging.json;
    logging.level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        config
            .logging
            .level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    };
    rampart_observability::init_logging_with_config(logging);
    rampart_observability::register_metrics();

    match cli.command {
        Commands::Run {
            note,
            unconfirmed,
            fail_containment,
        } => {
            run_playbook(
                &config,
                RunOptions {
                    note,
                    confirmed: !unconfirmed,
                    fail_containment,
                },
            )
            .await
        }
        Commands::Validate { playbook } => validate_playbook(&playbook),
        Commands::Config => {
            let yaml = serde_yaml::to_string(&config)?;
            print!("{yaml}");
            Ok(())
        }
    }
}


fn validate_playbook(path: &PathBuf) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read playbook file: {}", path.display()))?;
    let playbook: Playbook = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse playbook file: {}", path.display()))?;

    match playbook.build_graph() {
        Ok(graph) => {
            println!(
                "{} {} ({} tasks, entry {})",
                "valid".green().bold(),
                playbook.name,
                graph.len(),
                graph.entry().id
            );
            Ok(())
        }
        Err(err) => {
            println!("{} {}", "invalid".red().bold(), err);
            anyhow::bail!("playbook failed validation: {err}")
        }
    }
}
