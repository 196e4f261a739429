//! CLI module for Tollgate
//!
//! Provides commands:
//! - `replay`: run a recorded turn through the usage hooks
//! - `config`: print the resolved configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod config;
pub mod replay;

/// Tollgate usage accounting CLI
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(about = "Usage accounting and cost reconciliation for agent turns")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a recorded turn (JSON) through the hooks and persist its reports
    Replay {
        /// Turn script file
        file: PathBuf,
        /// Translate thought parts through the Gemini API (needs GEMINI_API_KEY)
        #[arg(long)]
        translate: bool,
    },
    /// Print the resolved configuration
    Config {
        /// Print the embedded defaults instead
        #[arg(long)]
        defaults: bool,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Replay { file, translate }) => replay::run(&file, translate).await,
        Some(Commands::Config { defaults }) => config::run(defaults),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
