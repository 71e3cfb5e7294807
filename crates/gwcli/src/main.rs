//! gwcli - command shell over a graphwatch session
//!
//! Subcommands:
//! - `gwcli replay <script>` - Play a JSON-lines script of commands and server events
//! - `gwcli config` - Print the effective configuration

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use graphwatch_conf::GraphwatchConfig;

mod command;
mod format;
mod replay;

#[derive(Parser)]
#[command(name = "gwcli")]
#[command(about = "Command shell over a graphwatch registry mirror")]
#[command(version)]
struct Cli {
    /// Configuration file, in place of ./graphwatch.toml
    #[arg(long, global = true, env = "GRAPHWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a script of shell commands and server events
    Replay {
        /// JSON-lines script
        script: PathBuf,

        /// Print every request sent to a remote as `>> <json>`
        #[arg(long)]
        requests: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = GraphwatchConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    let filter = EnvFilter::try_new(&config.infra.telemetry.log_level)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay { script, requests } => {
            let file = File::open(&script)
                .with_context(|| format!("Failed to open script {}", script.display()))?;
            let stdout = std::io::stdout();
            let mut replay = replay::Replay::new(&config, requests, stdout.lock());
            replay.run(BufReader::new(file))?;
        }
        Commands::Config => {
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}
