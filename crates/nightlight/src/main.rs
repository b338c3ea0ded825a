//! nightlight - diabetes telemetry status for small displays
//!
//! Main entry point for the nightlight CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{basal, config, status, watch};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// nightlight - glucose, insulin and loop status in one short line
#[derive(Parser)]
#[command(name = "nightlight")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding config.toml (default: ~/.config/nightlight)
    #[arg(long, global = true, value_name = "DIR")]
    pub config: Option<PathBuf>,

    /// Nightscout site URL, overriding the configured one
    #[arg(long, global = true, env = "NIGHTSCOUT_URL")]
    pub server: Option<String>,

    /// Status mode, overriding the configured one (e.g. basal, openaps, multiple)
    #[arg(long, global = true)]
    pub mode: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Refresh once and print the status line
    Status(status::StatusArgs),

    /// Refresh periodically and print each status line
    Watch(watch::WatchArgs),

    /// Print the reconstructed basal timeline for the last 24 hours
    Basal(basal::BasalArgs),

    /// Configuration inspection
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (stderr, human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "nightlight=debug,nightlight_status=debug,nightlight_client=debug,nightlight_cache=debug,nightlight_config=debug,info"
    } else {
        "nightlight=info,nightlight_status=warn,nightlight_client=warn,warn"
    };

    let log_dir = cli
        .config
        .clone()
        .or_else(nightlight_config::xdg_config_dir)
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "nightlight.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "nightlight=trace,nightlight_status=trace,nightlight_client=trace,nightlight_cache=trace,nightlight_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        config_dir: cli.config,
        server_url: cli.server,
        mode: cli.mode,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Watch(args) => watch::run(args, &ctx).await,
        Commands::Basal(args) => basal::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
