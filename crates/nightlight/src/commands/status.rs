//! Status command.

use anyhow::Result;
use clap::Args;
use console::style;
use tracing::info;

use super::{Context, print_line};

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Flag output older than this many minutes (overrides `status.max_age_minutes`)
    #[arg(long, value_name = "MINUTES")]
    pub max_age: Option<u32>,
}

/// Run the status command.
pub async fn run(args: StatusArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;
    let aggregator = ctx.aggregator(config)?;
    let status = aggregator.status_config();

    if ctx.verbose && !ctx.json_output {
        println!(
            "{} {}",
            style("Mode:").bold(),
            style(status.content.as_str()).cyan()
        );
    }

    let line = aggregator.refresh().await;
    info!(mode = %status.content, unavailable = line.is_unavailable(), "Status refreshed");

    print_line(&line, args.max_age.or(status.max_age_minutes), ctx)
}
