//! Watch command.

use anyhow::Result;
use clap::Args;
use console::Style;
use tracing::{debug, info};

use super::{Context, print_line};

/// Arguments for the watch command.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Stop after this many refreshes
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Seconds between refreshes (overrides `sync.refresh_interval_secs`)
    #[arg(short, long, value_name = "SECS")]
    pub interval: Option<u64>,
}

/// Run the watch command.
///
/// Caches and in-flight coordination persist between ticks, so every refresh
/// after the first only fetches what is new.
pub async fn run(args: WatchArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;
    let aggregator = ctx.aggregator(config)?;
    let max_age = aggregator.status_config().max_age_minutes;

    let period = match args.interval {
        Some(secs) => std::time::Duration::from_secs(secs.max(1)),
        None => config.sync().refresh_interval().max(std::time::Duration::from_secs(1)),
    };
    info!(?period, count = ?args.count, "Watching");

    let dim = Style::new().dim();
    let mut ticker = tokio::time::interval(period);
    let mut refreshes = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
        }

        if refreshes > 0 && !ctx.json_output {
            println!("{}", dim.apply_to("─".repeat(40)));
        }

        let line = aggregator.refresh().await;
        print_line(&line, max_age, ctx)?;
        refreshes += 1;

        if args.count.is_some_and(|n| refreshes >= n) {
            break;
        }
    }

    Ok(())
}
