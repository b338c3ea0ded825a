//! Basal command.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use nightlight_status::producers;
use nightlight_status::{BasalInterval, IntervalSource};
use serde::Serialize;
use tracing::warn;

use super::Context;

/// Arguments for the basal command.
#[derive(Args, Debug)]
pub struct BasalArgs {
    /// Only show temporary basal intervals
    #[arg(long)]
    pub temps_only: bool,
}

#[derive(Serialize)]
struct IntervalOutput {
    start: i64,
    end: Option<i64>,
    duration_minutes: Option<f64>,
    rate: f64,
    source: &'static str,
}

impl From<&BasalInterval> for IntervalOutput {
    fn from(interval: &BasalInterval) -> Self {
        Self {
            start: interval.start,
            end: interval.end(),
            duration_minutes: interval.duration.map(|ms| ms as f64 / 60_000.0),
            rate: interval.rate,
            source: source_name(interval.source),
        }
    }
}

fn source_name(source: IntervalSource) -> &'static str {
    match source {
        IntervalSource::Profile => "profile",
        IntervalSource::Temp => "temp",
    }
}

/// Run the basal command.
pub async fn run(args: BasalArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let session = ctx.session(&loaded.config)?;

    let intervals = match producers::basal_history(&session).await {
        Ok(intervals) => intervals,
        Err(e) => {
            warn!(error = %e, "Basal history unavailable");
            if ctx.json_output {
                println!("[]");
            } else {
                println!("{}", nightlight_status::line::UNAVAILABLE);
            }
            return Ok(());
        }
    };

    let intervals: Vec<&BasalInterval> = intervals
        .iter()
        .filter(|i| !args.temps_only || i.source == IntervalSource::Temp)
        .collect();

    if ctx.json_output {
        let output: Vec<IntervalOutput> = intervals.iter().map(|i| IntervalOutput::from(*i)).collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style("Basal (last 24h)").bold());
    println!("{}", dim.apply_to("─".repeat(40)));

    if intervals.is_empty() {
        println!("  {}", dim.apply_to("no basal data"));
        return Ok(());
    }

    // Times are shown in the zone the schedule is read in.
    let zone = session.zone();
    for interval in intervals {
        let start = zone.hhmm(interval.start);
        let end = interval
            .end()
            .map(|ms| zone.hhmm(ms))
            .unwrap_or_else(|| "now".to_string());
        let label = match interval.source {
            IntervalSource::Temp => style("temp").yellow(),
            IntervalSource::Profile => style("profile").dim(),
        };
        println!(
            "  {} - {}  {:>6} u/h  {}",
            start,
            end,
            format!("{:.2}", interval.rate),
            label
        );
    }

    Ok(())
}

