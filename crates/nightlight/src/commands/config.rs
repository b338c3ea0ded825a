//! Config command - configuration inspection.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use console::style;
use serde_json::json;

use nightlight_config::{SourceKind, StatusMode};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./nightlight.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local } => cmd_init(local, ctx),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn user_config_path(ctx: &Context) -> Option<PathBuf> {
    match &ctx.config_dir {
        Some(dir) => Some(dir.join("config.toml")),
        None => nightlight_config::xdg_config_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;
    let source = config.source();
    let status = config.status();
    let sync = config.sync();
    let password = nightlight_config::resolve_dexcom_password(config.dexcom.as_ref());

    if ctx.json_output {
        let output = json!({
            "files": loaded.loaded_from(),
            "source": source.kind,
            "nightscout_url": source.nightscout_url,
            "dexcom_password": password.as_ref().map(|p| p.source.to_string()),
            "status": status.content.as_str(),
            "lines": status.lines.iter().map(StatusMode::as_str).collect::<Vec<_>>(),
            "mmol": config.display().mmol,
            "max_sgv_count": sync.max_sgv_count,
            "request_timeout_secs": sync.request_timeout_secs,
            "refresh_interval_secs": sync.refresh_interval_secs,
            "warnings": loaded.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}\n", style("# Nightlight Configuration").bold());

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for path in &sources {
            println!("  {}", path.display());
        }
        println!();
    }

    println!("Source:");
    match source.kind {
        SourceKind::Nightscout => println!("  {:<12} nightscout", "kind"),
        SourceKind::Dexcom => {
            let dexcom = config.dexcom.clone().unwrap_or_default();
            println!("  {:<12} dexcom ({:?})", "kind", dexcom.region);
            println!(
                "  {:<12} {}",
                "username",
                dexcom.username.as_deref().unwrap_or("(not set)")
            );
            let key_status = match &password {
                Some(secret) => format!("({} ✓)", secret.source),
                None => "(no password)".to_string(),
            };
            println!("  {:<12} {}", "password", key_status);
        }
    }
    println!(
        "  {:<12} {}",
        "nightscout",
        source.nightscout_url.as_deref().unwrap_or("(not set)")
    );
    println!();

    println!("Status:");
    println!("  {:<12} {}", "mode", status.content);
    if status.content == StatusMode::Multiple {
        let lines: Vec<&str> = status.lines.iter().map(StatusMode::as_str).collect();
        println!("  {:<12} {}", "lines", lines.join(", "));
    }
    println!("  {:<12} {}", "units", if config.display().mmol { "mmol/L" } else { "mg/dL" });
    if let Some(max_age) = status.max_age_minutes {
        println!("  {:<12} {}m", "stale after", max_age);
    }
    println!();

    println!("Sync:");
    println!("  {:<12} {}", "readings", sync.max_sgv_count);
    println!("  {:<12} {}s", "timeout", sync.request_timeout_secs);
    println!("  {:<12} {}s", "refresh", sync.refresh_interval_secs);

    if !loaded.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &loaded.warnings {
            println!("  {} {}", style("⚠").yellow(), warning);
        }
    }

    if ctx.verbose {
        let mut redacted = config.clone();
        if let Some(dexcom) = redacted.dexcom.as_mut()
            && dexcom.password.is_some()
        {
            dexcom.password = Some("********".to_string());
        }
        println!();
        println!("Raw TOML:");
        println!("{}", redacted.to_toml()?);
    }

    if let Err(e) = config.validate() {
        println!();
        println!("{} {}", style("✗").red(), e);
    }

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    println!("Config file search order (later overrides earlier):\n");

    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'nightlight config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

fn cmd_init(local: bool, ctx: &Context) -> Result<()> {
    let path = if local {
        PathBuf::from("nightlight.toml")
    } else {
        user_config_path(ctx)
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, TEMPLATE)?;
    println!("Created {}", path.display());
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    if let Some(path) = user_config_path(ctx) {
        println!("{}", path.display());
    } else {
        eprintln!("Could not determine config directory");
    }
    Ok(())
}

const TEMPLATE: &str = r#"# Nightlight Configuration

[source]
kind = "nightscout"
nightscout_url = "https://example.herokuapp.com"

# Glucose from Dexcom Share instead (other streams still need nightscout_url).
# Prefer NIGHTLIGHT_DEXCOM_PASSWORD over a password in this file.
# [source]
# kind = "dexcom"
# [dexcom]
# username = "me"
# region = "us"   # or "outside-us"

[status]
# rigbattery, rawdata, rig-raw, basal, pebbleiob, pebbleiobandcob,
# openaps, customurl, customjson, customtext, multiple
content = "rigbattery"
# lines = ["rigbattery", "basal", "openaps"]
# max_age_minutes = 15

[display]
mmol = false

[sync]
max_sgv_count = 144
request_timeout_secs = 15
refresh_interval_secs = 60
"#;
