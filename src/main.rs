mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use console::style;

use vocalcoach::audio;
use vocalcoach::config::{self, AppConfig};
use vocalcoach::paths;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config()?,
    };
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Command::Devices => audio::devices::list_devices(),

        Command::Listen { seconds, json } => audio::listen::run(config, seconds, json),

        Command::Hold {
            target,
            tolerance,
            hold_ms,
        } => audio::hold_exercise::run(config, &target, tolerance, hold_ms),

        Command::Analyze { wav, json } => audio::replay::run(config, &wav, json),

        Command::Config => show_config(&config, cli.config.as_deref()),
    }
}

fn show_config(config: &AppConfig, override_path: Option<&std::path::Path>) -> Result<()> {
    let path = override_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(paths::config_file);
    let state = if path.exists() {
        style("found").green()
    } else {
        style("not found, using defaults").dim()
    };
    println!("  Config file: {} ({state})", path.display());
    println!(
        "  Tick:        {:.1} ms ({} samples at {} Hz)",
        config.tick_secs() * 1000.0,
        config.audio.hop_size,
        config.audio.sample_rate
    );
    println!();
    let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
    print!("{rendered}");
    Ok(())
}
