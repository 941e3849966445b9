use anyhow::{Context, Result};
use console::style;
use cpal::traits::{DeviceTrait, HostTrait};

/// Print every input device with its supported configurations.
///
/// The marked device is what `[audio] device = "default"` resolves to.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    log::debug!("Audio host: {:?}", host.id());

    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let devices: Vec<_> = host
        .input_devices()
        .context("Failed to enumerate input devices")?
        .collect();

    if devices.is_empty() {
        eprintln!("No audio input devices found.");
        return Ok(());
    }

    println!("{}", style("Input devices").bold());
    println!();

    for device in &devices {
        let name = device.name().unwrap_or_else(|_| "<unknown>".into());

        if name == default_name {
            println!("  {} {}", style("*").green().bold(), style(&name).green().bold());
        } else {
            println!("    {}", style(&name).bold());
        }

        match device.supported_input_configs() {
            Ok(configs) => {
                for cfg in configs {
                    let min_rate = cfg.min_sample_rate().0;
                    let max_rate = cfg.max_sample_rate().0;
                    let rates = if min_rate == max_rate {
                        format!("{min_rate} Hz")
                    } else {
                        format!("{min_rate}-{max_rate} Hz")
                    };
                    let fits = cfg.channels() == 1 && (min_rate..=max_rate).contains(&44100);
                    let line = format!("{}ch  {rates}  {:?}", cfg.channels(), cfg.sample_format());
                    if fits {
                        println!("      {}", style(line).cyan());
                    } else {
                        println!("      {line}");
                    }
                }
            }
            Err(e) => println!("      {}", style(format!("Could not query configs: {e}")).dim()),
        }
        println!();
    }

    if !default_name.is_empty() {
        println!("  {} = default device", style("*").green().bold());
    }
    println!("  {} = mono at 44.1 kHz, used without down-mixing", style("cyan").cyan());

    Ok(())
}
