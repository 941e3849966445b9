use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use console::style;
use tokio::runtime::Runtime;

use super::capture::{stop_channel, StopSignal};
use crate::analysis::metrics::{VocalMetrics, Vowel};
use crate::config::AppConfig;
use crate::dsp::note::NoteReading;
use crate::error::SessionError;
use crate::session::VocalSession;

/// Print live readings until Ctrl-C or `seconds` elapse, then a summary.
pub fn run(config: AppConfig, seconds: Option<u64>, json: bool) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(listen(config, seconds, json))
}

async fn listen(config: AppConfig, seconds: Option<u64>, json: bool) -> Result<()> {
    let (signal, mut stop) = stop_channel();
    stop_on_ctrl_c(signal);

    let tick = Duration::from_secs_f32(config.tick_secs());
    let mut session = VocalSession::new(config);

    if !json {
        eprintln!("  Listening... press {} to stop.", style("Ctrl-C").green().bold());
    }
    match session.start(stop.clone()).await {
        Ok(()) => {}
        Err(SessionError::Cancelled) => return Ok(()),
        Err(e) => return Err(e).context("Failed to start listening"),
    }

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let mut interval = tokio::time::interval(tick);

    loop {
        tokio::select! {
            _ = stop.stopped() => break,
            _ = interval.tick() => {
                for reading in session.drain_readings() {
                    print_reading(&reading, json)?;
                }
                if !session.is_running() {
                    log::warn!("Input stream ended");
                    break;
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
            }
        }
    }

    session.stop();
    let metrics = session.metrics();
    if json {
        println!("{}", serde_json::to_string(&metrics)?);
    } else {
        print_summary(&metrics);
    }
    Ok(())
}

/// Current-thread runtime for the async parts of the CLI.
pub(crate) fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")
}

/// Fire `signal` on the first Ctrl-C.
pub(crate) fn stop_on_ctrl_c(signal: StopSignal) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal.stop(),
            Err(e) => log::warn!("Could not install Ctrl-C handler: {e}"),
        }
    });
}

pub(crate) fn print_reading(reading: &NoteReading, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(reading)?);
        return Ok(());
    }

    let at = reading.timestamp.as_secs_f32();
    if !reading.is_voiced() {
        println!("  {}", style(format!("{at:7.2}s        -")).dim());
        return Ok(());
    }

    let note = format!("{:<3}", reading.label());
    let note = if reading.is_in_tune {
        style(note).green().bold()
    } else {
        style(note).yellow()
    };
    println!(
        "  {at:7.2}s  {note}  {:+3}c  {:7.1} Hz  vol {:3.0}  conf {:.2}",
        reading.cents, reading.frequency_hz, reading.volume, reading.confidence
    );
    Ok(())
}

pub(crate) fn print_summary(metrics: &VocalMetrics) {
    let session = &metrics.session;
    println!();
    println!("{}", style("Session").bold());
    println!("  Duration:    {:.1} s", session.duration_secs);
    println!("  Voiced:      {} frames", session.voiced_frames);
    println!("  Accuracy:    {:.0}/100", session.accuracy_score);
    if session.notes_hit.is_empty() {
        println!("  Notes hit:   {}", style("none").dim());
    } else {
        println!("  Notes hit:   {}", session.notes_hit.join(" "));
    }

    println!();
    println!("{}", style("Recent window").bold());
    match &metrics.pitch_range {
        Some(range) => println!(
            "  Range:       {} - {} ({:.1} semitones)",
            range.lowest_note, range.highest_note, range.semitones
        ),
        None => println!("  Range:       {}", style("no pitch").dim()),
    }

    let stability = &metrics.stability;
    if stability.available {
        println!(
            "  Stability:   {:.0}/100 (±{:.1} cents around {:.1} Hz)",
            stability.consistency, stability.avg_deviation_cents, stability.mean_hz
        );
    } else {
        println!("  Stability:   {}", style("not enough voiced audio").dim());
    }

    let vibrato = &metrics.vibrato;
    if vibrato.detected {
        println!(
            "  Vibrato:     {:.1} Hz, ±{:.0} cents",
            vibrato.rate_hz, vibrato.depth_cents
        );
    } else {
        println!("  Vibrato:     {}", style("none").dim());
    }

    let volume = &metrics.volume;
    println!(
        "  Volume:      avg {:.0}, {:.0}-{:.0} (range {:.0})",
        volume.average, volume.min, volume.max, volume.dynamic_range
    );

    if metrics.formants.vowel != Vowel::NotApplicable {
        if let (Some(f1), Some(f2)) = (metrics.formants.f1_hz, metrics.formants.f2_hz) {
            println!(
                "  Vowel:       {:?} (F1 {:.0} Hz, F2 {:.0} Hz)",
                metrics.formants.vowel, f1, f2
            );
        }
    }
}
