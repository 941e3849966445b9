use std::time::Duration;

use anyhow::{bail, Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::capture::stop_channel;
use super::listen::{runtime, stop_on_ctrl_c};
use crate::analysis::hold::HoldPhase;
use crate::config::AppConfig;
use crate::dsp::note;
use crate::error::SessionError;
use crate::session::VocalSession;

/// Parse "A4", "C#5", "Bb3" or a plain frequency like "440".
pub fn parse_target(target: &str) -> Result<f32> {
    if let Some((name, octave)) = note::parse_note(target) {
        return Ok(name.frequency(octave));
    }
    match target.trim().trim_end_matches("Hz").trim().parse::<f32>() {
        Ok(hz) if hz > 0.0 => Ok(hz),
        _ => bail!("Not a note or frequency: {target:?} (try A4, C#5 or 440)"),
    }
}

/// Note-hold challenge: sing the target until the bar fills.
///
/// Drifting out of tolerance, losing stability or going quiet restarts the
/// bar from zero.
pub fn run(
    config: AppConfig,
    target: &str,
    tolerance_hz: Option<f32>,
    hold_ms: Option<u64>,
) -> Result<()> {
    let target_hz = parse_target(target)?;
    let tolerance_hz = tolerance_hz.unwrap_or(config.hold.tolerance_hz);
    let required_ms = hold_ms.unwrap_or(config.hold.required_ms);

    let rt = runtime()?;
    rt.block_on(hold(config, target_hz, tolerance_hz, required_ms))
}

async fn hold(config: AppConfig, target_hz: f32, tolerance_hz: f32, required_ms: u64) -> Result<()> {
    let (signal, mut stop) = stop_channel();
    stop_on_ctrl_c(signal);

    let target_label = note::note_position(target_hz).label();
    println!(
        "  Target: {} ({:.1} Hz ± {:.0} Hz), hold for {:.1} s",
        style(&target_label).cyan().bold(),
        target_hz,
        tolerance_hz,
        required_ms as f32 / 1000.0
    );

    let tick = Duration::from_secs_f32(config.tick_secs());
    let mut session = VocalSession::new(config);
    match session.start(stop.clone()).await {
        Ok(()) => {}
        Err(SessionError::Cancelled) => return Ok(()),
        Err(e) => return Err(e).context("Failed to open the microphone"),
    }

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("  {bar:30.green/dim} {pos:>3}%  {msg}")
            .context("Invalid progress template")?,
    );

    let mut interval = tokio::time::interval(tick);
    let completed = loop {
        tokio::select! {
            _ = stop.stopped() => break false,
            _ = interval.tick() => {
                let mut state = session.hold_state();
                while session.next_reading().is_some() {
                    state = session.hold_on_latest(target_hz, required_ms, tolerance_hz);
                }

                pb.set_position((state.hold_progress * 100.0).round() as u64);
                pb.set_message(status_message(&session, target_hz));

                if state.phase == HoldPhase::Complete {
                    break true;
                }
                if !session.is_running() {
                    log::warn!("Input stream ended");
                    break false;
                }
            }
        }
    };

    pb.finish_and_clear();
    session.stop();

    if completed {
        println!(
            "  {} Held {} for {:.1} s",
            style("DONE").green().bold(),
            target_label,
            session.hold_state().time_held_ms as f32 / 1000.0
        );
    } else {
        println!("  Stopped before the hold was complete.");
    }

    let summary = session.metrics().session;
    if !summary.notes_hit.is_empty() {
        println!("  Notes hit: {}", summary.notes_hit.join(" "));
    }
    Ok(())
}

fn status_message(session: &VocalSession, target_hz: f32) -> String {
    let Some(reading) = session.latest_reading().filter(|r| r.is_voiced()) else {
        return style("sing!").dim().to_string();
    };
    let direction = if reading.frequency_hz < target_hz { "↑" } else { "↓" };
    let stable = if session.is_stable() { "" } else { " (steady...)" };
    format!(
        "{} {:+}c  {:.1} Hz {}{}",
        reading.label(),
        reading.cents,
        reading.frequency_hz,
        direction,
        stable
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::note::NoteName;

    #[test]
    fn targets_accept_notes_and_hz() {
        assert!((parse_target("A4").unwrap() - 440.0).abs() < 0.01);
        assert!((parse_target("C#5").unwrap() - NoteName::CSharp.frequency(5)).abs() < 0.01);
        assert_eq!(parse_target("261.6").unwrap(), 261.6);
        assert_eq!(parse_target("220 Hz").unwrap(), 220.0);
    }

    #[test]
    fn rejects_nonsense_targets() {
        assert!(parse_target("H2").is_err());
        assert!(parse_target("-3").is_err());
        assert!(parse_target("").is_err());
    }
}
