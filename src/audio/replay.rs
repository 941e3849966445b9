use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;

use super::listen::{print_reading, print_summary};
use super::source::BufferSource;
use super::wav;
use crate::analysis::metrics::VocalMetrics;
use crate::config::AppConfig;
use crate::dsp::note::NoteReading;
use crate::session::VocalSession;
use crate::util;

/// Segments shorter than this many frames are treated as detector jitter.
const MIN_SEGMENT_FRAMES: usize = 2;

/// A run of consecutive voiced readings on the same note.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteSegment {
    pub label: String,
    pub start: Duration,
    pub end: Duration,
    pub frames: usize,
    pub mean_cents: f32,
    /// Share of the frames that were in tune, 0.0-1.0.
    pub in_tune: f32,
}

/// Replay `path` through a fresh session, returning every reading and the
/// metrics at the end of the file.
pub fn analyze_file(config: AppConfig, path: &Path) -> Result<(Vec<NoteReading>, VocalMetrics)> {
    let (samples, spec) = wav::load_samples(path)?;
    log::info!(
        "Analysing {}: {:.1} s, peak {:.1} dB, RMS {:.1} dB",
        path.display(),
        samples.len() as f32 / spec.sample_rate.max(1) as f32,
        util::peak_db(&samples),
        util::rms_db(&samples)
    );

    let chunk = config.audio.hop_size;
    let mut session = VocalSession::new(config);
    session
        .start_with(Box::new(BufferSource::new(samples, spec.sample_rate, chunk)))
        .with_context(|| format!("Cannot analyse {}", path.display()))?;

    let readings = session.drain_readings();
    Ok((readings, session.metrics()))
}

pub fn run(config: AppConfig, path: &Path, json: bool) -> Result<()> {
    let (readings, metrics) = analyze_file(config, path)?;

    if json {
        for reading in &readings {
            print_reading(reading, true)?;
        }
        println!("{}", serde_json::to_string(&metrics)?);
        return Ok(());
    }

    println!("{}", style(path.display()).bold());
    let found = segments(&readings);
    if found.is_empty() {
        println!("  {}", style("No sustained pitch found.").dim());
    }
    for seg in &found {
        let label = format!("{:<3}", seg.label);
        let label = if seg.in_tune >= 0.5 {
            style(label).green()
        } else {
            style(label).yellow()
        };
        println!(
            "  {:6.2}s - {:6.2}s  {label}  {:+5.1}c  {:3.0}% in tune",
            seg.start.as_secs_f32(),
            seg.end.as_secs_f32(),
            seg.mean_cents,
            seg.in_tune * 100.0
        );
    }

    print_summary(&metrics);
    Ok(())
}

/// Collapse readings into note segments. Silence or a note change ends a
/// segment.
pub fn segments(readings: &[NoteReading]) -> Vec<NoteSegment> {
    let mut out = Vec::new();
    let mut run: Vec<&NoteReading> = Vec::new();

    for reading in readings {
        let continues = run
            .last()
            .is_some_and(|prev| reading.is_voiced() && prev.label() == reading.label());
        if !continues {
            flush(&mut run, &mut out);
        }
        if reading.is_voiced() {
            run.push(reading);
        }
    }
    flush(&mut run, &mut out);
    out
}

fn flush(run: &mut Vec<&NoteReading>, out: &mut Vec<NoteSegment>) {
    if run.len() >= MIN_SEGMENT_FRAMES {
        let frames = run.len();
        let cents: f32 = run.iter().map(|r| r.cents as f32).sum();
        let tuned = run.iter().filter(|r| r.is_in_tune).count();
        out.push(NoteSegment {
            label: run[0].label(),
            start: run[0].timestamp,
            end: run[frames - 1].timestamp,
            frames,
            mean_cents: cents / frames as f32,
            in_tune: tuned as f32 / frames as f32,
        });
    }
    run.clear();
}
