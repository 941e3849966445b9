use std::path::Path;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec};

/// Load a WAV file as mono f32 in [-1.0, 1.0].
///
/// Multichannel files keep only the first channel. Returns the spec too so
/// callers can read the sample rate.
pub fn load_samples(path: &Path) -> Result<(Vec<f32>, WavSpec)> {
    let mut reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<hound::Result<Vec<_>>>()
                .context("Failed to read WAV samples")?
        }
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<hound::Result<Vec<_>>>()
            .context("Failed to read WAV samples")?,
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved.into_iter().step_by(channels).collect()
    };

    log::debug!(
        "Loaded {} ({} samples, {} Hz, {}ch)",
        path.display(),
        samples.len(),
        spec.sample_rate,
        spec.channels
    );

    Ok((samples, spec))
}
