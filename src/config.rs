use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dsp::pitch::{DetectorConfig, DetectorKind};
use crate::error::SessionError;
use crate::paths;

/// Fewest voiced samples a stability score may be based on.
pub const MIN_STABILITY_SAMPLES: usize = 10;
/// Fewest voiced samples vibrato detection may look at.
pub const MIN_VIBRATO_SAMPLES: usize = 20;
/// Fewest complete peak/trough cycles that may count as vibrato.
pub const MIN_VIBRATO_CYCLES: usize = 4;

/// Application configuration, loaded from config.toml.
///
/// Every section carries `#[serde(default)]`, so a partial file only
/// overrides what it names and a missing file means factory settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub detector: DetectorSettings,
    pub analysis: AnalysisConfig,
    pub hold: HoldConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Requested input rate. The device may grant a different one, in which
    /// case analysis follows the granted rate.
    pub sample_rate: u32,
    /// Samples per analysis frame. Must be a power of two.
    pub frame_size: usize,
    /// Samples between the starts of consecutive frames (the tick cadence).
    pub hop_size: usize,
    pub device: String,
    /// Capacity, in callback chunks, of the capture → analysis channel.
    pub channel_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub algorithm: DetectorKind,
    /// Frames with RMS below this are treated as silence.
    pub min_rms: f32,
    pub good_enough_correlation: f32,
    pub min_correlation: f32,
    /// Lowest pitch the frame size must be able to resolve.
    pub min_frequency_hz: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Frames kept in the rolling history (~2.3 s at the default cadence).
    pub history_capacity: usize,
    /// |cents| strictly below this counts as in tune.
    pub in_tune_cents: f32,
    /// Volume (0-100) at which the loudness part of confidence saturates.
    pub reference_volume: f32,
    /// Recent voiced readings used for the stability part of confidence.
    pub confidence_window: usize,
    pub stability_min_samples: usize,
    pub vibrato_min_samples: usize,
    /// Minimum frequency change (Hz) around a sample for it to count as a
    /// vibrato peak or trough.
    pub vibrato_threshold_hz: f32,
    /// Complete peak/trough cycles required before vibrato is reported.
    pub vibrato_min_cycles: usize,
    /// Recent-stability score at or above which the pitch counts as stable.
    pub stable_threshold: f32,
    /// Estimate formants from the signal when none are supplied externally.
    pub estimate_formants: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldConfig {
    pub required_ms: u64,
    pub tolerance_hz: f32,
    /// Confidence must be strictly above this to count toward a hold.
    pub min_confidence: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frame_size: 2048,
            hop_size: 1024,
            device: "default".into(),
            channel_depth: 64,
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            algorithm: DetectorKind::Autocorrelation,
            min_rms: 0.01,
            good_enough_correlation: 0.9,
            min_correlation: 0.01,
            min_frequency_hz: 80.0,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            in_tune_cents: 10.0,
            reference_volume: 50.0,
            confidence_window: 5,
            stability_min_samples: 10,
            vibrato_min_samples: 20,
            vibrato_threshold_hz: 0.5,
            vibrato_min_cycles: 4,
            stable_threshold: 0.5,
            estimate_formants: false,
        }
    }
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            required_ms: 3000,
            tolerance_hz: 30.0,
            min_confidence: 0.5,
        }
    }
}

impl From<&DetectorSettings> for DetectorConfig {
    fn from(cfg: &DetectorSettings) -> Self {
        DetectorConfig {
            kind: cfg.algorithm,
            min_rms: cfg.min_rms,
            good_enough_correlation: cfg.good_enough_correlation,
            min_correlation: cfg.min_correlation,
        }
    }
}

impl AppConfig {
    /// Seconds between analysis ticks.
    pub fn tick_secs(&self) -> f32 {
        self.audio.hop_size as f32 / self.audio.sample_rate.max(1) as f32
    }

    /// Reject settings the analysis cannot work with.
    pub fn validate(&self) -> Result<(), SessionError> {
        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(SessionError::Config("sample_rate must be positive".into()));
        }
        if !audio.frame_size.is_power_of_two() || audio.frame_size < 64 {
            return Err(SessionError::Config(format!(
                "frame_size must be a power of two >= 64, got {}",
                audio.frame_size
            )));
        }
        if audio.hop_size == 0 || audio.hop_size > audio.frame_size {
            return Err(SessionError::Config(format!(
                "hop_size must be in 1..={}, got {}",
                audio.frame_size, audio.hop_size
            )));
        }
        // The longest period we want to see has to fit in the first half of
        // the frame, which is all the autocorrelation scan looks at.
        if self.detector.min_frequency_hz > 0.0 {
            let longest_period = audio.sample_rate as f32 / self.detector.min_frequency_hz;
            if longest_period > (audio.frame_size / 2) as f32 {
                return Err(SessionError::Config(format!(
                    "frame_size {} cannot resolve {} Hz at {} Hz",
                    audio.frame_size, self.detector.min_frequency_hz, audio.sample_rate
                )));
            }
        }
        if self.analysis.history_capacity == 0 {
            return Err(SessionError::Config("history_capacity must be positive".into()));
        }
        if audio.channel_depth == 0 {
            return Err(SessionError::Config("channel_depth must be positive".into()));
        }

        let analysis = &self.analysis;
        let floors = [
            ("stability_min_samples", analysis.stability_min_samples, MIN_STABILITY_SAMPLES),
            ("vibrato_min_samples", analysis.vibrato_min_samples, MIN_VIBRATO_SAMPLES),
            ("vibrato_min_cycles", analysis.vibrato_min_cycles, MIN_VIBRATO_CYCLES),
        ];
        for (name, value, floor) in floors {
            if value < floor {
                return Err(SessionError::Config(format!(
                    "{name} must be at least {floor}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Load the application config from $XDG_CONFIG_HOME/vocalcoach/config.toml.
/// If the file doesn't exist, returns defaults.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&paths::config_file())
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(AppConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    log::info!("Loaded config from {}", path.display());
    Ok(config)
}
