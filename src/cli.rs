use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vocalcoach")]
#[command(about = "Real-time pitch, stability and note-hold feedback for singers")]
pub struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List available audio input devices
    Devices,

    /// Print live readings from the microphone (Ctrl-C to stop)
    Listen {
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,

        /// One JSON object per reading instead of text
        #[arg(long)]
        json: bool,
    },

    /// Hold a target note steadily until the timer fills
    Hold {
        /// Note name ("A4", "C#5", "Bb3") or a frequency in Hz
        target: String,

        /// Allowed distance from the target in Hz
        #[arg(long)]
        tolerance: Option<f32>,

        /// How long the note must be held, in milliseconds
        #[arg(long)]
        hold_ms: Option<u64>,
    },

    /// Run a WAV file through the analysis and print what it finds
    Analyze {
        wav: PathBuf,

        /// Print readings and the final metrics as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration and where it is loaded from
    Config,
}
