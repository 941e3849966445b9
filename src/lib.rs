//! Real-time vocal analysis: pitch detection, note mapping, rolling vocal
//! metrics, note-hold challenges and session statistics.
//!
//! `session::VocalSession` is the entry point. Feed it the microphone with
//! `start` (or any `SampleSource` with `start_with`) and pull one
//! `NoteReading` per tick with `next_reading`.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod paths;
pub mod session;
pub mod util;

pub use config::AppConfig;
pub use dsp::note::NoteReading;
pub use error::SessionError;
pub use session::VocalSession;
