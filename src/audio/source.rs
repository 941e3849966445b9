use std::time::Duration;

/// One analysis window of mono samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Index of the first sample on the session's audio clock.
    pub start_sample: u64,
}

impl AudioFrame {
    pub fn timestamp(&self) -> Duration {
        samples_to_duration(self.start_sample, self.sample_rate)
    }
}

pub fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = samples as u128 * 1_000_000_000 / sample_rate as u128;
    Duration::from_nanos(nanos as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// More samples may arrive later.
    Active,
    /// A finite source has delivered everything it had.
    Exhausted,
}

/// Anything that yields a continuous mono signal.
///
/// `drain` must never block: it hands over whatever the source has already
/// buffered (possibly nothing). `cleanup` releases the underlying device
/// and must be safe to call more than once.
pub trait SampleSource: Send {
    fn sample_rate(&self) -> u32;

    fn drain(&mut self, out: &mut Vec<f32>) -> SourceStatus;

    fn cleanup(&mut self);
}

/// Replays an in-memory buffer, one chunk per `drain` call.
///
/// Used for WAV replay and for driving the engine with synthetic signals.
pub struct BufferSource {
    samples: Vec<f32>,
    sample_rate: u32,
    chunk_size: usize,
    position: usize,
}

impl BufferSource {
    pub fn new(samples: Vec<f32>, sample_rate: u32, chunk_size: usize) -> Self {
        Self {
            samples,
            sample_rate,
            chunk_size: chunk_size.max(1),
            position: 0,
        }
    }
}

impl SampleSource for BufferSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn drain(&mut self, out: &mut Vec<f32>) -> SourceStatus {
        let end = (self.position + self.chunk_size).min(self.samples.len());
        out.extend_from_slice(&self.samples[self.position..end]);
        self.position = end;
        if self.position >= self.samples.len() {
            SourceStatus::Exhausted
        } else {
            SourceStatus::Active
        }
    }

    fn cleanup(&mut self) {
        self.position = self.samples.len();
    }
}

/// Cuts a sample stream into overlapping frames.
///
/// Frames are `frame_size` long and start every `hop_size` samples, so with
/// the defaults (2048 / 1024) each sample is analysed twice.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    frame_size: usize,
    hop_size: usize,
    sample_rate: u32,
    buffer: Vec<f32>,
    /// Audio-clock index of `buffer[0]`.
    buffer_start: u64,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, hop_size: usize, sample_rate: u32) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            hop_size: hop_size.clamp(1, frame_size),
            sample_rate,
            buffer: Vec::with_capacity(frame_size * 2),
            buffer_start: 0,
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        self.buffer.extend_from_slice(samples);
    }

    /// Next complete frame, if enough samples are buffered.
    pub fn next_frame(&mut self) -> Option<AudioFrame> {
        if self.buffer.len() < self.frame_size {
            return None;
        }
        let frame = AudioFrame {
            samples: self.buffer[..self.frame_size].to_vec(),
            sample_rate: self.sample_rate,
            start_sample: self.buffer_start,
        };
        self.buffer.drain(..self.hop_size);
        self.buffer_start += self.hop_size as u64;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_source_chunks_then_exhausts() {
        let mut src = BufferSource::new((0..10).map(|i| i as f32).collect(), 8000, 4);
        let mut out = Vec::new();
        assert_eq!(src.drain(&mut out), SourceStatus::Active);
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(src.drain(&mut out), SourceStatus::Active);
        assert_eq!(src.drain(&mut out), SourceStatus::Exhausted);
        assert_eq!(out.len(), 10);
        assert_eq!(src.drain(&mut out), SourceStatus::Exhausted);
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn buffer_source_cleanup_is_idempotent() {
        let mut src = BufferSource::new(vec![0.0; 100], 8000, 10);
        src.cleanup();
        src.cleanup();
        let mut out = Vec::new();
        assert_eq!(src.drain(&mut out), SourceStatus::Exhausted);
        assert!(out.is_empty());
    }

    #[test]
    fn assembler_overlaps_frames() {
        let mut asm = FrameAssembler::new(4, 2, 1000);
        asm.push(&[0.0, 1.0, 2.0]);
        assert!(asm.next_frame().is_none());

        asm.push(&[3.0, 4.0, 5.0, 6.0]);
        let first = asm.next_frame().unwrap();
        assert_eq!(first.samples, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(first.start_sample, 0);

        let second = asm.next_frame().unwrap();
        assert_eq!(second.samples, vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(second.start_sample, 2);
        assert_eq!(second.timestamp(), Duration::from_millis(2));

        assert!(asm.next_frame().is_none());
        asm.push(&[7.0]);
        assert_eq!(asm.next_frame().unwrap().start_sample, 4);
    }

    #[test]
    fn hop_is_clamped_to_frame() {
        let mut asm = FrameAssembler::new(4, 100, 1000);
        asm.push(&[0.0; 8]);
        assert_eq!(asm.next_frame().unwrap().start_sample, 0);
        assert_eq!(asm.next_frame().unwrap().start_sample, 4);
    }

    #[test]
    fn duration_conversion() {
        assert_eq!(samples_to_duration(44100, 44100), Duration::from_secs(1));
        assert_eq!(samples_to_duration(10, 0), Duration::ZERO);
    }
}
