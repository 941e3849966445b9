use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, DefaultStreamConfigError, PlayStreamError, SampleFormat, SampleRate, Stream,
    StreamConfig, SupportedStreamConfig,
};
use tokio::sync::{oneshot, watch};

use super::source::{SampleSource, SourceStatus};
use crate::config::AudioConfig;
use crate::error::SessionError;

/// What to open and how much to buffer between capture and analysis.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// "default" or an exact device name from `vocalcoach devices`.
    pub device: String,
    pub sample_rate: u32,
    pub channel_depth: usize,
}

impl From<&AudioConfig> for CaptureSettings {
    fn from(cfg: &AudioConfig) -> Self {
        Self {
            device: cfg.device.clone(),
            sample_rate: cfg.sample_rate,
            channel_depth: cfg.channel_depth,
        }
    }
}

/// Fires a stop request. Cloneable so a Ctrl-C handler and the UI layer can
/// both hold one.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes a `StopSignal`.
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

pub fn stop_channel() -> (StopSignal, StopListener) {
    let (tx, rx) = watch::channel(false);
    (StopSignal { tx: Arc::new(tx) }, StopListener { rx })
}

impl StopSignal {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

impl StopListener {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested. If every `StopSignal` is
    /// dropped without firing, this never resolves.
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Live microphone input.
///
/// The cpal stream lives on a dedicated capture thread for its whole life
/// (cpal streams are not `Send` on every platform). The audio callback
/// down-mixes to mono and pushes chunks through a bounded channel; if the
/// analysis side falls behind, new chunks are dropped instead of blocking
/// the audio thread.
pub struct MicSource {
    sample_rate: u32,
    samples: Receiver<Vec<f32>>,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicSource {
    /// Open the input device.
    ///
    /// Opening may wait on the OS permission prompt, so this is async and
    /// races against `stop`. If the stop wins, the capture thread releases
    /// the device as soon as the open call returns.
    pub async fn acquire(
        settings: CaptureSettings,
        stop: &mut StopListener,
    ) -> Result<Self, SessionError> {
        if stop.is_stopped() {
            return Err(SessionError::Cancelled);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (sample_tx, sample_rx) = mpsc::sync_channel(settings.channel_depth.max(1));

        let thread = thread::Builder::new()
            .name("vocalcoach-capture".into())
            .spawn(move || run_capture(&settings, sample_tx, ready_tx, shutdown_rx))
            .map_err(|e| SessionError::DeviceUnavailable(format!("capture thread: {e}")))?;

        tokio::select! {
            biased;

            _ = stop.stopped() => {
                // Release is eventual: the detached thread sees the dropped
                // receiver once the open call returns and closes the stream.
                drop(shutdown_tx);
                log::info!("Microphone acquisition cancelled");
                Err(SessionError::Cancelled)
            }

            ready = ready_rx => match ready {
                Ok(Ok(sample_rate)) => Ok(MicSource {
                    sample_rate,
                    samples: sample_rx,
                    shutdown: Some(shutdown_tx),
                    thread: Some(thread),
                }),
                Ok(Err(err)) => {
                    // The thread has already given up on the device.
                    let _ = thread.join();
                    Err(err)
                }
                Err(_) => Err(SessionError::DeviceUnavailable(
                    "capture thread exited before the device opened".into(),
                )),
            },
        }
    }
}

impl SampleSource for MicSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn drain(&mut self, out: &mut Vec<f32>) -> SourceStatus {
        loop {
            match self.samples.try_recv() {
                Ok(chunk) => out.extend(chunk),
                Err(TryRecvError::Empty) => return SourceStatus::Active,
                Err(TryRecvError::Disconnected) => return SourceStatus::Exhausted,
            }
        }
    }

    fn cleanup(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Capture thread panicked during teardown");
            }
        }
    }
}

impl Drop for MicSource {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Body of the capture thread: open, report, wait for shutdown, release.
fn run_capture(
    settings: &CaptureSettings,
    sample_tx: SyncSender<Vec<f32>>,
    ready_tx: oneshot::Sender<Result<u32, SessionError>>,
    shutdown_rx: mpsc::Receiver<()>,
) {
    let (stream, sample_rate) = match open_stream(settings, sample_tx) {
        Ok(opened) => opened,
        Err(err) => {
            log::warn!("Could not open input device: {err}");
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    if let Err(err) = stream.play() {
        let _ = ready_tx.send(Err(map_play_error(err)));
        return;
    }

    if !report_ready(ready_tx, sample_rate) {
        drop(stream);
        log::info!("Microphone released after cancelled acquisition");
        return;
    }

    // Returns on an explicit shutdown or when the MicSource is gone.
    let _ = shutdown_rx.recv();

    if let Err(err) = stream.pause() {
        log::warn!("Failed to pause input stream: {err}");
    }
    drop(stream);
    log::info!("Microphone released");
}

/// Hand the opened rate to `acquire`. False when it has stopped waiting.
fn report_ready(ready_tx: oneshot::Sender<Result<u32, SessionError>>, sample_rate: u32) -> bool {
    if ready_tx.send(Ok(sample_rate)).is_err() {
        log::debug!("Acquisition abandoned at {sample_rate} Hz, releasing device");
        return false;
    }
    true
}

fn open_stream(
    settings: &CaptureSettings,
    tx: SyncSender<Vec<f32>>,
) -> Result<(Stream, u32), SessionError> {
    let host = cpal::default_host();
    let device = select_device(&host, &settings.device)?;
    let name = device.name().unwrap_or_else(|_| "<unknown>".into());

    let supported = choose_config(&device, settings.sample_rate)?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let format = supported.sample_format();
    let config: StreamConfig = supported.into();

    log::info!("Opening {name}: {channels}ch, {sample_rate} Hz, {format:?}");

    let on_error = |err: cpal::StreamError| log::warn!("Input stream error: {err}");

    // cpal hands us the raw device signal: no echo cancellation, gain control
    // or noise suppression sits between the microphone and the detector.
    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                forward(&tx, downmix(data, channels, |s| s));
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                forward(&tx, downmix(data, channels, |s| s as f32 / i16::MAX as f32));
            },
            on_error,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                forward(&tx, downmix(data, channels, |s| (s as f32 - 32768.0) / 32768.0));
            },
            on_error,
            None,
        ),
        other => {
            return Err(SessionError::DeviceUnavailable(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    }
    .map_err(map_build_error)?;

    Ok((stream, sample_rate))
}

fn select_device(host: &cpal::Host, wanted: &str) -> Result<cpal::Device, SessionError> {
    if wanted.is_empty() || wanted == "default" {
        return host
            .default_input_device()
            .ok_or_else(|| SessionError::DeviceUnavailable("no default input device".into()));
    }

    let mut devices = host
        .input_devices()
        .map_err(|e| SessionError::from_backend(e.to_string()))?;
    devices
        .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
        .ok_or_else(|| SessionError::DeviceUnavailable(format!("no input device named {wanted:?}")))
}

/// Prefer a mono config at the requested rate; otherwise take the device
/// default and down-mix.
fn choose_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<SupportedStreamConfig, SessionError> {
    let target = SampleRate(target_rate);

    if let Ok(ranges) = device.supported_input_configs() {
        let mut candidates: Vec<_> = ranges
            .filter(|r| r.min_sample_rate() <= target && r.max_sample_rate() >= target)
            .collect();
        candidates.sort_by_key(|r| (r.channels() != 1, r.sample_format() != SampleFormat::F32));
        if let Some(range) = candidates.into_iter().next() {
            return Ok(range.with_sample_rate(target));
        }
    }

    let fallback = device.default_input_config().map_err(|e| match e {
        DefaultStreamConfigError::BackendSpecific { err } => SessionError::from_backend(err.description),
        other => SessionError::DeviceUnavailable(other.to_string()),
    })?;
    log::warn!(
        "{} Hz not supported, using device default {} Hz",
        target_rate,
        fallback.sample_rate().0
    );
    Ok(fallback)
}

/// Keep the first channel of interleaved input, converted to f32.
fn downmix<T: Copy>(data: &[T], channels: usize, convert: impl Fn(T) -> f32) -> Vec<f32> {
    data.iter().step_by(channels.max(1)).map(|&s| convert(s)).collect()
}

fn forward(tx: &SyncSender<Vec<f32>>, chunk: Vec<f32>) {
    match tx.try_send(chunk) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(_)) => log::debug!("Analysis falling behind, dropped a chunk"),
    }
}

fn map_build_error(err: BuildStreamError) -> SessionError {
    match err {
        BuildStreamError::BackendSpecific { err } => SessionError::from_backend(err.description),
        other => SessionError::DeviceUnavailable(other.to_string()),
    }
}

fn map_play_error(err: PlayStreamError) -> SessionError {
    match err {
        PlayStreamError::BackendSpecific { err } => SessionError::from_backend(err.description),
        other => SessionError::DeviceUnavailable(other.to_string()),
    }
}
