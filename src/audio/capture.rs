//! Microphone capture.
//!
//! [`AudioSource`] is the two-call contract the orchestrator depends on:
//! `start_capture` arms the device, `stop_capture` disarms it and hands back
//! whatever was recorded (or `None` when nothing was).
//!
//! [`CpalCapture`] is the production implementation.  The `cpal::Stream` is
//! not `Send` on every platform, so it lives on a dedicated `audio-capture`
//! thread for the lifetime of the value; the callback only appends samples
//! while the recording flag is set.  Dropping the [`CpalCapture`] shuts the
//! thread down and stops the hardware stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::buffer::AudioBuffer;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("capture thread failed: {0}")]
    Thread(String),
}

// ---------------------------------------------------------------------------
// AudioSource trait
// ---------------------------------------------------------------------------

/// Platform capture primitive driven by the orchestrator.
pub trait AudioSource: Send + Sync {
    /// Begin recording, discarding anything left from a previous take.
    fn start_capture(&self) -> Result<(), CaptureError>;

    /// Stop recording and return the captured audio.
    ///
    /// Returns `None` when no device is available or nothing was recorded.
    fn stop_capture(&self) -> Option<AudioBuffer>;
}

// ---------------------------------------------------------------------------
// CpalCapture
// ---------------------------------------------------------------------------

struct Shared {
    recording: AtomicBool,
    samples: Mutex<Vec<f32>>,
    max_secs: usize,
}

/// Default-input-device capture built on `cpal`.
pub struct CpalCapture {
    shared: Arc<Shared>,
    sample_rate: u32,
    channels: u16,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalCapture {
    /// Open the default input device and start its stream (disarmed).
    ///
    /// `max_recording_secs` bounds the memory a single take may use; samples
    /// past the limit are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoDevice`] when no input device is available,
    /// or the `cpal` error that prevented the stream from starting.
    pub fn new(max_recording_secs: u32) -> Result<Self, CaptureError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16), CaptureError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        // The rate is only known once the device is opened, so the limit is
        // stored in seconds and scaled on the capture thread.
        let shared = Arc::new(Shared {
            recording: AtomicBool::new(false),
            samples: Mutex::new(Vec::new()),
            max_secs: max_recording_secs as usize,
        });
        let thread_shared = Arc::clone(&shared);

        let thread = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match open_stream(thread_shared) {
                    Ok((stream, rate, channels)) => {
                        let _ = ready_tx.send(Ok((rate, channels)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Park until the owner is dropped; the stream stays alive.
                let _ = shutdown_rx.recv();
                drop(stream);
                log::debug!("capture: stream closed");
            })
            .map_err(|e| CaptureError::Thread(e.to_string()))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|e| CaptureError::Thread(e.to_string()))??;

        log::info!("capture: input stream ready ({sample_rate} Hz, {channels} ch)");

        Ok(Self {
            shared,
            sample_rate,
            channels,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Native sample rate of the input device in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels delivered by the device.
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

fn open_stream(shared: Arc<Shared>) -> Result<(cpal::Stream, u32, u16), CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

    let supported = device.default_input_config()?;
    let channels = supported.channels();
    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    let limit = shared
        .max_secs
        .saturating_mul(sample_rate as usize)
        .saturating_mul(usize::from(channels));

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if !shared.recording.load(Ordering::Acquire) {
                return;
            }
            if let Ok(mut samples) = shared.samples.lock() {
                let room = limit.saturating_sub(samples.len());
                samples.extend_from_slice(&data[..data.len().min(room)]);
            }
        },
        |err: cpal::StreamError| {
            log::error!("cpal stream error: {err}");
        },
        None,
    )?;

    stream.play()?;
    Ok((stream, sample_rate, channels))
}

impl AudioSource for CpalCapture {
    fn start_capture(&self) -> Result<(), CaptureError> {
        if let Ok(mut samples) = self.shared.samples.lock() {
            samples.clear();
        }
        self.shared.recording.store(true, Ordering::Release);
        log::debug!("capture: armed");
        Ok(())
    }

    fn stop_capture(&self) -> Option<AudioBuffer> {
        self.shared.recording.store(false, Ordering::Release);
        let samples = match self.shared.samples.lock() {
            Ok(mut samples) => std::mem::take(&mut *samples),
            Err(e) => {
                log::error!("capture: sample buffer poisoned: {e}");
                return None;
            }
        };
        log::debug!("capture: disarmed with {} samples", samples.len());

        if samples.is_empty() {
            return None;
        }
        // The recognizer is sent a single channel.
        Some(AudioBuffer::new(samples, self.channels, self.sample_rate).into_mono())
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        drop(self.shutdown.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ---------------------------------------------------------------------------
// NoDeviceCapture
// ---------------------------------------------------------------------------

/// Stand-in used when no input device could be opened.
///
/// Arming always succeeds; stopping always yields `None`, which the
/// orchestrator reports as "no audio".
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDeviceCapture;

impl AudioSource for NoDeviceCapture {
    fn start_capture(&self) -> Result<(), CaptureError> {
        log::warn!("capture: no input device, recording will be empty");
        Ok(())
    }

    fn stop_capture(&self) -> Option<AudioBuffer> {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_device_capture_returns_none() {
        let capture = NoDeviceCapture;
        capture.start_capture().unwrap();
        assert!(capture.stop_capture().is_none());
    }

    #[test]
    fn audio_source_is_object_safe() {
        let source: Box<dyn AudioSource> = Box::new(NoDeviceCapture);
        assert!(source.stop_capture().is_none());
    }

    #[test]
    fn audio_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioBuffer>();
    }
}
