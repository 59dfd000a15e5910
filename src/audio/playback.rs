//! Speaker playback.
//!
//! [`PlaybackSink`] resolves once a clip has finished playing (or was
//! stopped).  Two implementations ship with the crate:
//!
//! * [`CpalPlayback`] plays through the default output device.
//! * [`TimedPlayback`] plays nothing and simply waits for the clip's
//!   duration, for headless runs or hosts without an output device.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use thiserror::Error;

use super::buffer::AudioBuffer;

/// Poll interval while waiting for a clip to drain.
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Grace period added to the clip length before giving up on the device.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no output device available")]
    NoDevice,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("playback task failed: {0}")]
    Task(String),
}

// ---------------------------------------------------------------------------
// PlaybackSink trait
// ---------------------------------------------------------------------------

/// Destination for synthesised speech.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Play `clip` and resolve when it has finished or was stopped.
    async fn play(&self, clip: AudioBuffer) -> Result<(), PlaybackError>;

    /// Abort the clip currently playing, if any.
    fn stop(&self) {}
}

// ---------------------------------------------------------------------------
// CpalPlayback
// ---------------------------------------------------------------------------

/// Plays clips on the default output device via `cpal`.
///
/// The stream is built per clip on the blocking pool and torn down as soon
/// as the clip drains, so no `cpal` handle outlives a call.
pub struct CpalPlayback {
    stop: Arc<AtomicBool>,
}

impl CpalPlayback {
    /// Verify an output device exists.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::NoDevice`] when the default host has none.
    pub fn new() -> Result<Self, PlaybackError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(PlaybackError::NoDevice)?;
        log::info!(
            "playback: using output device {}",
            device.name().unwrap_or_default()
        );
        Ok(Self {
            stop: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl PlaybackSink for CpalPlayback {
    async fn play(&self, clip: AudioBuffer) -> Result<(), PlaybackError> {
        if clip.is_empty() {
            return Ok(());
        }
        // A stop() that lands before the stream starts must still end this
        // clip, so the flag is only cleared once the clip is over.
        let stop = Arc::clone(&self.stop);

        tokio::task::spawn_blocking(move || {
            let _reset = StopReset(&stop);
            play_blocking(clip, &stop)
        })
            .await
            .map_err(|e| PlaybackError::Task(e.to_string()))?
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn play_blocking(clip: AudioBuffer, stop: &AtomicBool) -> Result<(), PlaybackError> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or(PlaybackError::NoDevice)?;

    let wanted = SampleRate(clip.sample_rate);
    let matching = device
        .supported_output_configs()
        .map_err(|e| PlaybackError::Device(e.to_string()))?
        .filter(|c| c.channels() <= 2)
        .find(|c| c.min_sample_rate() <= wanted && c.max_sample_rate() >= wanted)
        .map(|c| c.with_sample_rate(wanted));

    let supported = match matching {
        Some(config) => config,
        None => device
            .default_output_config()
            .map_err(|e| PlaybackError::Device(e.to_string()))?,
    };
    let config: cpal::StreamConfig = supported.config();
    let out_channels = usize::from(config.channels.max(1));

    let source_rate = clip.sample_rate;
    let mono = clip.into_mono().samples;
    let samples = Arc::new(if config.sample_rate.0 == source_rate {
        mono
    } else {
        resample_linear(&mono, source_rate, config.sample_rate.0)
    });
    let total = samples.len();

    let position = Arc::new(AtomicUsize::new(0));
    let cb_samples = Arc::clone(&samples);
    let cb_position = Arc::clone(&position);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = cb_position.load(Ordering::Acquire);
                for frame in data.chunks_mut(out_channels) {
                    let sample = cb_samples.get(pos).copied().unwrap_or(0.0);
                    frame.fill(sample);
                    if pos < cb_samples.len() {
                        pos += 1;
                    }
                }
                cb_position.store(pos, Ordering::Release);
            },
            |err| {
                log::error!("playback stream error: {err}");
            },
            None,
        )
        .map_err(|e| PlaybackError::Device(e.to_string()))?;

    stream
        .play()
        .map_err(|e| PlaybackError::Device(e.to_string()))?;

    let budget = Duration::from_secs_f64(total as f64 / f64::from(config.sample_rate.0.max(1)))
        + DRAIN_GRACE;
    match wait_for_drain(&position, total, budget, stop) {
        Drain::Finished => {}
        Drain::Stopped => log::debug!("playback: stopped early"),
        Drain::TimedOut => log::warn!("playback: device did not drain clip in time"),
    }

    drop(stream);
    log::debug!("playback: {total} samples done");
    Ok(())
}

/// Clears the stop flag when the clip it guards is over, however it ended.
struct StopReset<'a>(&'a AtomicBool);

impl Drop for StopReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Drain {
    Finished,
    Stopped,
    TimedOut,
}

fn wait_for_drain(
    position: &AtomicUsize,
    total: usize,
    budget: Duration,
    stop: &AtomicBool,
) -> Drain {
    let start = Instant::now();
    loop {
        if stop.load(Ordering::Acquire) {
            return Drain::Stopped;
        }
        if position.load(Ordering::Acquire) >= total {
            return Drain::Finished;
        }
        if start.elapsed() > budget {
            return Drain::TimedOut;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Linear-interpolation resampler for devices that reject the clip's rate.
fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if samples.is_empty() || from == 0 || to == 0 || from == to {
        return samples.to_vec();
    }
    let ratio = f64::from(from) / f64::from(to);
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let src = i as f64 * ratio;
            let idx = (src.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (src - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}

// ---------------------------------------------------------------------------
// TimedPlayback
// ---------------------------------------------------------------------------

/// Sink that waits out the clip's duration without producing sound.
#[derive(Debug, Default)]
pub struct TimedPlayback {
    stop: tokio::sync::Notify,
}

impl TimedPlayback {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlaybackSink for TimedPlayback {
    async fn play(&self, clip: AudioBuffer) -> Result<(), PlaybackError> {
        let duration = clip.duration();
        log::debug!("playback: timed wait of {duration:?}");
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.stop.notified() => log::debug!("playback: timed wait stopped"),
        }
        Ok(())
    }

    fn stop(&self) {
        self.stop.notify_waiters();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
