//! In-memory audio containers passed between pipeline stages.
//!
//! [`AudioBuffer`] holds normalised `f32` samples as produced by the capture
//! device or decoded from a synthesis reply.  [`EncodedAudio`] is the
//! immutable WAV byte container the codec produces for the STT endpoint.

use std::time::Duration;

use base64::Engine as _;

// ---------------------------------------------------------------------------
// AudioBuffer
// ---------------------------------------------------------------------------

/// Interleaved PCM samples in `[-1.0, 1.0]` plus their format.
///
/// A buffer is produced once (by the capture collaborator or a decoder) and
/// consumed once: [`crate::audio::wav::encode`] and
/// [`crate::audio::PlaybackSink::play`] both take it by value.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples, `channels` values per frame.
    pub samples: Vec<f32>,
    /// Number of interleaved channels (1 = mono).
    pub channels: u16,
    /// Frames per second.
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Mono convenience constructor.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }

    /// Average interleaved frames into a single channel.
    pub fn into_mono(self) -> AudioBuffer {
        if self.channels <= 1 {
            return self;
        }
        let n = usize::from(self.channels);
        let samples = self
            .samples
            .chunks(n)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        AudioBuffer::mono(samples, self.sample_rate)
    }

    /// Playback length derived from frame count and sample rate.
    ///
    /// Returns [`Duration::ZERO`] for a buffer with a zero sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }
}

// ---------------------------------------------------------------------------
// EncodedAudio
// ---------------------------------------------------------------------------

/// A complete WAV file (44-byte header + 16-bit PCM payload).
///
/// The inner bytes are private so a value can only be obtained from the
/// codec and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    bytes: Vec<u8>,
    sample_rate: u32,
}

impl EncodedAudio {
    pub(crate) fn new(bytes: Vec<u8>, sample_rate: u32) -> Self {
        Self { bytes, sample_rate }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Sample rate written into the `fmt ` sub-chunk.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Standard (padded) base64 text of the whole WAV file, as embedded in
    /// the STT request body.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_divides_by_channel_count() {
        let buf = AudioBuffer::new(vec![0.0; 960], 2, 48_000);
        assert_eq!(buf.frames(), 480);
    }

    #[test]
    fn zero_channels_has_no_frames() {
        let buf = AudioBuffer::new(vec![0.0; 10], 0, 16_000);
        assert_eq!(buf.frames(), 0);
    }

    #[test]
    fn into_mono_averages_stereo_frames() {
        let mono = AudioBuffer::new(vec![1.0, 0.0, 0.5, 0.5], 2, 8_000).into_mono();
        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples, vec![0.5, 0.5]);
        assert_eq!(mono.sample_rate, 8_000);
    }

    #[test]
    fn into_mono_keeps_mono_untouched() {
        let buf = AudioBuffer::mono(vec![0.1, 0.2], 8_000);
        assert_eq!(buf.clone().into_mono(), buf);
    }

    #[test]
    fn duration_of_one_second_mono() {
        let buf = AudioBuffer::mono(vec![0.0; 44_100], 44_100);
        assert_eq!(buf.duration(), Duration::from_secs(1));
    }

    #[test]
    fn duration_with_zero_rate_is_zero() {
        let buf = AudioBuffer::mono(vec![0.0; 100], 0);
        assert_eq!(buf.duration(), Duration::ZERO);
    }

    #[test]
    fn base64_uses_standard_alphabet_with_padding() {
        let enc = EncodedAudio::new(b"RIFF".to_vec(), 16_000);
        assert_eq!(enc.to_base64(), "UklGRg==");
        assert_eq!(enc.len(), 4);
        assert_eq!(enc.sample_rate(), 16_000);
    }
}
