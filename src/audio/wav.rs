//! PCM ↔ WAV framing.
//!
//! [`encode`] writes the canonical 44-byte RIFF header by hand so the layout
//! is byte-exact for any channel count:
//!
//! ```text
//! offset  size  field
//!      0     4  "RIFF"
//!      4     4  chunk size      = 36 + data size   (LE)
//!      8     4  "WAVE"
//!     12     4  "fmt "
//!     16     4  16                                 (LE)
//!     20     2  format          = 1 (PCM)          (LE)
//!     22     2  channels                           (LE)
//!     24     4  sample rate                        (LE)
//!     28     4  byte rate       = rate * ch * 2    (LE)
//!     32     2  block align     = ch * 2           (LE)
//!     34     2  bits per sample = 16               (LE)
//!     36     4  "data"
//!     40     4  data size                          (LE)
//!     44     …  PCM payload
//! ```
//!
//! [`decode`] goes through `hound`, which also accepts WAV files written by
//! other tools (e.g. LINEAR16 replies from the TTS endpoint).

use std::io::Cursor;

use thiserror::Error;

use super::buffer::{AudioBuffer, EncodedAudio};

/// Size of the canonical PCM WAV header.
pub const WAV_HEADER_LEN: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;

// ---------------------------------------------------------------------------
// EncodingError
// ---------------------------------------------------------------------------

/// Errors raised while framing or unframing audio.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodingError {
    /// The buffer holds no samples.
    #[error("audio buffer is empty")]
    Empty,

    /// Channel count or sample rate is zero.
    #[error("invalid audio format: {channels} channel(s) at {sample_rate} Hz")]
    InvalidFormat { channels: u16, sample_rate: u32 },

    /// The sample count is not a whole number of frames.
    #[error("{samples} samples do not divide into {channels}-channel frames")]
    PartialFrame { samples: usize, channels: u16 },

    /// The PCM payload does not fit the 32-bit RIFF size fields.
    #[error("audio payload too large for a WAV container ({0} bytes)")]
    TooLarge(usize),

    /// The byte stream is not a readable WAV file.
    #[error("malformed WAV data: {0}")]
    Malformed(String),

    /// The WAV file is valid but not 16-bit integer PCM.
    #[error("unsupported WAV format: {0}")]
    Unsupported(String),
}

// ---------------------------------------------------------------------------
// encode
// ---------------------------------------------------------------------------

/// Quantise `buffer` to 16-bit PCM and wrap it in a WAV container.
///
/// Each sample becomes `round(sample * 32767)` clamped to the `i16` range.
///
/// # Errors
///
/// - [`EncodingError::Empty`] when the buffer has no samples.
/// - [`EncodingError::InvalidFormat`] when channels or sample rate is zero.
/// - [`EncodingError::PartialFrame`] when the last frame is incomplete.
/// - [`EncodingError::TooLarge`] when the payload exceeds the RIFF limit.
pub fn encode(buffer: AudioBuffer) -> Result<EncodedAudio, EncodingError> {
    if buffer.is_empty() {
        return Err(EncodingError::Empty);
    }
    if buffer.channels == 0 || buffer.sample_rate == 0 {
        return Err(EncodingError::InvalidFormat {
            channels: buffer.channels,
            sample_rate: buffer.sample_rate,
        });
    }
    if buffer.samples.len() % usize::from(buffer.channels) != 0 {
        return Err(EncodingError::PartialFrame {
            samples: buffer.samples.len(),
            channels: buffer.channels,
        });
    }

    let data_len = buffer.samples.len() * usize::from(BYTES_PER_SAMPLE);
    let data_size = u32::try_from(data_len)
        .ok()
        .filter(|size| size.checked_add(36).is_some())
        .ok_or(EncodingError::TooLarge(data_len))?;

    let channels = buffer.channels;
    let sample_rate = buffer.sample_rate;
    let block_align = channels * BYTES_PER_SAMPLE;
    let byte_rate = sample_rate
        .checked_mul(u32::from(block_align))
        .ok_or(EncodingError::InvalidFormat {
            channels,
            sample_rate,
        })?;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len);

    // RIFF descriptor
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_size).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt sub-chunk
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data sub-chunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());
    for sample in &buffer.samples {
        out.extend_from_slice(&quantize(*sample).to_le_bytes());
    }

    log::trace!(
        "wav: encoded {} samples ({} ch @ {} Hz) into {} bytes",
        buffer.samples.len(),
        channels,
        sample_rate,
        out.len()
    );

    Ok(EncodedAudio::new(out, sample_rate))
}

/// `f32` in `[-1.0, 1.0]` → `i16`, rounding to nearest.
///
/// NaN maps to silence.
fn quantize(sample: f32) -> i16 {
    let scaled = (sample * f32::from(i16::MAX)).round();
    scaled.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

/// Parse a 16-bit PCM WAV file back into normalised samples.
///
/// Samples are scaled by `1 / 32767` so that `decode(encode(b))` reproduces
/// every sample of `b` to within one quantisation step.
///
/// # Errors
///
/// - [`EncodingError::Malformed`] when `hound` rejects the header or data.
/// - [`EncodingError::Unsupported`] for float or non-16-bit payloads.
/// - [`EncodingError::Empty`] when the data chunk holds no samples.
pub fn decode(bytes: &[u8]) -> Result<AudioBuffer, EncodingError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| EncodingError::Malformed(e.to_string()))?;

    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != BITS_PER_SAMPLE {
        return Err(EncodingError::Unsupported(format!(
            "{:?} at {} bits",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let scale = f32::from(i16::MAX);
    let samples = reader
        .into_samples::<i16>()
        .map(|s| s.map(|v| f32::from(v) / scale))
        .collect::<Result<Vec<f32>, _>>()
        .map_err(|e| EncodingError::Malformed(e.to_string()))?;

    if samples.is_empty() {
        return Err(EncodingError::Empty);
    }

    Ok(AudioBuffer::new(samples, spec.channels, spec.sample_rate))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    // ---- encode: header layout ---

    #[test]
    fn one_second_mono_at_44k1_has_expected_sizes() {
        let buf = AudioBuffer::mono(vec![0.25; 44_100], 44_100);
        let wav = encode(buf).unwrap();
        let bytes = wav.as_bytes();

        assert_eq!(bytes.len(), WAV_HEADER_LEN + 88_200);
        assert_eq!(u32_at(bytes, 40), 88_200, "data size");
        assert_eq!(u32_at(bytes, 4), 88_236, "chunk size");
    }

    #[test]
    fn header_fields_are_byte_exact() {
        let buf = AudioBuffer::new(vec![0.0; 8], 2, 16_000);
        let wav = encode(buf).unwrap();
        let b = wav.as_bytes();

        assert_eq!(&b[0..4], b"RIFF");
        assert_eq!(&b[8..12], b"WAVE");
        assert_eq!(&b[12..16], b"fmt ");
        assert_eq!(u32_at(b, 16), 16);
        assert_eq!(u16_at(b, 20), 1);
        assert_eq!(u16_at(b, 22), 2);
        assert_eq!(u32_at(b, 24), 16_000);
        assert_eq!(u32_at(b, 28), 64_000);
        assert_eq!(u16_at(b, 32), 4);
        assert_eq!(u16_at(b, 34), 16);
        assert_eq!(&b[36..40], b"data");
        assert_eq!(u32_at(b, 40), 16);
        assert_eq!(b.len(), 60);
    }

    #[test]
    fn samples_are_rounded_and_clamped() {
        let buf = AudioBuffer::mono(vec![1.0, -1.0, 2.0, -2.0, 0.5, 0.0], 8_000);
        let wav = encode(buf).unwrap();
        let pcm: Vec<i16> = wav.as_bytes()[WAV_HEADER_LEN..]
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();

        assert_eq!(pcm, vec![32767, -32767, 32767, -32768, 16384, 0]);
    }

    #[test]
    fn nan_encodes_as_silence() {
        let wav = encode(AudioBuffer::mono(vec![f32::NAN], 8_000)).unwrap();
        assert_eq!(&wav.as_bytes()[WAV_HEADER_LEN..], &[0, 0]);
    }

    // ---- encode: errors ---

    #[test]
    fn empty_buffer_is_rejected() {
        let err = encode(AudioBuffer::mono(Vec::new(), 44_100)).unwrap_err();
        assert_eq!(err, EncodingError::Empty);
    }

    #[test]
    fn zero_channels_is_rejected() {
        let err = encode(AudioBuffer::new(vec![0.1], 0, 44_100)).unwrap_err();
        assert!(matches!(err, EncodingError::InvalidFormat { channels: 0, .. }));
    }

    #[test]
    fn partial_last_frame_is_rejected() {
        let err = encode(AudioBuffer::new(vec![0.1, 0.2, 0.3], 2, 8_000)).unwrap_err();
        assert_eq!(
            err,
            EncodingError::PartialFrame {
                samples: 3,
                channels: 2
            }
        );

        // A whole number of frames survives the trip through the decoder.
        let wav = encode(AudioBuffer::new(vec![0.1, 0.2, 0.3, 0.4], 2, 8_000)).unwrap();
        let decoded = decode(wav.as_bytes()).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.samples.len(), 4);
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let err = encode(AudioBuffer::mono(vec![0.1], 0)).unwrap_err();
        assert!(matches!(
            err,
            EncodingError::InvalidFormat { sample_rate: 0, .. }
        ));
    }

    // ---- decode ---

    #[test]
    fn decode_restores_count_rate_and_values() {
        let original: Vec<f32> = (0..1_000).map(|i| ((i as f32) * 0.01).sin()).collect();
        let buf = AudioBuffer::new(original.clone(), 1, 22_050);
        let decoded = decode(encode(buf).unwrap().as_bytes()).unwrap();

        assert_eq!(decoded.samples.len(), original.len());
        assert_eq!(decoded.sample_rate, 22_050);
        assert_eq!(decoded.channels, 1);

        let lsb = 1.0 / 32767.0;
        for (a, b) in original.iter().zip(&decoded.samples) {
            assert!((a - b).abs() <= lsb, "{a} vs {b}");
        }
    }

    #[test]
    fn decode_keeps_stereo_layout() {
        let buf = AudioBuffer::new(vec![0.1, -0.1, 0.2, -0.2], 2, 48_000);
        let decoded = decode(encode(buf).unwrap().as_bytes()).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.frames(), 2);
    }

    #[test]
    fn decode_garbage_is_malformed() {
        let err = decode(b"definitely not a wav file").unwrap_err();
        assert!(matches!(err, EncodingError::Malformed(_)));
    }

    #[test]
    fn decode_header_only_is_empty() {
        let mut bytes = encode(AudioBuffer::mono(vec![0.0], 8_000))
            .unwrap()
            .into_bytes();
        bytes.truncate(WAV_HEADER_LEN);
        bytes[40..44].copy_from_slice(&0u32.to_le_bytes());
        bytes[4..8].copy_from_slice(&36u32.to_le_bytes());

        assert_eq!(decode(&bytes).unwrap_err(), EncodingError::Empty);
    }
}
