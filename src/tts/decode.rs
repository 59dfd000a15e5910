//! Decoding of synthesized audio payloads into playable clips.
//!
//! MP3 replies are decoded frame by frame with `minimp3` and folded to mono;
//! LINEAR16 replies arrive as a complete WAV file and go through the WAV
//! codec.

use std::io::Cursor;

use crate::audio::{wav, AudioBuffer, EncodingError};
use crate::config::SynthesisEncoding;

use super::client::SynthesisError;

/// Turns raw synthesis bytes into an [`AudioBuffer`] for the requested
/// encoding.
#[derive(Debug, Clone, Copy)]
pub struct ClipDecoder {
    encoding: SynthesisEncoding,
}

impl ClipDecoder {
    pub fn new(encoding: SynthesisEncoding) -> Self {
        Self { encoding }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer, SynthesisError> {
        if bytes.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        let clip = match self.encoding {
            SynthesisEncoding::Mp3 => decode_mp3(bytes)?,
            SynthesisEncoding::Linear16 => match wav::decode(bytes) {
                Ok(clip) => clip,
                Err(EncodingError::Empty) => return Err(SynthesisError::EmptyAudio),
                Err(e) => return Err(SynthesisError::Decode(e.to_string())),
            },
        };
        if clip.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(clip)
    }
}

fn decode_mp3(bytes: &[u8]) -> Result<AudioBuffer, SynthesisError> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = frame.sample_rate as u32;
                }
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|pair| {
                        let left = f32::from(pair[0]) / 32768.0;
                        let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                        (left + right) * 0.5
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(SynthesisError::Decode(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(SynthesisError::Decode("no MP3 frames found".into()));
    }
    Ok(AudioBuffer::mono(samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode;

    /// Twelve silent stereo MPEG-1 Layer III frames at 44.1 kHz.
    const SILENT_STEREO_MP3: &[u8] = include_bytes!("../../tests/fixtures/silence_stereo.mp3");

    #[test]
    fn stereo_mp3_is_folded_to_a_mono_clip() {
        let clip = ClipDecoder::new(SynthesisEncoding::Mp3)
            .decode(SILENT_STEREO_MP3)
            .unwrap();
        assert_eq!(clip.sample_rate, 44_100);
        assert_eq!(clip.channels, 1);
        assert!(clip.duration() > std::time::Duration::ZERO);
        // 1152 frames per MPEG-1 Layer III frame, one sample per frame.
        assert_eq!(clip.samples.len() % 1152, 0);
        assert!(clip.samples.iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn linear16_wav_is_decoded() {
        let wav = encode(AudioBuffer::mono(vec![0.5; 24_000], 24_000)).unwrap();
        let clip = ClipDecoder::new(SynthesisEncoding::Linear16)
            .decode(wav.as_bytes())
            .unwrap();
        assert_eq!(clip.sample_rate, 24_000);
        assert_eq!(clip.frames(), 24_000);
        assert_eq!(clip.duration(), std::time::Duration::from_secs(1));
    }

    #[test]
    fn header_only_wav_is_empty_audio() {
        let mut header = encode(AudioBuffer::mono(vec![0.0; 1], 16_000))
            .unwrap()
            .into_bytes();
        header.truncate(44);
        header[40..44].copy_from_slice(&0u32.to_le_bytes());
        header[4..8].copy_from_slice(&36u32.to_le_bytes());
        let err = ClipDecoder::new(SynthesisEncoding::Linear16)
            .decode(&header)
            .unwrap_err();
        assert_eq!(err, SynthesisError::EmptyAudio);
    }

    #[test]
    fn zero_bytes_are_empty_audio() {
        for encoding in [SynthesisEncoding::Mp3, SynthesisEncoding::Linear16] {
            assert_eq!(
                ClipDecoder::new(encoding).decode(&[]).unwrap_err(),
                SynthesisError::EmptyAudio
            );
        }
    }

    #[test]
    fn garbage_mp3_is_decode_error() {
        let err = ClipDecoder::new(SynthesisEncoding::Mp3)
            .decode(&[0x42; 512])
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Decode(_)));
    }

    #[test]
    fn garbage_wav_is_decode_error() {
        let err = ClipDecoder::new(SynthesisEncoding::Linear16)
            .decode(b"definitely not a RIFF file")
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Decode(_)));
    }
}
