//! Audio plumbing: capture → WAV framing → (network) → decoded clip → speaker.
//!
//! # Pipeline
//!
//! ```text
//! AudioSource::stop_capture ─▶ AudioBuffer ─▶ wav::encode ─▶ EncodedAudio ─▶ STT
//! TTS reply ─▶ ClipDecoder ─▶ AudioBuffer ─▶ PlaybackSink::play
//! ```
//!
//! Only PCM ↔ WAV framing is implemented here; compressed synthesis replies
//! are decoded in [`crate::tts`].

pub mod buffer;
pub mod capture;
pub mod playback;
pub mod wav;

pub use buffer::{AudioBuffer, EncodedAudio};
pub use capture::{AudioSource, CaptureError, CpalCapture, NoDeviceCapture};
pub use playback::{CpalPlayback, PlaybackError, PlaybackSink, TimedPlayback};
pub use wav::{decode, encode, EncodingError, WAV_HEADER_LEN};
