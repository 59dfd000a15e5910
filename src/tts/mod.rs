//! TTS (text-to-speech) client module.
//!
//! ```text
//! reply text ──▶ SpeechSynthesizer::synthesize ──▶ POST v1/text:synthesize
//!                                                       │ {audioContent}
//!                        base64 ──▶ ClipDecoder ◀───────┘
//!                                     ├─ MP3 (minimp3, folded to mono)
//!                                     └─ LINEAR16 (WAV codec)
//! ```

pub mod client;
pub mod decode;

pub use client::{
    GoogleTtsClient, SpeechSynthesizer, SynthesisError, SynthesisResult, VoiceConfig,
};
pub use decode::ClipDecoder;

#[cfg(test)]
pub use client::MockSynthesizer;
