//! STT (speech-to-text) client module.
//!
//! # Architecture
//!
//! ```text
//! EncodedAudio ──▶ Transcriber::transcribe ──▶ POST v1/speech:recognize
//!                                                   │
//!                         parse_recognize_response ◀┘
//!                           ├─ results[].alternatives[0].transcript
//!                           └─ fallback: scan raw text for "transcript"
//! ```
//!
//! An empty recognised string is reported as
//! [`TranscriptionError::NoResult`]; the pipeline never forwards blank text
//! to the completion stage.

pub mod client;
pub mod transcribe;

pub use client::{GoogleSpeechClient, Transcriber, TranscriptionError};
pub use transcribe::{parse_recognize_response, RecognizeRequest, TranscriptResult};

#[cfg(test)]
pub use client::MockTranscriber;
