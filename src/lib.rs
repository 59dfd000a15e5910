//! Voice conversation coach: speak (or type) a sentence, have it
//! transcribed, answered by a chat model and read back aloud.
//!
//! The crate is organised bottom-up:
//!
//! * [`audio`]: capture, WAV framing and playback.
//! * [`stt`], [`llm`], [`tts`]: one HTTP client per remote service.
//! * [`events`]: the notification bus observers subscribe to.
//! * [`pipeline`]: the orchestrator sequencing one conversational turn.
//! * [`config`]: TOML settings.

pub mod audio;
pub mod config;
pub mod events;
pub mod llm;
pub mod pipeline;
pub mod stt;
pub mod tts;

#[cfg(test)]
mod test_support;
