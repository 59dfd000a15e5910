//! Text-to-speech client trait and the Google Cloud implementation.
//!
//! [`GoogleTtsClient`] validates its credential before any network traffic,
//! posts to `v1/text:synthesize`, base64-decodes `audioContent` and hands
//! the bytes to a [`ClipDecoder`].  Playback is not started here; the
//! decoded clip is returned for the orchestrator to dispatch.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::AudioBuffer;
use crate::config::{is_placeholder_key, SynthesisEncoding, TtsConfig};
use crate::tts::decode::ClipDecoder;

// ---------------------------------------------------------------------------
// SynthesisError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    /// The API key is missing or still a placeholder.  No request was sent.
    #[error("text-to-speech credential is missing or a placeholder")]
    InvalidCredential,

    #[error("speech synthesis request failed: {reason}")]
    Network { reason: String, status: Option<u16> },

    #[error("speech synthesis timed out")]
    Timeout,

    /// The reply decoded to zero bytes (or zero samples).
    #[error("speech synthesis returned no audio")]
    EmptyAudio,

    #[error("could not decode synthesized audio: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SynthesisError::Timeout
        } else {
            SynthesisError::Network {
                reason: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// VoiceConfig / SynthesisResult
// ---------------------------------------------------------------------------

/// Voice selection and output encoding for one synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub language_code: String,
    pub name: String,
    pub audio_encoding: SynthesisEncoding,
}

impl From<&TtsConfig> for VoiceConfig {
    fn from(config: &TtsConfig) -> Self {
        Self {
            language_code: config.language_code.clone(),
            name: config.voice_name.clone(),
            audio_encoding: config.audio_encoding,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self::from(&TtsConfig::default())
    }
}

/// A decoded, playable clip.  Ownership passes to the playback sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    pub clip: AudioBuffer,
    pub duration: Duration,
}

impl SynthesisResult {
    pub fn new(clip: AudioBuffer) -> Self {
        let duration = clip.duration();
        Self { clip, duration }
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: OutputConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputConfig {
    audio_encoding: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

// ---------------------------------------------------------------------------
// SpeechSynthesizer trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<SynthesisResult, SynthesisError>;
}

// ---------------------------------------------------------------------------
// GoogleTtsClient
// ---------------------------------------------------------------------------

pub struct GoogleTtsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleTtsClient {
    pub fn new(api_key: impl Into<String>, config: &TtsConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), api_key, config)
    }

    pub fn with_http_client(
        client: reqwest::Client,
        api_key: impl Into<String>,
        config: &TtsConfig,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTtsClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<SynthesisResult, SynthesisError> {
        if is_placeholder_key(&self.api_key) {
            log::error!("tts: no usable API key configured");
            return Err(SynthesisError::InvalidCredential);
        }

        let body = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &voice.language_code,
                name: &voice.name,
            },
            audio_config: OutputConfig {
                audio_encoding: voice.audio_encoding.as_str(),
            },
        };

        let url = format!("{}/v1/text:synthesize", self.base_url);
        log::debug!("tts: synthesizing {} chars with {}", text.len(), voice.name);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                log::error!("tts: request failed: {e}");
                SynthesisError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log::error!("tts: API error {status}: {text}");
            return Err(SynthesisError::Network {
                reason: format!("HTTP {status}"),
                status: Some(status.as_u16()),
            });
        }

        let reply: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::Decode(format!("invalid reply: {e}")))?;

        let bytes = STANDARD
            .decode(reply.audio_content.trim())
            .map_err(|e| SynthesisError::Decode(format!("invalid base64: {e}")))?;
        if bytes.is_empty() {
            log::warn!("tts: reply carried no audio");
            return Err(SynthesisError::EmptyAudio);
        }

        let clip = ClipDecoder::new(voice.audio_encoding).decode(&bytes)?;
        let result = SynthesisResult::new(clip);
        log::info!("tts: clip ready ({:.2}s)", result.duration.as_secs_f32());
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// MockSynthesizer  (test-only)
// ---------------------------------------------------------------------------

/// Returns a silent clip of fixed length, or a configured error.
#[cfg(test)]
pub struct MockSynthesizer {
    response: Result<SynthesisResult, SynthesisError>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSynthesizer {
    pub fn ok(duration: Duration) -> Self {
        let rate = 8_000;
        let frames = (duration.as_secs_f64() * f64::from(rate)) as usize;
        Self {
            response: Ok(SynthesisResult::new(AudioBuffer::mono(vec![0.0; frames], rate))),
            calls: Default::default(),
        }
    }

    pub fn err(error: SynthesisError) -> Self {
        Self {
            response: Err(error),
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(
        &self,
        _text: &str,
        _voice: &VoiceConfig,
    ) -> Result<SynthesisResult, SynthesisError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
