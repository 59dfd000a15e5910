//! Speech-to-text client trait and the Google Cloud implementation.
//!
//! [`Transcriber`] is the seam the orchestrator depends on.  It is
//! object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn Transcriber>`.
//!
//! [`GoogleSpeechClient`] posts the base64 WAV to `v1/speech:recognize` and
//! hands the reply body to [`parse_recognize_response`].  It never retries;
//! retry policy belongs to the caller.

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::EncodedAudio;
use crate::config::SttConfig;
use crate::stt::transcribe::{
    parse_recognize_response, RecognitionAudio, RecognitionConfig, RecognizeRequest,
    TranscriptResult,
};

// ---------------------------------------------------------------------------
// TranscriptionError
// ---------------------------------------------------------------------------

/// Errors that can arise from the STT stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranscriptionError {
    /// Transport failure or non-success HTTP status.
    #[error("speech recognition request failed: {reason}")]
    Network { reason: String, status: Option<u16> },

    /// The request did not complete within the deadline.
    #[error("speech recognition timed out")]
    Timeout,

    /// Nothing intelligible was recognised (or the reply was unusable).
    #[error("speech recognition returned no results")]
    NoResult,
}

impl From<reqwest::Error> for TranscriptionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TranscriptionError::Timeout
        } else {
            TranscriptionError::Network {
                reason: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Async interface for speech-to-text backends.
///
/// `audio` is consumed: the client owns the WAV bytes for the duration of
/// the call and drops them afterwards.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: EncodedAudio,
        sample_rate: u32,
        language_hint: &str,
    ) -> Result<TranscriptResult, TranscriptionError>;
}

// ---------------------------------------------------------------------------
// GoogleSpeechClient
// ---------------------------------------------------------------------------

/// Calls the Google Cloud Speech-to-Text `recognize` REST method.
pub struct GoogleSpeechClient {
    client: reqwest::Client,
    api_key: String,
    config: SttConfig,
}

impl GoogleSpeechClient {
    pub fn new(api_key: impl Into<String>, config: SttConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), api_key, config)
    }

    /// Build on an existing `reqwest::Client` (shared pool, custom proxy or
    /// timeout settings).
    pub fn with_http_client(
        client: reqwest::Client,
        api_key: impl Into<String>,
        config: SttConfig,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            config,
        }
    }

    fn build_request(
        &self,
        audio: &EncodedAudio,
        sample_rate: u32,
        language_hint: &str,
    ) -> RecognizeRequest {
        let language_code = if language_hint.trim().is_empty() {
            self.config.language_code.clone()
        } else {
            language_hint.to_string()
        };

        RecognizeRequest {
            config: RecognitionConfig {
                encoding: "LINEAR16",
                sample_rate_hertz: sample_rate,
                language_code,
                model: self.config.model.clone(),
                use_enhanced: self.config.use_enhanced,
                enable_automatic_punctuation: self.config.enable_automatic_punctuation,
            },
            audio: RecognitionAudio {
                content: audio.to_base64(),
            },
        }
    }
}

#[async_trait]
impl Transcriber for GoogleSpeechClient {
    async fn transcribe(
        &self,
        audio: EncodedAudio,
        sample_rate: u32,
        language_hint: &str,
    ) -> Result<TranscriptResult, TranscriptionError> {
        log::debug!("stt: sending {} bytes of WAV at {sample_rate} Hz", audio.len());

        let body = self.build_request(&audio, sample_rate, language_hint);
        drop(audio);

        let url = format!(
            "{}/v1/speech:recognize",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                log::error!("stt: request failed: {e}");
                TranscriptionError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log::error!("stt: API error {status}: {text}");
            return Err(TranscriptionError::Network {
                reason: format!("HTTP {status}"),
                status: Some(status.as_u16()),
            });
        }

        let text = response.text().await?;
        log::trace!("stt: reply body {text}");

        let result = parse_recognize_response(&text)?;
        log::info!("stt: transcript ready ({} chars)", result.text.len());
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// MockTranscriber  (test-only)
// ---------------------------------------------------------------------------

/// A test double that returns a pre-configured response without any
/// network traffic and records how often it was called.
#[cfg(test)]
pub struct MockTranscriber {
    response: Result<TranscriptResult, TranscriptionError>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockTranscriber {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(TranscriptResult {
                text: text.into(),
                confidence: Some(0.9),
            }),
            calls: Default::default(),
        }
    }

    pub fn err(error: TranscriptionError) -> Self {
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
impl Transcriber for MockTranscriber {
    async fn transcribe(
        &self,
        _audio: EncodedAudio,
        _sample_rate: u32,
        _language_hint: &str,
    ) -> Result<TranscriptResult, TranscriptionError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{encode, AudioBuffer};
    use crate::test_support::{closed_base_url, http_client, json_body, serve_once};

    fn wav() -> EncodedAudio {
        encode(AudioBuffer::mono(vec![0.0; 160], 16_000)).unwrap()
    }

    fn client(base_url: String) -> GoogleSpeechClient {
        let config = SttConfig {
            base_url,
            ..SttConfig::default()
        };
        GoogleSpeechClient::with_http_client(http_client(), "test-key", config)
    }

    #[tokio::test]
    async fn posts_recognize_request_and_parses_reply() {
        let server = serve_once(
            200,
            r#"{"results":[{"alternatives":[{"transcript":"hello world","confidence":0.9}]}]}"#,
        )
        .await;
        let audio = wav();
        let expected_content = audio.to_base64();

        let result = client(server.base_url.clone())
            .transcribe(audio, 16_000, "en-GB")
            .await
            .unwrap();
        assert_eq!(result.text, "hello world");

        let raw = server.request().await;
        assert!(raw.starts_with("POST /v1/speech:recognize?key=test-key "));
        assert!(raw.to_ascii_lowercase().contains("content-type: application/json"));

        let body = json_body(&raw);
        assert_eq!(body["config"]["encoding"], "LINEAR16");
        assert_eq!(body["config"]["sampleRateHertz"], 16_000);
        assert_eq!(body["config"]["languageCode"], "en-GB");
        assert_eq!(body["config"]["model"], "default");
        assert_eq!(body["config"]["useEnhanced"], true);
        assert_eq!(body["config"]["enableAutomaticPunctuation"], true);
        assert_eq!(body["audio"]["content"], expected_content);
    }

    #[tokio::test]
    async fn blank_language_hint_uses_configured_language() {
        let server = serve_once(200, r#"{"results":[{"alternatives":[{"transcript":"hi"}]}]}"#).await;
        client(server.base_url.clone())
            .transcribe(wav(), 16_000, "")
            .await
            .unwrap();
        let body = json_body(&server.request().await);
        assert_eq!(body["config"]["languageCode"], "en-US");
    }

    #[tokio::test]
    async fn empty_reply_is_no_result() {
        let server = serve_once(200, "{}").await;
        let err = client(server.base_url.clone())
            .transcribe(wav(), 16_000, "en-US")
            .await
            .unwrap_err();
        assert_eq!(err, TranscriptionError::NoResult);
    }

    #[tokio::test]
    async fn http_error_status_is_network_error() {
        let server = serve_once(403, r#"{"error":{"code":403}}"#).await;
        let err = client(server.base_url.clone())
            .transcribe(wav(), 16_000, "en-US")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranscriptionError::Network {
                status: Some(403),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let err = client(closed_base_url().await)
            .transcribe(wav(), 16_000, "en-US")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranscriptionError::Network { status: None, .. }
        ));
    }

    #[test]
    fn transcriber_is_object_safe() {
        let t: Box<dyn Transcriber> = Box::new(MockTranscriber::ok("ok"));
        drop(t);
    }
}
