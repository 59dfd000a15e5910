//! Core `ChatCompleter` trait and `ChatCompletionClient` implementation.
//!
//! `ChatCompletionClient` calls an OpenAI-compatible `/v1/chat/completions`
//! endpoint with bearer authorization.  Connection details come from
//! [`LlmConfig`]; the key is supplied separately so it can be overridden
//! from the command line or environment.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::llm::prompt::CompletionRequest;

// ---------------------------------------------------------------------------
// CompletionError
// ---------------------------------------------------------------------------

/// Errors that can occur during the completion stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompletionError {
    /// HTTP transport failure or non-success status.
    #[error("completion request failed: {reason}")]
    Network { reason: String, status: Option<u16> },

    /// The request did not complete within the deadline.
    #[error("completion request timed out")]
    Timeout,

    /// The reply had no usable `choices[0].message.content`.
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CompletionError::Timeout
        } else {
            CompletionError::Network {
                reason: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            }
        }
    }
}

/// Text of the model's reply.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub text: String,
}

// ---------------------------------------------------------------------------
// ChatCompleter trait
// ---------------------------------------------------------------------------

/// Async trait for chat-completion backends.
///
/// Implementors must be `Send + Sync` so they can be shared across tasks
/// (e.g. wrapped in `Arc<dyn ChatCompleter>`).
///
/// # Arguments
/// * `utterance`     – The user's turn, usually a transcript.
/// * `system_prompt` – Instruction sent as the system turn.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(
        &self,
        utterance: &str,
        system_prompt: &str,
    ) -> Result<CompletionResult, CompletionError>;
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Extract `choices[0].message.content` from a chat-completion reply.
///
/// The content is trimmed; a blank reply is treated the same as a missing
/// one since there would be nothing to speak.
pub fn parse_chat_response(body: &str) -> Result<CompletionResult, CompletionError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let first = response
        .choices
        .and_then(|choices| choices.into_iter().next())
        .ok_or_else(|| CompletionError::MalformedResponse("no choices".into()))?;

    let text = first
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| CompletionError::MalformedResponse("first choice has no content".into()))?
        .trim()
        .to_string();

    if text.is_empty() {
        return Err(CompletionError::MalformedResponse("empty content".into()));
    }
    Ok(CompletionResult { text })
}

// ---------------------------------------------------------------------------
// ChatCompletionClient
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct ChatCompletionClient {
    client: reqwest::Client,
    api_key: String,
    config: LlmConfig,
}

impl ChatCompletionClient {
    pub fn new(api_key: impl Into<String>, config: LlmConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), api_key, config)
    }

    pub fn with_http_client(
        client: reqwest::Client,
        api_key: impl Into<String>,
        config: LlmConfig,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            config,
        }
    }
}

#[async_trait]
impl ChatCompleter for ChatCompletionClient {
    async fn complete(
        &self,
        utterance: &str,
        system_prompt: &str,
    ) -> Result<CompletionResult, CompletionError> {
        let body = CompletionRequest::new(self.config.model.as_str(), system_prompt, utterance)
            .with_temperature(self.config.temperature);

        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        log::debug!("llm: POST {url} (model {})", self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                log::error!("llm: request failed: {e}");
                CompletionError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log::error!("llm: API error {status}: {text}");
            return Err(CompletionError::Network {
                reason: format!("HTTP {status}"),
                status: Some(status.as_u16()),
            });
        }

        let text = response.text().await?;
        let result = parse_chat_response(&text).map_err(|e| {
            log::warn!("llm: {e}");
            e
        })?;
        log::info!("llm: reply ready ({} chars)", result.text.len());
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// MockCompleter  (test-only)
// ---------------------------------------------------------------------------

/// Test double that replies with a fixed result and records the last
/// `(utterance, system_prompt)` pair it was given.
#[cfg(test)]
pub struct MockCompleter {
    response: Result<CompletionResult, CompletionError>,
    last_call: std::sync::Mutex<Option<(String, String)>>,
}

#[cfg(test)]
impl MockCompleter {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(CompletionResult { text: text.into() }),
            last_call: Default::default(),
        }
    }

    pub fn err(error: CompletionError) -> Self {
        Self {
            response: Err(error),
            last_call: Default::default(),
        }
    }

    pub fn last_call(&self) -> Option<(String, String)> {
        self.last_call.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ChatCompleter for MockCompleter {
    async fn complete(
        &self,
        utterance: &str,
        system_prompt: &str,
    ) -> Result<CompletionResult, CompletionError> {
        *self.last_call.lock().unwrap() = Some((utterance.into(), system_prompt.into()));
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{closed_base_url, http_client, json_body, serve_once};

    fn client(base_url: String) -> ChatCompletionClient {
        let config = LlmConfig {
            base_url,
            ..LlmConfig::default()
        };
        ChatCompletionClient::with_http_client(http_client(), "sk-test", config)
    }

    // ---- parse_chat_response ---

    #[test]
    fn parses_first_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":" Nice try! \n"}},{"message":{"content":"other"}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap().text, "Nice try!");
    }

    #[test]
    fn empty_choices_is_malformed() {
        assert!(matches!(
            parse_chat_response(r#"{"choices":[]}"#),
            Err(CompletionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn missing_choices_is_malformed() {
        assert!(matches!(
            parse_chat_response(r#"{"id":"x"}"#),
            Err(CompletionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn choice_without_content_is_malformed() {
        for body in [
            r#"{"choices":[{}]}"#,
            r#"{"choices":[{"message":{"role":"assistant"}}]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[{"message":{"content":"   "}}]}"#,
        ] {
            assert!(
                matches!(
                    parse_chat_response(body),
                    Err(CompletionError::MalformedResponse(_))
                ),
                "{body}"
            );
        }
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            parse_chat_response("not json"),
            Err(CompletionError::MalformedResponse(_))
        ));
    }

    // ---- HTTP ---

    #[tokio::test]
    async fn posts_two_message_request_with_bearer_auth() {
        let server = serve_once(
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"You should say 'went'."}}]}"#,
        )
        .await;

        let result = client(server.base_url.clone())
            .complete("I goed home", "Be a coach.")
            .await
            .unwrap();
        assert_eq!(result.text, "You should say 'went'.");

        let raw = server.request().await;
        assert!(raw.starts_with("POST /v1/chat/completions "));
        assert!(raw
            .to_ascii_lowercase()
            .contains("authorization: bearer sk-test"));

        let body = json_body(&raw);
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Be a coach.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "I goed home");
        assert!(body.get("temperature").is_none());
    }

    #[tokio::test]
    async fn empty_choices_reply_is_malformed() {
        let server = serve_once(200, r#"{"choices":[]}"#).await;
        let err = client(server.base_url.clone())
            .complete("hi", "sys")
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn http_error_status_is_network_error() {
        let server = serve_once(401, r#"{"error":{"message":"bad key"}}"#).await;
        let err = client(server.base_url.clone())
            .complete("hi", "sys")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CompletionError::Network {
                reason: "HTTP 401 Unauthorized".into(),
                status: Some(401),
            }
        );
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let err = client(closed_base_url().await)
            .complete("hi", "sys")
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Network { status: None, .. }));
    }

    /// Verify that `ChatCompletionClient` is object-safe (usable as `dyn ChatCompleter`).
    #[test]
    fn completer_is_object_safe() {
        let completer: Box<dyn ChatCompleter> =
            Box::new(ChatCompletionClient::new("k", LlmConfig::default()));
        drop(completer);
    }
}
