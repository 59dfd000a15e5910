//! Chat-completion module.
//!
//! This module provides:
//! * [`ChatCompleter`]: async trait implemented by completion backends.
//! * [`ChatCompletionClient`]: OpenAI-compatible REST client.
//! * [`CompletionRequest`]: the `[system, user]` request body.
//! * [`CompletionError`]: error variants for the completion stage.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_coach::config::AppConfig;
//! use voice_coach::llm::{ChatCompleter, ChatCompletionClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let client = ChatCompletionClient::new(&config.credentials.openai_key, config.llm.clone());
//!
//!     let reply = client
//!         .complete("I goed to the park yesterday", &config.llm.system_prompt)
//!         .await
//!         .unwrap();
//!     println!("{}", reply.text);
//! }
//! ```

pub mod completion;
pub mod prompt;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use completion::{
    parse_chat_response, ChatCompleter, ChatCompletionClient, CompletionError, CompletionResult,
};
pub use prompt::{ChatMessage, CompletionRequest, Role};

#[cfg(test)]
pub use completion::MockCompleter;
