//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it wants to override.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

/// Prefix used by the sample config for keys that were never filled in.
const PLACEHOLDER_PREFIX: &str = "YOUR_";

/// Default instruction sent as the system turn of every completion request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an English language coach. Engage in a friendly \
conversation, correct the user's mistakes, and provide constructive feedback to help improve \
their spoken English.";

/// `true` when `key` is empty or still a `YOUR_…` placeholder.
pub fn is_placeholder_key(key: &str) -> bool {
    let key = key.trim();
    key.is_empty() || key.starts_with(PLACEHOLDER_PREFIX)
}

// ---------------------------------------------------------------------------
// CredentialsConfig
// ---------------------------------------------------------------------------

/// API keys.  Never hard-coded; filled from `settings.toml`, the CLI or the
/// environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Google Cloud key shared by the Speech-to-Text and Text-to-Speech APIs.
    pub google_cloud_key: String,
    /// Bearer token for the chat-completion endpoint.
    pub openai_key: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            google_cloud_key: "YOUR_GOOGLE_CLOUD_KEY".into(),
            openai_key: "YOUR_OPENAI_KEY".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the speech-to-text endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Scheme + host of the recognizer (`/v1/speech:recognize` is appended).
    pub base_url: String,
    /// BCP-47 language hint (e.g. `"en-US"`).
    pub language_code: String,
    /// Recognition model name.
    pub model: String,
    pub use_enhanced: bool,
    pub enable_automatic_punctuation: bool,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: "https://speech.googleapis.com".into(),
            language_code: "en-US".into(),
            model: "default".into(),
            use_enhanced: true,
            enable_automatic_punctuation: true,
        }
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Settings for the chat-completion step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (`/v1/chat/completions` is
    /// appended).
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// System turn prepended to the user's utterance.
    pub system_prompt: String,
    /// Sampling temperature; omitted from the request when `None`.
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            model: "gpt-3.5-turbo".into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            temperature: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TtsConfig
// ---------------------------------------------------------------------------

/// Audio container requested from the synthesis endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SynthesisEncoding {
    Mp3,
    /// 16-bit PCM in a WAV container.
    #[serde(rename = "LINEAR16")]
    Linear16,
}

impl SynthesisEncoding {
    /// Name used on the wire (`audioConfig.audioEncoding`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp3 => "MP3",
            Self::Linear16 => "LINEAR16",
        }
    }
}

impl Default for SynthesisEncoding {
    fn default() -> Self {
        Self::Mp3
    }
}

/// Settings for the text-to-speech endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Scheme + host of the synthesizer (`/v1/text:synthesize` is appended).
    pub base_url: String,
    pub language_code: String,
    pub voice_name: String,
    pub audio_encoding: SynthesisEncoding,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://texttospeech.googleapis.com".into(),
            language_code: "en-US".into(),
            voice_name: "en-US-Wavenet-D".into(),
            audio_encoding: SynthesisEncoding::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Longest take kept in memory; later samples are dropped.
    pub max_recording_secs: u32,
    /// Write every take to `AppPaths::last_recording_file` after stopping.
    pub save_last_recording: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_recording_secs: 3599,
            save_last_recording: false,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Settings for the conversation orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Deadline applied to each network stage.  `None` waits indefinitely.
    pub stage_timeout_secs: Option<u64>,
    /// Events buffered per subscriber before slow subscribers start lagging.
    pub event_capacity: usize,
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: None,
            event_capacity: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_coach::config::AppConfig;
///
/// // Load, writing the defaults on first run
/// let mut config = AppConfig::load_or_init().unwrap();
///
/// // Modify and save
/// config.audio.save_last_recording = true;
/// // config.save_to(path).unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub credentials: CredentialsConfig,
    pub stt: SttConfig,
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    pub audio: AudioConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load the platform-appropriate `settings.toml`, writing the defaults
    /// there on first run so there is a file to fill the keys into.
    pub fn load_or_init() -> Result<Self> {
        Self::load_or_init_at(&AppPaths::new().settings_file)
    }

    /// [`load_or_init`](Self::load_or_init) for an explicit path.
    ///
    /// A failed write is logged and the defaults are still returned.
    pub fn load_or_init_at(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            return Self::load_from(path);
        }
        let config = Self::default();
        match config.save_to(path) {
            Ok(()) => log::info!("Wrote default settings to {}", path.display()),
            Err(e) => log::warn!("Could not write default settings to {}: {e}", path.display()),
        }
        Ok(config)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
