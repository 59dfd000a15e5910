//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), one sub-config per pipeline
//! stage, `AppPaths` for the platform config directory, and TOML persistence
//! via `AppConfig::load_or_init` / `AppConfig::save_to`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    is_placeholder_key, AppConfig, AudioConfig, CredentialsConfig, LlmConfig, PipelineConfig,
    SttConfig, SynthesisEncoding, TtsConfig, DEFAULT_SYSTEM_PROMPT,
};
