//! Conversation pipeline: the state machine that sequences one spoken turn.
//!
//! # Architecture
//!
//! ```text
//! caller (CLI / UI)
//!   │ start_recording / stop_recording / send_text / cancel
//!   ▼
//! ConversationOrchestrator ──▶ Arc<dyn AudioSource>
//!   │                     ──▶ Arc<dyn Transcriber>
//!   │                     ──▶ Arc<dyn ChatCompleter>
//!   │                     ──▶ Arc<dyn SpeechSynthesizer>
//!   │                     ──▶ Arc<dyn PlaybackSink>
//!   ▼
//! NotificationBus ──▶ observers (never called back into by the core)
//! ```
//!
//! Only one [`PipelineRun`] exists at a time.  Starting another while one is
//! active is rejected with [`PipelineError::ConcurrentRun`].

pub mod cancel;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use cancel::CancelToken;
pub use runner::{ConversationOrchestrator, PipelineError, PipelineSettings, RunOutcome, RunSummary};
pub use state::{PipelineRun, PipelineState};
