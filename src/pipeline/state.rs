//! Pipeline state machine and the per-run state bundle.
//!
//! [`PipelineState`] is what observers query; [`PipelineRun`] is the
//! orchestrator's private record of the one active run.  There is no
//! resident `Error` state: a failure publishes an error event and the
//! pipeline lands back in `Idle`.

use std::time::{Duration, Instant};

use super::cancel::CancelToken;

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// States of the conversation pipeline.
///
/// The state machine transitions are:
///
/// ```text
/// Idle ──start_recording──▶ Recording
///      ──stop_recording───▶ Transcribing
///                           ──transcript──▶ Completing ◀──send_text── Idle
///                                           ──reply──▶ Synthesizing
///                                                      ──clip──▶ Speaking
///                                                                ──played──▶ Idle
/// any non-Idle state ──error / cancel──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// No run is active; a new one may start.
    #[default]
    Idle,

    /// The microphone is capturing.
    Recording,

    /// Captured audio is with the speech-to-text service.
    Transcribing,

    /// The utterance is with the chat-completion service.
    Completing,

    /// The reply is with the text-to-speech service.
    Synthesizing,

    /// The synthesized reply is playing.
    Speaking,
}

impl PipelineState {
    /// Returns `true` while a run is active.
    ///
    /// ```
    /// use voice_coach::pipeline::PipelineState;
    ///
    /// assert!(!PipelineState::Idle.is_busy());
    /// assert!(PipelineState::Recording.is_busy());
    /// assert!(PipelineState::Speaking.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        !matches!(self, PipelineState::Idle)
    }

    /// A short human-readable label suitable for a status line.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Recording => "Recording",
            PipelineState::Transcribing => "Transcribing",
            PipelineState::Completing => "Thinking",
            PipelineState::Synthesizing => "Synthesizing",
            PipelineState::Speaking => "Speaking",
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

/// State of the single active record→speak (or text→speak) cycle.
///
/// Audio and text buffers are not stored here: each stage consumes the
/// previous stage's output by value, so nothing outlives the step that
/// produced it.
#[derive(Debug)]
pub struct PipelineRun {
    id: u64,
    stage: PipelineState,
    cancel: CancelToken,
    started_at: Instant,
}

impl PipelineRun {
    pub fn new(id: u64, stage: PipelineState) -> Self {
        Self {
            id,
            stage,
            cancel: CancelToken::new(),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stage(&self) -> PipelineState {
        self.stage
    }

    pub fn set_stage(&mut self, stage: PipelineState) {
        self.stage = stage;
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
