//! Conversation orchestrator: drives capture → STT → LLM → TTS → speaker.
//!
//! [`ConversationOrchestrator`] owns the single active [`PipelineRun`] and
//! publishes every transition on the [`NotificationBus`].
//!
//! # Pipeline flow
//!
//! ```text
//! start_recording ──▶ AudioSource::start_capture                 [Recording]
//! stop_recording  ──▶ AudioSource::stop_capture → wav::encode
//!                     └─▶ Transcriber::transcribe                [Transcribing]
//!                           └─▶ ChatCompleter::complete          [Completing] ◀── send_text
//!                                 └─▶ SpeechSynthesizer::synthesize [Synthesizing]
//!                                       └─▶ PlaybackSink::play   [Speaking]
//!                                             └─▶ Idle
//! ```
//!
//! Each stage consumes the previous stage's output by value.  The whole
//! chain runs inside one `tokio::select!` against the run's
//! [`CancelToken`], so cancelling drops the in-flight request and nothing a
//! late response carries is ever acted on.
//!
//! Failures never escape as panics or leave the pipeline busy: every stage
//! error is published once as [`PipelineEvent::Error`] and the state returns
//! to `Idle`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;

use crate::audio::{
    encode, AudioSource, CaptureError, EncodedAudio, EncodingError, PlaybackError, PlaybackSink,
};
use crate::config::{AppConfig, AppPaths};
use crate::events::{ErrorKind, NotificationBus, PipelineEvent};
use crate::llm::{ChatCompleter, CompletionError};
use crate::stt::{Transcriber, TranscriptionError};
use crate::tts::{SpeechSynthesizer, SynthesisError, VoiceConfig};

use super::cancel::CancelToken;
use super::state::{PipelineRun, PipelineState};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Errors that can surface from the orchestrator.
///
/// All variants render a human-readable message, which is what the bus
/// carries alongside [`PipelineError::kind`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Recording stopped with nothing captured.
    #[error("no audio was captured")]
    NoAudio,

    #[error("audio capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("could not encode the recording: {0}")]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("cancelled")]
    Cancelled,

    /// A run was requested while another one is active.
    #[error("a conversation is already in progress ({})", .0.label())]
    ConcurrentRun(PipelineState),

    #[error("cannot {action} while {}", .state.label())]
    InvalidState {
        action: &'static str,
        state: PipelineState,
    },

    #[error("nothing to send: text is empty")]
    EmptyInput,
}

impl PipelineError {
    /// Reason code published with the error event.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::NoAudio => ErrorKind::NoAudio,
            PipelineError::Capture(_) => ErrorKind::Capture,
            PipelineError::Encoding(_) => ErrorKind::Encoding,
            PipelineError::Transcription(TranscriptionError::Timeout)
            | PipelineError::Completion(CompletionError::Timeout)
            | PipelineError::Synthesis(SynthesisError::Timeout) => ErrorKind::Timeout,
            PipelineError::Transcription(_) => ErrorKind::Transcription,
            PipelineError::Completion(_) => ErrorKind::Completion,
            PipelineError::Synthesis(_) => ErrorKind::Synthesis,
            PipelineError::Playback(_) => ErrorKind::Playback,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::ConcurrentRun(_) => ErrorKind::ConcurrentRun,
            PipelineError::InvalidState { .. } => ErrorKind::InvalidState,
            PipelineError::EmptyInput => ErrorKind::EmptyInput,
        }
    }
}

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// The user's turn: the transcript, or the text passed to `send_text`.
    pub utterance: String,
    pub reply: String,
    /// Length of the spoken reply.
    pub spoken: Duration,
}

/// How a run ended.  In every case the pipeline is back in `Idle`.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    Failed(PipelineError),
    Cancelled,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

// ---------------------------------------------------------------------------
// PipelineSettings
// ---------------------------------------------------------------------------

/// Per-orchestrator knobs taken from [`AppConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub system_prompt: String,
    /// Language hint passed to the recognizer.
    pub language_code: String,
    pub voice: VoiceConfig,
    /// Deadline for each network stage; `None` waits indefinitely.
    pub stage_timeout: Option<Duration>,
    /// Where each take is written after stopping; `None` keeps nothing.
    pub recording_file: Option<PathBuf>,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            system_prompt: config.llm.system_prompt.clone(),
            language_code: config.stt.language_code.clone(),
            voice: VoiceConfig::from(&config.tts),
            stage_timeout: config.pipeline.stage_timeout(),
            recording_file: config
                .audio
                .save_last_recording
                .then(|| AppPaths::new().last_recording_file),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// ConversationOrchestrator
// ---------------------------------------------------------------------------

/// Drives one conversation turn at a time.
///
/// All methods take `&self`; share the orchestrator behind an `Arc` so that
/// [`cancel`](Self::cancel) can be called while a run is being awaited.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_coach::audio::{NoDeviceCapture, TimedPlayback};
/// use voice_coach::config::AppConfig;
/// use voice_coach::events::NotificationBus;
/// use voice_coach::llm::ChatCompletionClient;
/// use voice_coach::pipeline::{ConversationOrchestrator, PipelineSettings};
/// use voice_coach::stt::GoogleSpeechClient;
/// use voice_coach::tts::GoogleTtsClient;
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let keys = &config.credentials;
/// let orchestrator = Arc::new(ConversationOrchestrator::new(
///     Arc::new(NoDeviceCapture),
///     Arc::new(GoogleSpeechClient::new(&keys.google_cloud_key, config.stt.clone())),
///     Arc::new(ChatCompletionClient::new(&keys.openai_key, config.llm.clone())),
///     Arc::new(GoogleTtsClient::new(&keys.google_cloud_key, &config.tts)),
///     Arc::new(TimedPlayback::new()),
///     NotificationBus::new(config.pipeline.event_capacity),
///     PipelineSettings::from_config(&config),
/// ));
/// let outcome = orchestrator.send_text("I goed to school").await;
/// # }
/// ```
pub struct ConversationOrchestrator {
    capture: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    completer: Arc<dyn ChatCompleter>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    playback: Arc<dyn PlaybackSink>,
    bus: NotificationBus,
    settings: PipelineSettings,
    run: Mutex<Option<PipelineRun>>,
    next_run_id: AtomicU64,
}

impl ConversationOrchestrator {
    pub fn new(
        capture: Arc<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        completer: Arc<dyn ChatCompleter>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        playback: Arc<dyn PlaybackSink>,
        bus: NotificationBus,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            capture,
            transcriber,
            completer,
            synthesizer,
            playback,
            bus,
            settings,
            run: Mutex::new(None),
            next_run_id: AtomicU64::new(1),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.slot()
            .as_ref()
            .map_or(PipelineState::Idle, PipelineRun::stage)
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// `Idle → Recording`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ConcurrentRun`] when a run is active (state is left
    /// as it was), or [`PipelineError::Capture`] when the device could not
    /// be armed.  Either is also published on the bus.
    pub fn start_recording(&self) -> Result<(), PipelineError> {
        let mut slot = self.slot();
        if let Some(run) = slot.as_ref() {
            let state = run.stage();
            drop(slot);
            return Err(self.reject(PipelineError::ConcurrentRun(state)));
        }

        if let Err(e) = self.capture.start_capture() {
            drop(slot);
            return Err(self.reject(PipelineError::Capture(e)));
        }

        let run = PipelineRun::new(self.next_id(), PipelineState::Recording);
        log::debug!("pipeline[{}]: Idle → Recording", run.id());
        *slot = Some(run);
        self.bus.publish(PipelineEvent::RecordingStarted);
        Ok(())
    }

    /// `Recording → Transcribing → … → Idle`.  Resolves when the run ends.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidState`] when not recording.  Stage failures
    /// are reported through [`RunOutcome::Failed`], not `Err`.
    pub async fn stop_recording(&self) -> Result<RunOutcome, PipelineError> {
        let (run_id, token) = {
            let mut slot = self.slot();
            match slot.as_mut() {
                Some(run) if run.stage() == PipelineState::Recording => {
                    log::debug!("pipeline[{}]: Recording → Transcribing", run.id());
                    run.set_stage(PipelineState::Transcribing);
                    (run.id(), run.cancel_token().clone())
                }
                other => {
                    let state = other.map_or(PipelineState::Idle, |run| run.stage());
                    drop(slot);
                    return Err(self.reject(PipelineError::InvalidState {
                        action: "stop recording",
                        state,
                    }));
                }
            }
        };

        let captured = self.capture.stop_capture();
        if self
            .advance(run_id, PipelineState::Transcribing, [PipelineEvent::RecordingStopped])
            .is_err()
        {
            return Ok(RunOutcome::Cancelled);
        }

        let audio = match captured {
            Some(buffer) if !buffer.is_empty() => buffer,
            _ => return Ok(self.finish(run_id, Err(PipelineError::NoAudio))),
        };
        log::debug!(
            "pipeline[{run_id}]: captured {:.2}s at {} Hz",
            audio.duration().as_secs_f32(),
            audio.sample_rate
        );

        let encoded = match encode(audio) {
            Ok(encoded) => encoded,
            Err(e) => return Ok(self.finish(run_id, Err(e.into()))),
        };
        if let Some(path) = &self.settings.recording_file {
            match save_take(path, &encoded).await {
                Ok(()) => log::debug!("pipeline[{run_id}]: take saved to {}", path.display()),
                Err(e) => log::warn!(
                    "pipeline[{run_id}]: could not save take to {}: {e}",
                    path.display()
                ),
            }
        }

        Ok(self
            .drive(run_id, token, self.transcribe_and_respond(run_id, encoded))
            .await)
    }

    /// `Idle → Completing → … → Idle`, skipping capture and transcription.
    ///
    /// # Errors
    ///
    /// [`PipelineError::EmptyInput`] for blank text and
    /// [`PipelineError::ConcurrentRun`] when a run is active.
    pub async fn send_text(&self, text: &str) -> Result<RunOutcome, PipelineError> {
        let utterance = text.trim();
        if utterance.is_empty() {
            return Err(self.reject(PipelineError::EmptyInput));
        }

        let (run_id, token) = {
            let mut slot = self.slot();
            if let Some(run) = slot.as_ref() {
                let state = run.stage();
                drop(slot);
                return Err(self.reject(PipelineError::ConcurrentRun(state)));
            }
            let run = PipelineRun::new(self.next_id(), PipelineState::Completing);
            log::debug!("pipeline[{}]: Idle → Completing (text)", run.id());
            let handle = (run.id(), run.cancel_token().clone());
            *slot = Some(run);
            handle
        };

        Ok(self
            .drive(run_id, token, self.respond(run_id, utterance.to_string()))
            .await)
    }

    /// Abort the active run and return to `Idle` immediately.
    ///
    /// Publishes a single `cancelled` error.  The in-flight stage is dropped
    /// by its driver; anything it would have produced is discarded.
    /// Returns `false` when there was nothing to cancel.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot();
        let Some(run) = slot.take() else {
            return false;
        };

        run.cancel_token().cancel();
        match run.stage() {
            PipelineState::Recording => {
                if let Some(take) = self.capture.stop_capture() {
                    log::debug!("pipeline[{}]: discarding {} samples", run.id(), take.samples.len());
                }
            }
            PipelineState::Speaking => self.playback.stop(),
            _ => {}
        }

        log::info!(
            "pipeline[{}]: cancelled while {} after {:?}",
            run.id(),
            run.stage().label(),
            run.elapsed()
        );
        let err = PipelineError::Cancelled;
        self.bus
            .publish(PipelineEvent::error(err.kind(), err.to_string()));
        true
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn transcribe_and_respond(
        &self,
        run_id: u64,
        audio: EncodedAudio,
    ) -> Result<RunSummary, PipelineError> {
        self.advance(
            run_id,
            PipelineState::Transcribing,
            [PipelineEvent::TranscriptionStarted],
        )?;

        let sample_rate = audio.sample_rate();
        let transcript = self
            .within_deadline(
                self.transcriber
                    .transcribe(audio, sample_rate, &self.settings.language_code),
                TranscriptionError::Timeout,
            )
            .await?;

        let text = transcript.text.trim().to_string();
        if text.is_empty() {
            return Err(TranscriptionError::NoResult.into());
        }

        self.advance(
            run_id,
            PipelineState::Completing,
            [PipelineEvent::TranscriptReady(text.clone())],
        )?;
        self.respond(run_id, text).await
    }

    async fn respond(&self, run_id: u64, utterance: String) -> Result<RunSummary, PipelineError> {
        self.advance(
            run_id,
            PipelineState::Completing,
            [PipelineEvent::CompletionStarted],
        )?;

        let completion = self
            .within_deadline(
                self.completer
                    .complete(&utterance, &self.settings.system_prompt),
                CompletionError::Timeout,
            )
            .await?;
        let reply = completion.text.trim().to_string();
        if reply.is_empty() {
            return Err(CompletionError::MalformedResponse("empty content".into()).into());
        }

        self.advance(
            run_id,
            PipelineState::Synthesizing,
            [PipelineEvent::CompletionReady(reply.clone())],
        )?;

        let speech = self
            .within_deadline(
                self.synthesizer.synthesize(&reply, &self.settings.voice),
                SynthesisError::Timeout,
            )
            .await?;
        let spoken = speech.duration;

        self.advance(
            run_id,
            PipelineState::Speaking,
            [PipelineEvent::SynthesisStarted],
        )?;
        self.playback.play(speech.clip).await?;

        Ok(RunSummary {
            utterance,
            reply,
            spoken,
        })
    }

    // -----------------------------------------------------------------------
    // Run bookkeeping
    // -----------------------------------------------------------------------

    /// Run `stages` until they finish or the run is cancelled, then tear the
    /// run down.
    async fn drive<F>(&self, run_id: u64, token: CancelToken, stages: F) -> RunOutcome
    where
        F: Future<Output = Result<RunSummary, PipelineError>>,
    {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(PipelineError::Cancelled),
            result = stages => result,
        };
        self.finish(run_id, result)
    }

    /// Move run `run_id` to `stage` and publish `events`.
    ///
    /// Fails with [`PipelineError::Cancelled`] when `run_id` is no longer the
    /// active run, in which case nothing is published.
    fn advance<I>(&self, run_id: u64, stage: PipelineState, events: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = PipelineEvent>,
    {
        let mut slot = self.slot();
        match slot.as_mut() {
            Some(run) if run.id() == run_id => {
                if run.stage() != stage {
                    log::debug!(
                        "pipeline[{run_id}]: {} → {}",
                        run.stage().label(),
                        stage.label()
                    );
                    run.set_stage(stage);
                }
                for event in events {
                    self.bus.publish(event);
                }
                Ok(())
            }
            _ => Err(PipelineError::Cancelled),
        }
    }

    /// Return to `Idle` and publish the run's final event, unless the run
    /// was already torn down by [`cancel`](Self::cancel).
    fn finish(&self, run_id: u64, result: Result<RunSummary, PipelineError>) -> RunOutcome {
        let mut slot = self.slot();
        let run = match slot.take() {
            Some(run) if run.id() == run_id => run,
            other => {
                *slot = other;
                log::debug!("pipeline[{run_id}]: already torn down");
                return RunOutcome::Cancelled;
            }
        };

        match result {
            Ok(summary) => {
                log::info!(
                    "pipeline[{run_id}]: done in {:?} ({:.2}s spoken)",
                    run.elapsed(),
                    summary.spoken.as_secs_f32()
                );
                self.bus.publish(PipelineEvent::SynthesisCompleted);
                RunOutcome::Completed(summary)
            }
            Err(PipelineError::Cancelled) => {
                let err = PipelineError::Cancelled;
                self.bus
                    .publish(PipelineEvent::error(err.kind(), err.to_string()));
                RunOutcome::Cancelled
            }
            Err(e) => {
                log::error!(
                    "pipeline[{run_id}]: {} failed: {e}",
                    run.stage().label()
                );
                self.bus
                    .publish(PipelineEvent::error(e.kind(), e.to_string()));
                RunOutcome::Failed(e)
            }
        }
    }

    /// Publish a rejected request once and hand the error back.
    fn reject(&self, err: PipelineError) -> PipelineError {
        log::warn!("pipeline: {err}");
        self.bus
            .publish(PipelineEvent::error(err.kind(), err.to_string()));
        err
    }

    async fn within_deadline<T, E>(
        &self,
        stage: impl Future<Output = Result<T, E>>,
        on_timeout: E,
    ) -> Result<T, E> {
        match self.settings.stage_timeout {
            Some(limit) => match tokio::time::timeout(limit, stage).await {
                Ok(result) => result,
                Err(_) => {
                    log::warn!("pipeline: stage exceeded {limit:?}");
                    Err(on_timeout)
                }
            },
            None => stage.await,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<PipelineRun>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_run_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Overwrite `path` with the take, creating its directory first.
async fn save_take(path: &Path, audio: &EncodedAudio) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, audio.as_bytes()).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
