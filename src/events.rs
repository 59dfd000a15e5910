//! Typed publish/subscribe channel for pipeline progress.
//!
//! The orchestrator publishes [`PipelineEvent`]s; observers (the CLI, a UI,
//! loggers) subscribe without the core knowing about them.  Delivery is a
//! `tokio::sync::broadcast` channel, so every subscriber sees events in
//! emission order and a slow or dead subscriber never blocks the publisher
//! or any other subscriber.
//!
//! ```text
//! ConversationOrchestrator ──publish──▶ NotificationBus ──┬─▶ subscriber A
//!                                                         ├─▶ subscriber B
//!                                                         └─▶ listen(handler) task
//! ```

use std::fmt;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Machine-readable reason carried by [`PipelineEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Recording stopped with nothing captured.
    NoAudio,
    Capture,
    Encoding,
    Transcription,
    Completion,
    Synthesis,
    Playback,
    Cancelled,
    /// A stage exceeded its deadline.
    Timeout,
    /// A run was requested while another was active.
    ConcurrentRun,
    /// The request does not apply to the current state.
    InvalidState,
    /// Blank text was sent.
    EmptyInput,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoAudio => "no_audio",
            ErrorKind::Capture => "capture",
            ErrorKind::Encoding => "encoding",
            ErrorKind::Transcription => "transcription",
            ErrorKind::Completion => "completion",
            ErrorKind::Synthesis => "synthesis",
            ErrorKind::Playback => "playback",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConcurrentRun => "concurrent_run",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::EmptyInput => "empty_input",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// Everything an observer can learn about a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RecordingStarted,
    RecordingStopped,
    TranscriptionStarted,
    /// Recognised user speech.
    TranscriptReady(String),
    CompletionStarted,
    /// The model's reply text.
    CompletionReady(String),
    /// Playback of the synthesized reply has begun.
    SynthesisStarted,
    /// Playback finished; the orchestrator is idle again.
    SynthesisCompleted,
    Error { kind: ErrorKind, message: String },
}

impl PipelineEvent {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        PipelineEvent::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PipelineEvent::Error { .. })
    }
}

// ---------------------------------------------------------------------------
// NotificationBus
// ---------------------------------------------------------------------------

/// Multi-subscriber event channel.  Cheap to clone; all clones publish into
/// the same channel.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl NotificationBus {
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped for that subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// Returns the number of subscribers reached.  Publishing with nobody
    /// listening is not an error.
    pub fn publish(&self, event: PipelineEvent) -> usize {
        log::trace!("bus: {event:?}");
        self.tx.send(event).unwrap_or(0)
    }

    /// A receiver that sees every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Run `handler` for every event on its own task.
    ///
    /// The subscription is taken before this returns, so no event published
    /// afterwards is missed.  The task ends when every bus clone is dropped.
    /// A panicking handler only takes down its own task.
    pub fn listen<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(PipelineEvent) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("bus: subscriber lagged, {missed} events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
