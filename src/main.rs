//! Application entry point: interactive voice coach.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Parse the command line and load [`AppConfig`] (defaults on first run).
//! 3. Build the STT, completion and TTS clients from config.
//! 4. Open the microphone and speaker, falling back to device-less stand-ins.
//! 5. Print bus events as they arrive.
//! 6. Either send one `--text` turn, or read commands from stdin until
//!    `:quit` / EOF.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use voice_coach::audio::{
    AudioSource, CpalCapture, CpalPlayback, NoDeviceCapture, PlaybackSink, TimedPlayback,
};
use voice_coach::config::{is_placeholder_key, AppConfig};
use voice_coach::events::{NotificationBus, PipelineEvent};
use voice_coach::llm::ChatCompletionClient;
use voice_coach::pipeline::{
    ConversationOrchestrator, PipelineError, PipelineSettings, PipelineState, RunOutcome,
};
use voice_coach::stt::GoogleSpeechClient;
use voice_coach::tts::GoogleTtsClient;

/// Voice coach: talk, get corrected, hear the answer.
#[derive(Parser)]
#[command(name = "voice-coach", version, about)]
struct Cli {
    /// Settings file (defaults to <config dir>/voice-coach/settings.toml)
    #[arg(short, long, env = "VOICE_COACH_CONFIG")]
    config: Option<PathBuf>,

    /// Send this text as one turn, speak the reply, then exit
    #[arg(short, long)]
    text: Option<String>,

    /// Do not open audio devices (replies are timed, not played)
    #[arg(long)]
    no_audio: bool,

    /// Google Cloud API key for speech recognition and synthesis
    #[arg(long, env = "GOOGLE_CLOUD_API_KEY", hide_env_values = true)]
    google_key: Option<String>,

    /// API key for the chat-completion endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn load_config(cli: &Cli) -> AppConfig {
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load_or_init(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    if let Some(key) = &cli.google_key {
        config.credentials.google_cloud_key = key.clone();
    }
    if let Some(key) = &cli.openai_key {
        config.credentials.openai_key = key.clone();
    }
    if is_placeholder_key(&config.credentials.google_cloud_key) {
        log::warn!("No Google Cloud key configured; speech requests will fail");
    }
    if is_placeholder_key(&config.credentials.openai_key) {
        log::warn!("No OpenAI key configured; completion requests will fail");
    }
    config
}

fn open_devices(config: &AppConfig, no_audio: bool) -> (Arc<dyn AudioSource>, Arc<dyn PlaybackSink>) {
    if no_audio {
        log::info!("Audio devices disabled");
        return (Arc::new(NoDeviceCapture), Arc::new(TimedPlayback::new()));
    }

    let capture: Arc<dyn AudioSource> = match CpalCapture::new(config.audio.max_recording_secs) {
        Ok(capture) => Arc::new(capture),
        Err(e) => {
            log::warn!("Microphone unavailable ({e}); recordings will be empty");
            Arc::new(NoDeviceCapture)
        }
    };
    let playback: Arc<dyn PlaybackSink> = match CpalPlayback::new() {
        Ok(playback) => Arc::new(playback),
        Err(e) => {
            log::warn!("Speaker unavailable ({e}); replies will not be audible");
            Arc::new(TimedPlayback::new())
        }
    };
    (capture, playback)
}

fn build_orchestrator(config: &AppConfig, no_audio: bool) -> ConversationOrchestrator {
    let keys = &config.credentials;
    let (capture, playback) = open_devices(config, no_audio);

    ConversationOrchestrator::new(
        capture,
        Arc::new(GoogleSpeechClient::new(
            &keys.google_cloud_key,
            config.stt.clone(),
        )),
        Arc::new(ChatCompletionClient::new(&keys.openai_key, config.llm.clone())),
        Arc::new(GoogleTtsClient::new(&keys.google_cloud_key, &config.tts)),
        playback,
        NotificationBus::new(config.pipeline.event_capacity),
        PipelineSettings::from_config(config),
    )
}

fn describe(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::RecordingStarted => "🎙  recording… (Enter to stop)".into(),
        PipelineEvent::RecordingStopped => "   recording stopped".into(),
        PipelineEvent::TranscriptionStarted => "   transcribing…".into(),
        PipelineEvent::TranscriptReady(text) => format!("you: {text}"),
        PipelineEvent::CompletionStarted => "   thinking…".into(),
        PipelineEvent::CompletionReady(text) => format!("coach: {text}"),
        PipelineEvent::SynthesisStarted => "🔊 speaking…".into(),
        PipelineEvent::SynthesisCompleted => "   done".into(),
        PipelineEvent::Error { kind, message } => format!("error [{kind}]: {message}"),
    }
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

async fn one_shot(orchestrator: &ConversationOrchestrator, text: &str) -> ExitCode {
    match orchestrator.send_text(text).await {
        Ok(RunOutcome::Completed(_)) => ExitCode::SUCCESS,
        Ok(RunOutcome::Failed(_) | RunOutcome::Cancelled) | Err(_) => ExitCode::FAILURE,
    }
}

fn spawn_run<F>(run: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = Result<RunOutcome, PipelineError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Ok(RunOutcome::Completed(summary)) = run.await {
            log::debug!("turn finished: {:?} spoken", summary.spoken);
        }
    })
}

async fn interactive(orchestrator: Arc<ConversationOrchestrator>) -> Result<()> {
    println!("Enter: start/stop recording · text: send it · :cancel · :quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut active: Option<JoinHandle<()>> = None;

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            ":quit" | ":q" => break,
            ":cancel" => {
                if !orchestrator.cancel() {
                    println!("nothing to cancel");
                }
            }
            "" => match orchestrator.state() {
                PipelineState::Idle => {
                    // Rejections are reported on the bus.
                    let _ = orchestrator.start_recording();
                }
                PipelineState::Recording => {
                    let orc = Arc::clone(&orchestrator);
                    active = Some(spawn_run(async move { orc.stop_recording().await }));
                }
                busy => println!("busy ({}), :cancel to abort", busy.label()),
            },
            text => {
                let orc = Arc::clone(&orchestrator);
                let text = text.to_string();
                active = Some(spawn_run(async move { orc.send_text(&text).await }));
            }
        }
    }

    orchestrator.cancel();
    if let Some(run) = active {
        let _ = run.await;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Configuration
    let cli = Cli::parse();
    let config = load_config(&cli);
    log::info!(
        "voice-coach starting (stt {}, llm {} @ {}, voice {})",
        config.stt.language_code,
        config.llm.model,
        config.llm.base_url,
        config.tts.voice_name
    );

    // 3–4. Clients and devices
    let orchestrator = Arc::new(build_orchestrator(&config, cli.no_audio));

    // 5. Event printer
    let printer = orchestrator
        .bus()
        .listen(|event| println!("{}", describe(&event)));

    // 6. Run
    let code = match &cli.text {
        Some(text) => one_shot(&orchestrator, text).await,
        None => {
            interactive(Arc::clone(&orchestrator)).await?;
            ExitCode::SUCCESS
        }
    };

    // Closing the bus lets the printer drain what was already published.
    drop(orchestrator);
    if tokio::time::timeout(Duration::from_secs(1), printer).await.is_err() {
        log::debug!("event printer did not drain in time");
    }
    log::info!("voice-coach shutting down");
    Ok(code)
}
