//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-coach\
//!   macOS:   ~/Library/Application Support/voice-coach/
//!   Linux:   ~/.config/voice-coach/
//!
//! Data dir (saved recordings):
//!   Windows: %LOCALAPPDATA%\voice-coach\Recordings\
//!   macOS:   ~/Library/Application Support/voice-coach/Recordings/
//!   Linux:   ~/.local/share/voice-coach/Recordings/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory holding `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for saved takes.
    pub recordings_dir: PathBuf,
    /// Full path to `recording.wav`, overwritten by every take.
    pub last_recording_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-coach";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let recordings_dir = data_dir.join("Recordings");
        let last_recording_file = recordings_dir.join("recording.wav");

        Self {
            config_dir,
            settings_file,
            recordings_dir,
            last_recording_file,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
