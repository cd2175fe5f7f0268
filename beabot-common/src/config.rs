//! Configuration loading and path resolution
//!
//! Resolution priority (highest first):
//! 1. Command-line arguments (applied by the binary)
//! 2. Environment variables
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing TOML file is not an error: a warning is logged and compiled
//! defaults are used. A malformed file is reported as `Error::Config`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the music library directory
pub const ENV_MUSIC_DIR: &str = "BOT_MUSIC_DIR";
/// Environment variable overriding the download subdirectory name
pub const ENV_DOWNLOAD_SUBDIR: &str = "BOT_YT_DL_SUBDIR";
/// Environment variable overriding the playlist subdirectory name
pub const ENV_PLAYLIST_SUBDIR: &str = "BOT_PLAYLIST_SUBDIR";
/// Environment variable pointing at the ffmpeg binary
pub const ENV_FFMPEG_PATH: &str = "BOT_FFMPEG_PATH";
/// Environment variable overriding the word filter file
pub const ENV_FILTER_FILE: &str = "BOT_FILTER_FILE";
/// Environment variable overriding the HTTP bind address
pub const ENV_BIND_ADDR: &str = "BEABOT_BIND_ADDR";
/// Environment variable overriding the gateway base URL
pub const ENV_GATEWAY_URL: &str = "BEABOT_GATEWAY_URL";

/// Complete bot configuration (TOML document)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub music: MusicConfig,
    pub playback: PlaybackConfig,
    pub acquisition: AcquisitionConfig,
    pub reaper: ReaperConfig,
    pub scheduler: SchedulerConfig,
    pub moderation: ModerationConfig,
    pub http: HttpConfig,
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

/// Music library layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    /// Root of the local music library
    pub library_dir: PathBuf,
    /// Subdirectory of `library_dir` receiving downloaded tracks
    pub download_subdir: String,
    /// Subdirectory of `library_dir` holding saved playlists
    pub playlist_subdir: String,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            library_dir: default_library_dir(),
            download_subdir: "Audio".to_string(),
            playlist_subdir: "Playlists".to_string(),
        }
    }
}

/// Per-workspace playback session limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub max_queue_length: usize,
    pub history_limit: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_queue_length: 100,
            history_limit: 50,
        }
    }
}

/// External media resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Media resolver program (yt-dlp compatible command line)
    pub resolver_program: String,
    /// ffmpeg location passed to the resolver for audio extraction
    pub ffmpeg_path: Option<PathBuf>,
    /// Upper bound for a single resolution
    pub timeout_secs: u64,
    pub audio_format: String,
    pub audio_quality: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            resolver_program: "yt-dlp".to_string(),
            ffmpeg_path: None,
            timeout_secs: 300,
            audio_format: "mp3".to_string(),
            audio_quality: "192".to_string(),
        }
    }
}

impl AcquisitionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Idle reaper timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub interval_secs: u64,
    pub idle_threshold_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            idle_threshold_secs: 30,
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }
}

/// Which workspaces a temporary ban is reversed in when it expires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalScope {
    /// Every workspace the bot is currently present in
    #[default]
    AllWorkspaces,
    /// Only the workspace the action was applied in
    OriginWorkspace,
}

/// Temporal action scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    /// Reversal attempts before a pending action is abandoned
    pub max_attempts: u32,
    pub reversal_scope: ReversalScope,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            max_attempts: 30,
            reversal_scope: ReversalScope::AllWorkspaces,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Moderation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// JSON file holding the filtered-word list
    pub filter_file: PathBuf,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            filter_file: PathBuf::from("filtered_words.json"),
        }
    }
}

/// HTTP command surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5750".to_string(),
        }
    }
}

/// Chat-platform gateway sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5751".to_string(),
            request_timeout_secs: 15,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl BotConfig {
    /// Directory receiving downloaded tracks
    pub fn download_dir(&self) -> PathBuf {
        self.music.library_dir.join(&self.music.download_subdir)
    }

    /// Directory holding saved playlists
    pub fn playlist_dir(&self) -> PathBuf {
        self.music.library_dir.join(&self.music.playlist_subdir)
    }

    /// Apply environment variable overrides (priority 2)
    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_value(ENV_MUSIC_DIR) {
            self.music.library_dir = PathBuf::from(dir);
        }
        if let Some(subdir) = env_value(ENV_DOWNLOAD_SUBDIR) {
            self.music.download_subdir = subdir;
        }
        if let Some(subdir) = env_value(ENV_PLAYLIST_SUBDIR) {
            self.music.playlist_subdir = subdir;
        }
        if let Some(path) = env_value(ENV_FFMPEG_PATH) {
            self.acquisition.ffmpeg_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_value(ENV_FILTER_FILE) {
            self.moderation.filter_file = PathBuf::from(path);
        }
        if let Some(addr) = env_value(ENV_BIND_ADDR) {
            self.http.bind_addr = addr;
        }
        if let Some(url) = env_value(ENV_GATEWAY_URL) {
            self.gateway.base_url = url;
        }
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.playback.max_queue_length == 0 {
            return Err(Error::Config(
                "playback.max_queue_length must be at least 1".to_string(),
            ));
        }
        if self.acquisition.timeout_secs == 0 {
            return Err(Error::Config(
                "acquisition.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.scheduler.max_attempts == 0 {
            return Err(Error::Config(
                "scheduler.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Create the download and playlist directories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.download_dir(), self.playlist_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                info!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }
}

/// Load configuration from `path`, falling back to defaults when absent
///
/// Environment overrides are applied on top of the file contents.
pub fn load_config(path: Option<&Path>) -> Result<BotConfig> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path(),
    };

    let mut config = match path {
        Some(ref p) if p.exists() => {
            let content = std::fs::read_to_string(p)?;
            let config: BotConfig = toml::from_str(&content)?;
            info!("Loaded configuration from {}", p.display());
            config
        }
        Some(ref p) => {
            warn!(
                "Config file {} not found, using compiled defaults",
                p.display()
            );
            BotConfig::default()
        }
        None => {
            warn!("Could not determine config directory, using compiled defaults");
            BotConfig::default()
        }
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Write configuration as TOML, creating parent directories as needed
pub fn write_config(config: &BotConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Platform config file location: `<config_dir>/beabot/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("beabot").join("config.toml"))
}

/// OS-dependent default music library
fn default_library_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Music")))
        .unwrap_or_else(|| PathBuf::from("./music"))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
