//! Configuration loading and config file resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`PULSEMIX_CONFIG`)
//! 3. Platform config directory (`<config_dir>/pulsemix/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! An explicitly named file (CLI or environment) must exist and parse. The
//! platform file is optional: when it is absent a warning is logged and the
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PULSEMIX_CONFIG";

/// Complete client configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote mixing service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the mixing service (no trailing slash required)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound for a whole request, including a streamed generation job
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Interval between availability probes
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,

    /// Timeout for a single availability probe
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
}

/// Transport settings shared by main playback and preview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Position polling period (one display frame)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Volume applied to the first activated version (0.0-1.0)
    #[serde(default = "default_initial_volume")]
    pub initial_volume: f32,

    /// Preview auto-stop window, measured from playback start
    #[serde(default = "default_preview_window_secs")]
    pub preview_window_secs: u64,
}

/// Where and how generated audio is written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving downloads and tempo-adjusted files
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    /// File name prefix for downloads (`{prefix}_{version}.{ext}`)
    #[serde(default = "default_download_prefix")]
    pub download_prefix: String,

    /// Media type declared for streamed artifacts
    #[serde(default = "default_media_type")]
    pub media_type: String,

    /// File extension matching `media_type`
    #[serde(default = "default_extension")]
    pub extension: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_health_interval_secs() -> u64 {
    6
}

fn default_health_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    16
}

fn default_initial_volume() -> f32 {
    0.75
}

fn default_preview_window_secs() -> u64 {
    20
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_download_prefix() -> String {
    "pulsemix".to_string()
}

fn default_media_type() -> String {
    "audio/mpeg".to_string()
}

fn default_extension() -> String {
    "mp3".to_string()
}

fn default_log_level() -> String {
    "pulsemix=info,pulsemix_client=info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            health_interval_secs: default_health_interval_secs(),
            health_timeout_secs: default_health_timeout_secs(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            initial_volume: default_initial_volume(),
            preview_window_secs: default_preview_window_secs(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            download_prefix: default_download_prefix(),
            media_type: default_media_type(),
            extension: default_extension(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    PlatformDefault(PathBuf),
    CompiledDefaults,
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve and load configuration following the documented priority
    ///
    /// Returns the configuration together with its source so callers can log it.
    pub fn resolve(cli_arg: Option<&Path>) -> Result<(Self, ConfigSource)> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            let config = Self::load(path)?;
            info!("Loaded configuration from {:?} (command line)", path);
            return Ok((config, ConfigSource::CommandLine(path.to_path_buf())));
        }

        // Priority 2: Environment variable
        if let Ok(value) = std::env::var(CONFIG_ENV_VAR) {
            if !value.trim().is_empty() {
                let path = PathBuf::from(value);
                let config = Self::load(&path)?;
                info!("Loaded configuration from {:?} ({})", path, CONFIG_ENV_VAR);
                return Ok((config, ConfigSource::Environment(path)));
            }
        }

        // Priority 3: Platform config directory
        if let Some(path) = platform_config_path() {
            if path.exists() {
                let config = Self::load(&path)?;
                info!("Loaded configuration from {:?}", path);
                return Ok((config, ConfigSource::PlatformDefault(path)));
            }
            warn!("No config file at {:?}, using compiled defaults", path);
        } else {
            warn!("Could not determine config directory, using compiled defaults");
        }

        // Priority 4: Compiled defaults
        Ok((Self::default(), ConfigSource::CompiledDefaults))
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let base = self.server.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server.base_url must be an http(s) URL, got {:?}",
                self.server.base_url
            )));
        }
        if self.server.health_interval_secs == 0 {
            return Err(Error::Config("server.health_interval_secs must be > 0".to_string()));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(Error::Config("server.request_timeout_secs must be > 0".to_string()));
        }
        if self.server.health_timeout_secs == 0 {
            return Err(Error::Config("server.health_timeout_secs must be > 0".to_string()));
        }
        if self.playback.poll_interval_ms == 0 {
            return Err(Error::Config("playback.poll_interval_ms must be > 0".to_string()));
        }
        if self.playback.preview_window_secs == 0 {
            return Err(Error::Config("playback.preview_window_secs must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.playback.initial_volume) {
            return Err(Error::Config(format!(
                "playback.initial_volume must be within 0.0-1.0, got {}",
                self.playback.initial_volume
            )));
        }
        if self.output.extension.trim().is_empty() {
            return Err(Error::Config("output.extension must not be empty".to_string()));
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.server.base_url.trim().trim_end_matches('/')
    }
}

/// Platform-specific location of the optional config file
pub fn platform_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pulsemix").join("config.toml"))
}
