//! Configuration for privlens
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/privlens/config.toml)
//! 3. Built-in defaults (lowest priority)

use crate::answer::AUTO_PROVIDER;
use crate::storage::DuplicatePolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod observability;
mod serialization;


pub use observability::{FileLogging, LogRotation, LoggingConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const ENV_DB: &str = "PRIVLENS_DB";
const ENV_PROVIDER: &str = "PRIVLENS_PROVIDER";
const ENV_TIMEOUT: &str = "PRIVLENS_TIMEOUT";

const DEFAULT_CHANNEL_BUFFER: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite history location (":memory:" keeps it in-process)
    pub db_path: PathBuf,

    /// AI provider passed with every question ("auto" or a provider name)
    pub preferred_api_provider: String,

    /// What an append does when the record id already exists
    pub duplicate_policy: DuplicatePolicy,

    /// Depth of the request queue in front of the background
    pub channel_buffer: usize,

    /// Caller-side request timeout in seconds (0 = wait indefinitely)
    pub request_timeout_secs: u64,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            preferred_api_provider: AUTO_PROVIDER.to_string(),
            duplicate_policy: DuplicatePolicy::default(),
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
            request_timeout_secs: 0,
            logging: LoggingConfig::default(),
        }
    }
}

/// Platform data directory, falling back to ./data
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("privlens"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .join("history.db")
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub db_path: Option<String>,
    pub preferred_api_provider: Option<String>,
    pub duplicate_policy: Option<String>,
    pub channel_buffer: Option<usize>,
    pub request_timeout_secs: Option<u64>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/privlens/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("privlens").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    /// Called during startup to help users discover configuration options
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        // Don't overwrite existing config
        if path.exists() {
            return;
        }

        // Config is optional; a read-only home just means defaults
        let _ = Self::default().write_to(&path);
    }

    /// Write this config as TOML, creating parent directories
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        // to_toml() is the single source of truth for the file format
        std::fs::write(path, self.to_toml())
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Load file config if it exists
    ///
    /// A file that exists but can't be read or parsed is an error: a broken
    /// config should fail fast, not silently fall back to defaults while the
    /// user debugs the wrong thing.
    pub(crate) fn load_file_config(path: &Path) -> Result<FileConfig> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).with_context(|| {
                format!(
                    "Failed to parse configuration file {}\n  \
                     Check for missing quotes, invalid booleans (use true/false) \
                     or typos in section names. Reset with `privlens config --reset`.",
                    path.display()
                )
            }),
            // Config file doesn't exist - use defaults
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => Err(e)
                .with_context(|| format!("Cannot read configuration file {}", path.display())),
        }
    }

    /// Load configuration: env vars -> file -> defaults
    pub fn from_env() -> Result<Self> {
        let file = match Self::config_path() {
            Some(path) => Self::load_file_config(&path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge a file layer and an environment lookup over the defaults
    pub(crate) fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        // History location: env > file > default
        let db_path = env(ENV_DB)
            .or(file.db_path)
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        // Provider: env > file > default ("auto")
        let preferred_api_provider = env(ENV_PROVIDER)
            .or(file.preferred_api_provider)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or(defaults.preferred_api_provider);

        // Duplicate policy: file > default
        let duplicate_policy = file
            .duplicate_policy
            .map(|s| DuplicatePolicy::from_str(&s))
            .unwrap_or(defaults.duplicate_policy);

        // Queue depth: file > default (a zero-capacity channel is not allowed)
        let channel_buffer = file
            .channel_buffer
            .filter(|&n| n > 0)
            .unwrap_or(defaults.channel_buffer);

        // Timeout: env > file > default
        let request_timeout_secs = match env(ENV_TIMEOUT) {
            Some(raw) => raw.trim().parse().with_context(|| {
                format!("{} must be a whole number of seconds, got {:?}", ENV_TIMEOUT, raw)
            })?,
            None => file
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
        };

        let logging = LoggingConfig::from_file(file.logging);

        Ok(Self {
            db_path,
            preferred_api_provider,
            duplicate_policy,
            channel_buffer,
            request_timeout_secs,
            logging,
        })
    }

    /// Caller-side timeout, if one is configured
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}
