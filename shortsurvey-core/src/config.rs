//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/shortsurvey/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/shortsurvey/` (~/.config/shortsurvey/)
//! - Data: `$XDG_DATA_HOME/shortsurvey/` (~/.local/share/shortsurvey/)
//! - State/Logs/Backups: `$XDG_STATE_HOME/shortsurvey/` (~/.local/state/shortsurvey/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable consulted when `crawler.api_key` is not set.
pub const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Comment crawler configuration
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Comment listing and authoring
    #[serde(default)]
    pub comments: CommentsConfig,

    /// Sheet export and table backups
    #[serde(default)]
    pub export: ExportConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Video platform comment crawler configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerConfig {
    /// Platform API key. Falls back to `YOUTUBE_API_KEY` when unset.
    pub api_key: Option<String>,

    /// Base URL of the platform data API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Comment threads requested per page (max 100)
    #[serde(default = "default_crawl_page_size")]
    pub page_size: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_crawl_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_crawl_max_retries")]
    pub max_retries: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: default_api_base_url(),
            page_size: default_crawl_page_size(),
            timeout_secs: default_crawl_timeout(),
            max_retries: default_crawl_max_retries(),
        }
    }
}

impl CrawlerConfig {
    /// The configured API key, or the `YOUTUBE_API_KEY` environment variable.
    ///
    /// Blank values count as missing.
    pub fn resolved_api_key(&self) -> Option<String> {
        let non_blank = |key: &String| !key.trim().is_empty();
        self.api_key
            .clone()
            .filter(non_blank)
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(non_blank))
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.resolved_api_key().is_none() {
            return Err(Error::Config(format!(
                "crawler.api_key is not set and {} is not in the environment",
                API_KEY_ENV
            )));
        }
        if self.page_size == 0 || self.page_size > 100 {
            return Err(Error::Config(
                "crawler.page_size must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_api_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

fn default_crawl_page_size() -> u32 {
    100
}

fn default_crawl_timeout() -> u64 {
    30
}

fn default_crawl_max_retries() -> usize {
    3
}

/// Comment listing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CommentsConfig {
    /// Top-level comments per page
    #[serde(default = "default_comment_page_size")]
    pub page_size: usize,

    /// Avatar service used for user-authored comments (`?u=<user>` is appended)
    #[serde(default = "default_avatar_base_url")]
    pub avatar_base_url: String,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            page_size: default_comment_page_size(),
            avatar_base_url: default_avatar_base_url(),
        }
    }
}

fn default_comment_page_size() -> usize {
    20
}

fn default_avatar_base_url() -> String {
    "https://i.pravatar.cc/32".to_string()
}

/// Export and backup configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExportConfig {
    /// Directory for table-clear backups (defaults to the state dir)
    pub backup_dir: Option<PathBuf>,
}

impl ExportConfig {
    /// Resolved backup directory
    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| Config::state_dir().join("backups"))
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/shortsurvey/config.toml` (~/.config/shortsurvey/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("shortsurvey").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("shortsurvey")
    }

    /// Returns the state directory path (for logs and backups)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("shortsurvey")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/shortsurvey/data.db` (~/.local/share/shortsurvey/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }
}
