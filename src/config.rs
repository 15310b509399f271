//! Configuration file parser for ~/.config/newsdesk/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are accepted and logged as warnings so typos are visible.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::content::{EnrichmentSettings, API_KEY_ENV, DEFAULT_BASE_URL};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// Every key is optional; missing keys fall back to `Default::default()`.
/// `Debug` masks `scrape_api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Saved-articles database file. `None` uses the config directory.
    pub database_path: Option<PathBuf>,

    /// Scrape API key. The FIRECRAWL_API_KEY env var takes precedence.
    pub scrape_api_key: Option<String>,

    pub scrape_base_url: String,

    /// Enrichment requests issued concurrently per batch.
    pub batch_size: usize,

    /// Pause between enrichment batches, in milliseconds.
    pub batch_delay_ms: u64,

    pub request_timeout_secs: u64,

    /// Bodies longer than this many characters are not re-fetched.
    pub min_content_len: usize,

    /// Extracted bodies are truncated beyond this many characters.
    pub max_content_len: usize,

    /// Whether commands emit notifications.
    pub notifications: bool,
}

impl Default for Config {
    fn default() -> Self {
        let enrichment = EnrichmentSettings::default();
        Self {
            database_path: None,
            scrape_api_key: None,
            scrape_base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: enrichment.batch_size,
            batch_delay_ms: enrichment.batch_delay.as_millis() as u64,
            request_timeout_secs: enrichment.request_timeout.as_secs(),
            min_content_len: enrichment.min_content_len,
            max_content_len: enrichment.max_content_len,
            notifications: true,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field(
                "scrape_api_key",
                &self.scrape_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scrape_base_url", &self.scrape_base_url)
            .field("batch_size", &self.batch_size)
            .field("batch_delay_ms", &self.batch_delay_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("min_content_len", &self.min_content_len)
            .field("max_content_len", &self.max_content_len)
            .field("notifications", &self.notifications)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "database_path",
        "scrape_api_key",
        "scrape_base_url",
        "batch_size",
        "batch_delay_ms",
        "request_timeout_secs",
        "min_content_len",
        "max_content_len",
        "notifications",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// The API key to use: the env var when set and non-blank, else the file's.
    pub fn resolve_api_key(&self) -> Option<String> {
        Self::pick_api_key(std::env::var(API_KEY_ENV).ok(), self.scrape_api_key.clone())
    }

    fn pick_api_key(from_env: Option<String>, from_file: Option<String>) -> Option<String> {
        from_env
            .filter(|k| !k.trim().is_empty())
            .or(from_file.filter(|k| !k.trim().is_empty()))
    }

    pub fn enrichment_settings(&self) -> EnrichmentSettings {
        EnrichmentSettings {
            base_url: self.scrape_base_url.clone(),
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            min_content_len: self.min_content_len,
            max_content_len: self.max_content_len,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
