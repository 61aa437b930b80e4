//! Configuration loading, validation, and management for SageChat.
//!
//! Loads configuration from `~/.sagechat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.sagechat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the generation provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Generation provider (well-known name or "custom")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL override for the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model for the primary answer
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for the primary answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Max tokens for the primary answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Assistant greeting seeded into a brand-new session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,

    /// Web search augmentation
    #[serde(default)]
    pub search: SearchConfig,

    /// Secondary critique pass
    #[serde(default)]
    pub critique: CritiqueConfig,

    /// Conversation persistence
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_provider() -> String {
    "siliconflow".into()
}
fn default_model() -> String {
    "deepseek-ai/deepseek-vl2".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("greeting", &self.greeting)
            .field("search", &self.search)
            .field("critique", &self.critique)
            .field("storage", &self.storage)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Whether augmentation starts switched on
    #[serde(default)]
    pub enabled: bool,

    /// Search endpoint accepting `POST {"query": "..."}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

fn default_max_results() -> usize {
    5
}
fn default_search_timeout() -> u64 {
    30
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            max_results: default_max_results(),
            timeout_secs: default_search_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritiqueConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Model for the critique pass; the primary model when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_critique_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_critique_temperature() -> f32 {
    0.7
}

impl Default for CritiqueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            temperature: default_critique_temperature(),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "file", "memory" or "none"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Directory for the file backend; `~/.sagechat/sessions` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_session_key")]
    pub session_key: String,
}

fn default_storage_backend() -> String {
    "file".into()
}
fn default_session_key() -> String {
    "chat-session".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
            session_key: default_session_key(),
        }
    }
}

impl StorageConfig {
    /// Directory the file backend writes snapshots to.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("sessions"))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.sagechat/config.toml).
    ///
    /// Also checks environment variables:
    /// - `SAGECHAT_API_KEY`, `SILICONFLOW_API_KEY`, `OPENAI_API_KEY` (first wins)
    /// - `SAGECHAT_MODEL`
    /// - `SAGECHAT_SEARCH_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("SAGECHAT_API_KEY")
                .or_else(|| lookup("SILICONFLOW_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(model) = lookup("SAGECHAT_MODEL") {
            self.model = model;
        }

        if let Some(endpoint) = lookup("SAGECHAT_SEARCH_URL") {
            self.search.endpoint = Some(endpoint);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sagechat")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if !(0.0..=2.0).contains(&self.critique.temperature) {
            return Err(ConfigError::ValidationError(
                "critique.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.search.max_results == 0 || self.search.max_results > 5 {
            return Err(ConfigError::ValidationError(
                "search.max_results must be between 1 and 5".into(),
            ));
        }

        if !matches!(self.storage.backend.as_str(), "file" | "memory" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "unknown storage.backend '{}' (expected file, memory or none)",
                self.storage.backend
            )));
        }

        if self.storage.session_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.session_key must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Model used by the critique pass.
    pub fn critique_model(&self) -> &str {
        self.critique.model.as_deref().unwrap_or(&self.model)
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: None,
            model: default_model(),
            temperature: None,
            max_tokens: None,
            greeting: None,
            search: SearchConfig::default(),
            critique: CritiqueConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
