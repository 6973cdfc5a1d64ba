//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use parley_core::ProviderEntry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Record store location
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Primary completion provider, appended after the pool entries
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding backend for semantic retrieval
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Knowledge retrieval limits
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Bot defaults
    #[serde(default)]
    pub bot: BotConfig,
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8765
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:`
    #[serde(default = "default_database_path")]
    pub path: String,
    /// Seconds before the gateway re-reads sensitive words and the provider
    /// pool written by `parley` admin commands. 0 re-reads on every request.
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

fn default_refresh_secs() -> u64 {
    30
}

fn default_database_path() -> String {
    AppConfig::config_dir()
        .join("parley.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            refresh_secs: default_refresh_secs(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Display name of the primary provider
    #[serde(default = "default_llm_name")]
    pub name: String,

    /// OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Stream tokens to the caller as they arrive
    #[serde(default = "default_true")]
    pub stream: bool,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound for one provider attempt, in seconds
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

fn default_llm_name() -> String {
    "primary".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_tokens() -> u32 {
    16000
}
fn default_attempt_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            name: default_llm_name(),
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            stream: true,
            max_tokens: default_max_tokens(),
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("stream", &self.stream)
            .field("max_tokens", &self.max_tokens)
            .field("attempt_timeout_secs", &self.attempt_timeout_secs)
            .finish()
    }
}

impl LlmConfig {
    /// The primary provider as a pool entry, if it has a credential.
    pub fn primary_entry(&self) -> Option<ProviderEntry> {
        let api_key = self.api_key.as_ref().filter(|k| !k.is_empty())?;
        if self.base_url.is_empty() || self.model.is_empty() {
            return None;
        }
        Some(ProviderEntry::new(
            self.name.clone(),
            self.base_url.clone(),
            api_key.clone(),
            self.model.clone(),
        ))
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model; semantic retrieval is off when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Defaults to `llm.base_url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Defaults to `llm.api_key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

/// Resolved embedding endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct EmbeddingEndpoint {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Passages folded into each prompt
    #[serde(default = "default_retrieval_limit")]
    pub limit: usize,

    /// Passage bodies are cut to this many characters
    #[serde(default = "default_max_passage_length")]
    pub max_passage_length: usize,
}

fn default_retrieval_limit() -> usize {
    3
}
fn default_max_passage_length() -> usize {
    500
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_retrieval_limit(),
            max_passage_length: default_max_passage_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot id used when a request does not name one
    #[serde(default = "default_bot_id")]
    pub default_id: String,
}

fn default_bot_id() -> String {
    "default".into()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            default_id: default_bot_id(),
        }
    }
}

impl AppConfig {
    /// Load from `~/.parley/config.toml` and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

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

    /// Environment variables win over the file.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = var("PARLEY_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
        if let Some(base_url) = var("PARLEY_BASE_URL") {
            self.llm.base_url = base_url;
        }
        if let Some(model) = var("PARLEY_MODEL") {
            self.llm.model = model;
        }
        if let Some(path) = var("PARLEY_DATABASE") {
            self.database.path = path;
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "llm.max_tokens must be > 0".into(),
            ));
        }
        if self.llm.attempt_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "llm.attempt_timeout_secs must be > 0".into(),
            ));
        }
        if self.retrieval.limit == 0 || self.retrieval.max_passage_length == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.limit and retrieval.max_passage_length must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// The embedding endpoint, with unset fields inherited from `llm`.
    pub fn embedding_endpoint(&self) -> Option<EmbeddingEndpoint> {
        let model = self.embedding.model.clone().filter(|m| !m.is_empty())?;
        let api_key = self
            .embedding
            .api_key
            .clone()
            .or_else(|| self.llm.api_key.clone())?;
        Some(EmbeddingEndpoint {
            base_url: self
                .embedding
                .base_url
                .clone()
                .unwrap_or_else(|| self.llm.base_url.clone()),
            api_key,
            model,
        })
    }

    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

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

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 8765);
        assert!(config.llm.stream);
        assert_eq!(config.llm.max_tokens, 16000);
        assert_eq!(config.llm.attempt_timeout_secs, 120);
        assert_eq!(config.retrieval.limit, 3);
        assert_eq!(config.retrieval.max_passage_length, 500);
        assert_eq!(config.database.refresh_secs, 30);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.llm.model, config.llm.model);
        assert_eq!(parsed.gateway.port, config.gateway.port);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn load_from_file_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[llm]
base_url = "https://api.deepseek.com/v1"
model = "deepseek-chat"
stream = false

[embedding]
model = "text-embedding-3-small"

[database]
refresh_secs = 0
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.llm.model, "deepseek-chat");
        assert!(!config.llm.stream);
        assert_eq!(config.llm.max_tokens, 16000);
        assert_eq!(config.embedding.model.as_deref(), Some("text-embedding-3-small"));
        assert_eq!(config.database.refresh_secs, 0);
        assert!(config.database.path.ends_with("parley.db"));
    }

    #[test]
    fn invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retrieval]\nlimit = 0\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));

        std::fs::write(&path, "[llm\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("PARLEY_MODEL", "gpt-4.1"),
            ("PARLEY_DATABASE", ":memory:"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.llm.model, "gpt-4.1");
        assert_eq!(config.database.path, ":memory:");
    }

    #[test]
    fn file_api_key_beats_env() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-file".into());
        config.apply_env_overrides(|_| Some("sk-env".into()));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn primary_entry_requires_key() {
        let mut config = AppConfig::default();
        assert!(config.llm.primary_entry().is_none());

        config.llm.api_key = Some("sk-x".into());
        let entry = config.llm.primary_entry().unwrap();
        assert_eq!(entry.name, "primary");
        assert_eq!(entry.model, "gpt-4o-mini");
        assert!(entry.enabled);
    }

    #[test]
    fn embedding_endpoint_inherits_llm() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-x".into());
        assert!(config.embedding_endpoint().is_none());

        config.embedding.model = Some("text-embedding-3-small".into());
        let endpoint = config.embedding_endpoint().unwrap();
        assert_eq!(endpoint.base_url, config.llm.base_url);
        assert_eq!(endpoint.api_key, "sk-x");
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-very-secret".into());
        config.embedding.api_key = Some("sk-embed-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(!debug.contains("sk-embed-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
