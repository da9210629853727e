//! Configuration loading, validation, and management for bashpilot.
//!
//! Loads configuration from `~/.bashpilot/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.bashpilot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default completion provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Cap applied to every completion request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature; unset leaves the service default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Stream responses token by token
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Replace the built-in system prompt entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Tag and token conventions shared with the model
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// History replay settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Shell settings
    #[serde(default)]
    pub shell: ShellConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_max_tokens() -> u32 {
    150
}
fn default_true() -> bool {
    true
}

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
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("stream", &self.stream)
            .field("system_prompt", &self.system_prompt)
            .field("protocol", &self.protocol)
            .field("history", &self.history)
            .field("shell", &self.shell)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Delimiters and control tokens of the turn protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Tag wrapping the proposed command: `<bash>ls</bash>`
    #[serde(default = "default_command_tag")]
    pub command_tag: String,

    /// Tag wrapping the previous command's output in the next user turn
    #[serde(default = "default_result_tag")]
    pub result_tag: String,

    /// Tag wrapping the operator's own words
    #[serde(default = "default_user_tag")]
    pub user_tag: String,

    /// Input that ends the session (case-insensitive)
    #[serde(default = "default_exit_token")]
    pub exit_token: String,

    /// Feedback sent to the model when the operator declines a command
    #[serde(default = "default_cancellation_notice")]
    pub cancellation_notice: String,
}

fn default_command_tag() -> String {
    "bash".into()
}
fn default_result_tag() -> String {
    "execution_result".into()
}
fn default_user_tag() -> String {
    "user_input".into()
}
fn default_exit_token() -> String {
    "exit".into()
}
fn default_cancellation_notice() -> String {
    "Command execution cancelled.".into()
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            command_tag: default_command_tag(),
            result_tag: default_result_tag(),
            user_tag: default_user_tag(),
            exit_token: default_exit_token(),
            cancellation_notice: default_cancellation_notice(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Most recent turns replayed per request; 0 keeps everything
    #[serde(default)]
    pub max_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Shell binary invoked as `<program> -c <command>`
    #[serde(default = "default_shell_program")]
    pub program: String,

    /// Directory commands run in; unset means the current directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Kill commands that run longer than this; unset waits forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_shell_program() -> String {
    "sh".into()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: default_shell_program(),
            working_dir: None,
            timeout_secs: None,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from `path`, or the default location when `None`.
    ///
    /// Environment variables are applied on top of the file:
    /// - `BASHPILOT_API_KEY` (highest priority), then `OPENAI_API_KEY`,
    ///   then `OPENROUTER_API_KEY`, when the file sets no key
    /// - `BASHPILOT_PROVIDER`
    /// - `BASHPILOT_MODEL`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path(),
        };
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
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
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply environment-style overrides through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("BASHPILOT_API_KEY")
                .or_else(|| lookup("OPENAI_API_KEY"))
                .or_else(|| lookup("OPENROUTER_API_KEY"));
        }

        if let Some(provider) = lookup("BASHPILOT_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("BASHPILOT_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".bashpilot")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_tokens must be > 0".into(),
            ));
        }

        let p = &self.protocol;
        for (field, tag) in [
            ("command_tag", &p.command_tag),
            ("result_tag", &p.result_tag),
            ("user_tag", &p.user_tag),
        ] {
            if !is_valid_tag(tag) {
                return Err(ConfigError::ValidationError(format!(
                    "protocol.{field} '{tag}' must be non-empty and use only letters, digits, '_' or '-'"
                )));
            }
        }

        if p.command_tag == p.result_tag || p.command_tag == p.user_tag {
            return Err(ConfigError::ValidationError(
                "protocol.command_tag must differ from result_tag and user_tag".into(),
            ));
        }

        if p.exit_token.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "protocol.exit_token must not be empty".into(),
            ));
        }

        if self.shell.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "shell.program must not be empty".into(),
            ));
        }

        if self.provider_base_url(&self.default_provider).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "unknown provider '{}': set [providers.{}] api_url or use one of: {}",
                self.default_provider,
                self.default_provider,
                PROVIDER_PRESETS
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        Ok(())
    }

    /// Base URL for `name`: its `[providers.<name>] api_url`, else the preset.
    pub fn provider_base_url(&self, name: &str) -> Option<String> {
        self.providers
            .get(name)
            .and_then(|p| p.api_url.clone())
            .or_else(|| preset_base_url(name).map(str::to_string))
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The same config with every secret blanked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.api_key.is_some() {
            config.api_key = Some("[REDACTED]".into());
        }
        for provider in config.providers.values_mut() {
            if provider.api_key.is_some() {
                provider.api_key = Some("[REDACTED]".into());
            }
        }
        config
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        Self::default().to_toml().unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: None,
            stream: true,
            system_prompt: None,
            protocol: ProtocolConfig::default(),
            history: HistoryConfig::default(),
            shell: ShellConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Well-known OpenAI-compatible endpoints, usable without an `api_url`.
pub const PROVIDER_PRESETS: &[(&str, &str)] = &[
    ("openai", "https://api.openai.com/v1"),
    ("openrouter", "https://openrouter.ai/api/v1"),
    ("ollama", "http://localhost:11434/v1"),
    ("deepseek", "https://api.deepseek.com/v1"),
    ("groq", "https://api.groq.com/openai/v1"),
    ("together", "https://api.together.xyz/v1"),
    ("vllm", "http://localhost:8000/v1"),
    ("llamacpp", "http://localhost:8080/v1"),
];

/// The preset base URL for a provider name, if there is one.
pub fn preset_base_url(name: &str) -> Option<&'static str> {
    PROVIDER_PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, url)| *url)
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
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

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
