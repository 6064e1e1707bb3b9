//! Configuration loading, validation, and management for devloop.
//!
//! Loads configuration from `~/.devloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.devloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Turn loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Dev-server supervision settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Project command conventions
    #[serde(default)]
    pub project: ProjectConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_temperature() -> f32 {
    0.6
}
fn default_max_tokens() -> u32 {
    8192
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
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("server", &self.server)
            .field("project", &self.project)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// `[agent]`: turn loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Consecutive automatic fix attempts allowed per failing command
    #[serde(default = "default_max_fix_attempts")]
    pub max_fix_attempts: u32,

    /// Model/tool round trips allowed per user utterance
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Pause before sending tool results back, for upstream rate limits
    #[serde(default = "default_tool_response_delay_ms")]
    pub tool_response_delay_ms: u64,
}

fn default_max_fix_attempts() -> u32 {
    3
}
fn default_max_tool_rounds() -> u32 {
    25
}
fn default_tool_response_delay_ms() -> u64 {
    1000
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_fix_attempts: default_max_fix_attempts(),
            max_tool_rounds: default_max_tool_rounds(),
            tool_response_delay_ms: default_tool_response_delay_ms(),
        }
    }
}

/// `[server]`: how the background dev server is watched and stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Default monitoring window after start
    #[serde(default = "default_monitor_secs")]
    pub monitor_secs: u64,

    /// Grace period between terminate and kill
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    /// Case-insensitive substrings meaning the build finished
    #[serde(default = "default_ready_markers")]
    pub ready_markers: Vec<String>,

    /// Substrings on stderr meaning the build failed
    #[serde(default = "default_error_markers")]
    pub error_markers: Vec<String>,

    /// Lines of output retained per stream
    #[serde(default = "default_output_buffer_lines")]
    pub output_buffer_lines: usize,
}

fn default_monitor_secs() -> u64 {
    20
}
fn default_stop_grace_secs() -> u64 {
    5
}
fn default_ready_markers() -> Vec<String> {
    vec!["Compiled successfully".into(), "successfully built".into()]
}
fn default_error_markers() -> Vec<String> {
    vec!["ERROR".into(), "Error".into()]
}
fn default_output_buffer_lines() -> usize {
    2000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            monitor_secs: default_monitor_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            ready_markers: default_ready_markers(),
            error_markers: default_error_markers(),
            output_buffer_lines: default_output_buffer_lines(),
        }
    }
}

/// `[project]`: commands with special meaning to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Command prefix that scaffolds a new project and moves the root
    #[serde(default = "default_create_command")]
    pub create_command: String,

    /// Long-running serve command, mentioned in intent rewrites
    #[serde(default = "default_serve_command")]
    pub serve_command: String,
}

fn default_create_command() -> String {
    "ng new".into()
}
fn default_serve_command() -> String {
    "ng serve".into()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            create_command: default_create_command(),
            serve_command: default_serve_command(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.devloop/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `DEVLOOP_API_KEY` (highest priority)
    /// - `GEMINI_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
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
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("DEVLOOP_API_KEY")
                .or_else(|| lookup("GEMINI_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("DEVLOOP_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("DEVLOOP_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".devloop")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_fix_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_fix_attempts must be at least 1".into(),
            ));
        }

        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_rounds must be at least 1".into(),
            ));
        }

        if self.server.output_buffer_lines == 0 {
            return Err(ConfigError::ValidationError(
                "server.output_buffer_lines must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentSettings::default(),
            server: ServerConfig::default(),
            project: ProjectConfig::default(),
            providers: HashMap::new(),
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
