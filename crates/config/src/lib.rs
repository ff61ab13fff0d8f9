//! Configuration loading, validation, and management for mcplink.
//!
//! Loads configuration from `~/.mcplink/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use mcplink_core::provider::ReasoningEffort;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.mcplink/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Optional reasoning-effort hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Sampling temperature; service default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Max tokens per response; service default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// System prompt seeded into every conversation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Turn loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool server launch settings
    #[serde(default)]
    pub tool_server: ToolServerConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when they help answer the user's request."
        .into()
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
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("reasoning_effort", &self.reasoning_effort)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt)
            .field("agent", &self.agent)
            .field("tool_server", &self.tool_server)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model rounds per turn before giving up
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Dispatch the tool calls of one round concurrently
    #[serde(default)]
    pub parallel_tool_calls: bool,

    /// Echo tool calls and results to the operator
    #[serde(default)]
    pub show_tool_activity: bool,
}

fn default_max_rounds() -> u32 {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            parallel_tool_calls: false,
            show_tool_activity: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Interpreter override; chosen from the script extension when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,

    /// Extra arguments appended after the script path
    #[serde(default)]
    pub args: Vec<String>,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Extra environment variables for the server process
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            interpreter: None,
            args: Vec::new(),
            request_timeout_secs: default_request_timeout(),
            env: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.mcplink/config.toml).
    ///
    /// Environment overrides:
    /// - `MCPLINK_API_KEY`, then `OPENAI_API_KEY` (only when the file has no key)
    /// - `MCPLINK_BASE_URL`
    /// - `MCPLINK_MODEL`
    /// - `MCPLINK_REASONING_EFFORT`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load `path` and apply the process environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file found at {}, using defaults", path.display());
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
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = lookup("MCPLINK_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(base_url) = lookup("MCPLINK_BASE_URL") {
            self.base_url = base_url;
        }

        if let Some(model) = lookup("MCPLINK_MODEL") {
            self.model = model;
        }

        if let Some(effort) = lookup("MCPLINK_REASONING_EFFORT") {
            self.reasoning_effort = Some(effort.parse().map_err(ConfigError::ValidationError)?);
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mcplink")
    }

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

        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rounds must be at least 1".into(),
            ));
        }

        if self.tool_server.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tool_server.request_timeout_secs must be > 0".into(),
            ));
        }

        if self.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("base_url must not be empty".into()));
        }

        Ok(())
    }

    /// The API key, or the bootstrap error explaining how to provide one.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            reasoning_effort: None,
            temperature: None,
            max_tokens: None,
            system_prompt: default_system_prompt(),
            agent: AgentConfig::default(),
            tool_server: ToolServerConfig::default(),
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

    #[error("No API key configured (set MCPLINK_API_KEY or OPENAI_API_KEY, or api_key in the config file)")]
    MissingApiKey,
}

impl From<ConfigError> for mcplink_core::Error {
    fn from(e: ConfigError) -> Self {
        mcplink_core::Error::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_rounds, 25);
        assert_eq!(config.tool_server.request_timeout_secs, 30);
        assert!(!config.agent.parallel_tool_calls);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.agent.max_rounds, config.agent.max_rounds);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: Some(5.0),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_round_cap_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_rounds = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn loads_sections_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
model = "o4-mini"
reasoning_effort = "high"

[agent]
max_rounds = 4
parallel_tool_calls = true

[tool_server]
interpreter = "uv run"
args = ["--verbose"]
request_timeout_secs = 5

[tool_server.env]
TZ = "UTC"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model, "o4-mini");
        assert_eq!(config.reasoning_effort, Some(ReasoningEffort::High));
        assert_eq!(config.agent.max_rounds, 4);
        assert!(config.agent.parallel_tool_calls);
        assert_eq!(config.tool_server.interpreter.as_deref(), Some("uv run"));
        assert_eq!(config.tool_server.env.get("TZ").map(String::as_str), Some("UTC"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = [unterminated").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply_in_priority_order() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("OPENAI_API_KEY", "sk-openai"),
                ("MCPLINK_API_KEY", "sk-mcplink"),
                ("MCPLINK_MODEL", "gpt-4.1"),
                ("MCPLINK_REASONING_EFFORT", "Medium"),
            ]))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-mcplink"));
        assert_eq!(config.model, "gpt-4.1");
        assert_eq!(config.reasoning_effort, Some(ReasoningEffort::Medium));
    }

    #[test]
    fn file_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("sk-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(env(&[("OPENAI_API_KEY", "sk-env")])).unwrap();
        assert_eq!(config.require_api_key().unwrap(), "sk-file");
    }

    #[test]
    fn bad_reasoning_effort_env_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("MCPLINK_REASONING_EFFORT", "maximum")]))
            .unwrap_err();
        assert!(err.to_string().contains("maximum"));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config = AppConfig::default();
        assert!(matches!(config.require_api_key(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn debug_output_redacts_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o"));
        assert!(toml_str.contains("max_rounds"));
    }
}
