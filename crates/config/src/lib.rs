//! Configuration loading, validation, and management for agentloop.
//!
//! Loads configuration from `~/.agentloop/config.toml` with environment
//! variable overrides. Validated once at startup, then passed explicitly into
//! the gate and orchestrator constructors. Nothing reads it globally.

use agentloop_core::tool::ToolKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agentloop/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reasoning loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Memory store settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Security gate settings
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model calls per query before the loop force-terminates
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// System prompt placed first in every working conversation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// How long a dangerous call may wait for confirmation before it is
    /// treated as denied
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    /// How many previous queries the default context builder recalls
    #[serde(default = "default_context_history")]
    pub context_history: usize,
}

fn default_max_turns() -> u32 {
    10
}
fn default_system_prompt() -> String {
    "You are a helpful AI assistant.".into()
}
fn default_confirmation_timeout_secs() -> u64 {
    300
}
fn default_context_history() -> usize {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            system_prompt: default_system_prompt(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            context_history: default_context_history(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum entries per bucket
    #[serde(default = "default_memory_max_size")]
    pub max_size: usize,
}

fn default_memory_max_size() -> usize {
    1000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_size: default_memory_max_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Tool names that always require confirmation
    #[serde(default = "default_dangerous_tools")]
    pub dangerous_tools: Vec<String>,

    /// Tool names whose `command` argument is a shell command line
    #[serde(default = "default_shell_tools")]
    pub shell_tools: Vec<String>,
}

fn default_dangerous_tools() -> Vec<String> {
    ToolKind::default_dangerous_names()
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_shell_tools() -> Vec<String> {
    ToolKind::shell_names()
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            dangerous_tools: default_dangerous_tools(),
            shell_tools: default_shell_tools(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentloop/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `AGENTLOOP_MAX_TURNS`
    /// - `AGENTLOOP_MEMORY_MAX_SIZE`
    /// - `AGENTLOOP_SYSTEM_PROMPT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from a variable lookup (the process environment in
    /// [`AppConfig::load`]).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("AGENTLOOP_MAX_TURNS") {
            self.agent.max_turns = parse_override("AGENTLOOP_MAX_TURNS", &raw)?;
        }
        if let Some(raw) = lookup("AGENTLOOP_MEMORY_MAX_SIZE") {
            self.memory.max_size = parse_override("AGENTLOOP_MEMORY_MAX_SIZE", &raw)?;
        }
        if let Some(prompt) = lookup("AGENTLOOP_SYSTEM_PROMPT") {
            self.agent.system_prompt = prompt;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentloop")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be at least 1".into(),
            ));
        }

        if self.agent.confirmation_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.confirmation_timeout_secs must be at least 1".into(),
            ));
        }

        if self.memory.max_size == 0 {
            return Err(ConfigError::ValidationError(
                "memory.max_size must be at least 1".into(),
            ));
        }

        if self.security.shell_tools.iter().any(|t| t.trim().is_empty())
            || self.security.dangerous_tools.iter().any(|t| t.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(
                "security tool names must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidOverride {
        key: key.to_string(),
        value: raw.to_string(),
    })
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

    #[error("Invalid value for {key}: '{value}'")]
    InvalidOverride { key: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
