// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Mnemo agent backend.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Mnemo configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MnemoConfig {
    /// Agent identity, logging, and user data layout.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Relational store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// OpenAI API settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Anthropic API settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Retry, timeout, and sampling settings shared by all providers.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Chain-of-thought plan mode settings.
    #[serde(default)]
    pub cot: CotConfig,
}

impl MnemoConfig {
    /// OpenAI key from config, falling back to `OPENAI_API_KEY`.
    pub fn openai_api_key(&self) -> Option<String> {
        resolve_key(&self.openai.api_key, "OPENAI_API_KEY")
    }

    /// Anthropic key from config, falling back to `ANTHROPIC_API_KEY`.
    pub fn anthropic_api_key(&self) -> Option<String> {
        resolve_key(&self.anthropic.api_key, "ANTHROPIC_API_KEY")
    }

    /// Model selected for new users: Claude when an Anthropic key is configured.
    pub fn default_active_model(&self) -> String {
        if self.anthropic_api_key().is_some() {
            self.agent.default_model_anthropic.clone()
        } else {
            self.agent.default_model_openai.clone()
        }
    }
}

fn resolve_key(configured: &Option<String>, env_var: &str) -> Option<String> {
    configured
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var(env_var).ok().filter(|k| !k.is_empty()))
}

/// Agent identity and user data configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the agent.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Root directory holding one sub-directory per user.
    #[serde(default = "default_users_dir")]
    pub users_dir: String,

    /// Active model for new users when only OpenAI is available.
    #[serde(default = "default_model_openai")]
    pub default_model_openai: String,

    /// Active model for new users when an Anthropic key is configured.
    #[serde(default = "default_model_anthropic")]
    pub default_model_anthropic: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            users_dir: default_users_dir(),
            default_model_openai: default_model_openai(),
            default_model_anthropic: default_model_anthropic(),
        }
    }
}

fn default_agent_name() -> String {
    "mnemo".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_users_dir() -> String {
    "users".to_string()
}

fn default_model_openai() -> String {
    "gpt-4o".to_string()
}

fn default_model_anthropic() -> String {
    "claude-3-opus-20240229".to_string()
}

/// Relational store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Production mode: the database file must already exist and
    /// foreign keys plus secure deletion are enforced.
    #[serde(default)]
    pub production: bool,

    /// Enable WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            production: false,
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("mnemo").join("mnemo.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("mnemo.db"))
        .display()
        .to_string()
}

fn default_true() -> bool {
    true
}

/// OpenAI chat-completions configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// API key. Falls back to `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Chat completions endpoint.
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

/// Anthropic messages configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// API key. Falls back to `ANTHROPIC_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Value of the `anthropic-version` header.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Messages endpoint.
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_version: default_api_version(),
            base_url: default_anthropic_base_url(),
        }
    }
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

/// Provider retry and sampling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Total attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sampling temperature for every model call.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
        }
    }
}

impl ProviderConfig {
    pub fn retry_policy(&self) -> mnemo_core::RetryPolicy {
        mnemo_core::RetryPolicy::new(
            self.max_attempts,
            std::time::Duration::from_secs(self.retry_delay_secs),
        )
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_temperature() -> f32 {
    0.1
}

/// Chain-of-thought plan mode configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CotConfig {
    /// Planning rounds allowed per request before the trace is returned as-is.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

impl Default for CotConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_max_rounds() -> u32 {
    2
}
