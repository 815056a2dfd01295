// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by providers, the memory pipeline, and the recorder.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Free-form metadata attached to a memory entry.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Memory,
    Storage,
}

// --- Chat types ---

/// Author role of a chat turn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Result of a function call, fed back to the model.
    Function,
}

/// A single role-tagged message sent to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Function name for `Role::Function` turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
        }
    }

    pub fn function(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: content.into(),
            name: Some(name.into()),
        }
    }
}

/// Whether the model may call a function on this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FunctionCallMode {
    #[default]
    Auto,
    None,
}

/// A request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Model identifier (e.g. "gpt-4o", "claude-3-opus-20240229").
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    /// Function schemas in `{"type": "function", "function": {...}}` form.
    pub tools: Vec<serde_json::Value>,
    pub function_call: FunctionCallMode,
}

/// A function invocation requested by the model.
///
/// `arguments` is kept raw: a JSON string for OpenAI-style providers,
/// an object for Anthropic tool use. Repair happens in the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Token usage counters reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A full response from an LLM provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub function_call: Option<FunctionCall>,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

/// Kind of event carried by a [`ProviderStreamChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventType {
    /// Incremental text.
    TextDelta,
    /// A fully assembled function call.
    FunctionCall,
    /// Usage counters (may arrive mid-stream or at the end).
    Usage,
    /// End of the response.
    Stop,
}

/// A single chunk from a streaming provider response.
#[derive(Debug, Clone)]
pub struct ProviderStreamChunk {
    pub event_type: StreamEventType,
    pub text: Option<String>,
    pub function_call: Option<FunctionCall>,
    pub usage: Option<TokenUsage>,
}

impl ProviderStreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            event_type: StreamEventType::TextDelta,
            text: Some(text.into()),
            function_call: None,
            usage: None,
        }
    }

    pub fn usage(usage: TokenUsage) -> Self {
        Self {
            event_type: StreamEventType::Usage,
            text: None,
            function_call: None,
            usage: Some(usage),
        }
    }

    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            event_type: StreamEventType::FunctionCall,
            text: None,
            function_call: Some(call),
            usage: None,
        }
    }

    pub fn stop() -> Self {
        Self {
            event_type: StreamEventType::Stop,
            text: None,
            function_call: None,
            usage: None,
        }
    }
}

// --- Memory types ---

/// A memory entry as returned by the memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Store identifier, 16 digits zero-padded.
    pub id: String,
    pub document: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Distance to the query; 0.0 for non-search lookups.
    #[serde(default)]
    pub distance: f64,
}

impl MemoryRecord {
    /// Unix timestamp from the `created_at` metadata, if present.
    pub fn created_at(&self) -> Option<f64> {
        self.metadata.get("created_at").and_then(|v| v.as_f64())
    }
}

/// Filters for a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub min_distance: f64,
    pub max_distance: f64,
    pub contains_text: Option<String>,
    pub n_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_distance: 0.0,
            max_distance: 1.0,
            contains_text: None,
            n_results: 5,
        }
    }
}

impl SearchOptions {
    /// Results closer than `max_distance`, capped at `n_results`.
    pub fn within(max_distance: f64, n_results: usize) -> Self {
        Self {
            max_distance,
            n_results,
            ..Self::default()
        }
    }
}

// --- Provider retries ---

/// HTTP statuses worth retrying.
pub const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 529];

/// Fixed-delay retry policy used by the HTTP providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn is_transient(status: u16) -> bool {
        TRANSIENT_STATUSES.contains(&status)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(5))
    }
}

// --- Usage recording ---

/// One provider call worth of usage, handed to a [`crate::UsageSink`].
#[derive(Debug, Clone)]
pub struct UsageEvent {
    pub username: String,
    pub model: String,
    pub usage: TokenUsage,
    /// Wall time of the provider call.
    pub elapsed: Duration,
    /// True for internal memory/notes calls rather than user-facing replies.
    pub brain: bool,
}
