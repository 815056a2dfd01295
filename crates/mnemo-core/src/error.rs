// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Mnemo agent backend.

use thiserror::Error;

/// Message returned to the client when the context budget is overrun.
pub const BUDGET_EXCEEDED_MESSAGE: &str =
    "Token limit exceeded. Please reduce the length of your message or adjust memory settings.";

/// The primary error type used across all Mnemo crates.
#[derive(Debug, Error)]
pub enum MnemoError {
    /// Configuration errors (invalid TOML, missing keys, unusable settings files).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// LLM provider errors (API failure, malformed response, rejected request).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider stayed unreachable after every retry attempt.
    #[error("service unavailable after {attempts} attempts: {message}")]
    ServiceUnavailable { attempts: u32, message: String },

    /// Remaining context budget went negative after accounting.
    #[error("{}", BUDGET_EXCEEDED_MESSAGE)]
    BudgetExceeded { remaining: i64 },

    /// Requested adapter was not found in the registry.
    #[error("adapter not found: {adapter_type}/{name}")]
    AdapterNotFound { adapter_type: String, name: String },

    /// A named resource (user, note, memory) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MnemoError {
    /// HTTP-equivalent status code for surfacing the error to a client.
    pub fn status_code(&self) -> u16 {
        match self {
            MnemoError::BudgetExceeded { .. } | MnemoError::Config(_) => 400,
            MnemoError::NotFound(_) | MnemoError::AdapterNotFound { .. } => 404,
            MnemoError::ServiceUnavailable { .. } | MnemoError::Timeout { .. } => 503,
            MnemoError::Storage { .. } | MnemoError::Provider { .. } | MnemoError::Internal(_) => {
                500
            }
        }
    }

    /// Shorthand for a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        MnemoError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps any storage-layer error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MnemoError::Storage {
            source: Box::new(err),
        }
    }
}

impl From<std::io::Error> for MnemoError {
    fn from(err: std::io::Error) -> Self {
        MnemoError::Storage {
            source: Box::new(err),
        }
    }
}

impl From<serde_json::Error> for MnemoError {
    fn from(err: serde_json::Error) -> Self {
        MnemoError::Internal(format!("json error: {err}"))
    }
}
