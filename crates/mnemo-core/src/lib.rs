// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Mnemo agent backend.
//!
//! This crate provides the error type, the shared chat and memory types, and
//! the trait seams (providers, memory store, usage sink) that the rest of the
//! workspace is written against.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{BUDGET_EXCEEDED_MESSAGE, MnemoError};
pub use types::{
    AdapterType, ChatMessage, FunctionCall, FunctionCallMode, HealthStatus, MemoryRecord,
    Metadata, ProviderRequest, ProviderResponse, ProviderStreamChunk, RetryPolicy, Role, SearchOptions,
    StreamEventType, TRANSIENT_STATUSES, TokenUsage, UsageEvent,
};

pub use traits::{MemoryClient, PluginAdapter, ProviderAdapter, ProviderStream, UsageSink};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemo_error_variants_construct() {
        let _config = MnemoError::Config("test".into());
        let _storage = MnemoError::storage(std::io::Error::other("test"));
        let _provider = MnemoError::provider("test");
        let _unavailable = MnemoError::ServiceUnavailable {
            attempts: 3,
            message: "timeout".into(),
        };
        let _not_found = MnemoError::AdapterNotFound {
            adapter_type: "Provider".into(),
            name: "test".into(),
        };
        let _timeout = MnemoError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = MnemoError::Internal("test".into());
    }

    #[test]
    fn budget_exceeded_renders_client_message() {
        let err = MnemoError::BudgetExceeded { remaining: -12 };
        assert_eq!(err.to_string(), BUDGET_EXCEEDED_MESSAGE);
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn status_codes_follow_error_taxonomy() {
        let unavailable = MnemoError::ServiceUnavailable {
            attempts: 10,
            message: "connect refused".into(),
        };
        assert_eq!(unavailable.status_code(), 503);
        assert_eq!(MnemoError::NotFound("note".into()).status_code(), 404);
        assert_eq!(MnemoError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn role_serializes_lowercase() {
        use std::str::FromStr;

        let json = serde_json::to_string(&Role::Assistant).expect("should serialize");
        assert_eq!(json, "\"assistant\"");
        assert_eq!(Role::Function.to_string(), "function");
        assert_eq!(Role::from_str("user").expect("should parse"), Role::User);
    }

    #[test]
    fn chat_message_constructors() {
        let msg = ChatMessage::function("get_time", "12:00");
        assert_eq!(msg.role, Role::Function);
        assert_eq!(msg.name.as_deref(), Some("get_time"));

        let json = serde_json::to_value(ChatMessage::user("hi")).expect("should serialize");
        assert!(json.get("name").is_none(), "name should be skipped when absent");
    }

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 4,
            output_tokens: 6,
        };
        assert_eq!(usage.total(), 10);
    }

    #[test]
    fn memory_record_reads_created_at() {
        let mut metadata = Metadata::new();
        metadata.insert("created_at".into(), serde_json::json!(1_700_000_000.5));
        let record = MemoryRecord {
            id: "0000000000000001".into(),
            document: "doc".into(),
            metadata,
            distance: 0.1,
        };
        assert_eq!(record.created_at(), Some(1_700_000_000.5));
    }

    #[test]
    fn adapter_type_round_trips_through_strum() {
        use std::str::FromStr;

        for variant in [AdapterType::Provider, AdapterType::Memory, AdapterType::Storage] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(parsed, variant);
        }
    }

    #[test]
    fn retry_policy_classifies_statuses() {
        for status in [429, 500, 502, 503, 529] {
            assert!(RetryPolicy::is_transient(status));
        }
        assert!(!RetryPolicy::is_transient(400));
        assert!(!RetryPolicy::is_transient(401));
        assert_eq!(RetryPolicy::new(0, std::time::Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin<T: PluginAdapter>() {}
        fn _assert_provider<T: ProviderAdapter>() {}
        fn _assert_memory<T: MemoryClient>() {}
        fn _assert_usage<T: UsageSink>() {}
    }
}
