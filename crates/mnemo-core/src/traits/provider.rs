// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for hosted chat-completion APIs.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::MnemoError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse, ProviderStreamChunk};

/// Boxed stream of provider chunks.
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<ProviderStreamChunk, MnemoError>> + Send>>;

/// Adapter for LLM provider integrations.
///
/// Implementations own their retry policy: transport errors and transient
/// HTTP statuses are retried with a fixed delay before surfacing
/// [`MnemoError::ServiceUnavailable`].
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, MnemoError>;

    /// Sends a completion request and returns a stream of response chunks.
    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, MnemoError>;
}
