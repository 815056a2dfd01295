// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.
//!
//! Provides [`AnthropicClient`] which handles request construction,
//! authentication, streaming SSE responses, and transient error retry.

use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use mnemo_core::{MnemoError, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::sse::{self, StreamEvent};
use crate::types::{ApiErrorResponse, MessageRequest, MessageResponse};

/// Base URL for the Anthropic Messages API.
pub const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl AnthropicClient {
    pub fn new(
        api_key: &str,
        api_version: &str,
        base_url: impl Into<String>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, MnemoError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| MnemoError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(api_version).map_err(|e| {
                MnemoError::Config(format!("invalid API version header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| MnemoError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            retry,
        })
    }

    /// Sends a streaming request and returns a stream of SSE events.
    pub async fn stream_message(
        &self,
        request: &MessageRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, MnemoError>> + Send>>, MnemoError>
    {
        let mut req = request.clone();
        req.stream = true;
        let response = self.send(&req).await?;
        Ok(sse::parse_sse_stream(response))
    }

    /// Sends a non-streaming request and returns the full response.
    pub async fn complete_message(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, MnemoError> {
        let mut req = request.clone();
        req.stream = false;
        let response = self.send(&req).await?;
        let body = response.text().await.map_err(|e| MnemoError::Provider {
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;
        serde_json::from_str(&body).map_err(|e| MnemoError::Provider {
            message: format!("failed to parse API response: {e}"),
            source: Some(Box::new(e)),
        })
    }

    async fn send(&self, request: &MessageRequest) -> Result<reqwest::Response, MnemoError> {
        let attempts = self.retry.max_attempts;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry.delay).await;
            }

            match self.client.post(&self.base_url).json(request).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(status = %response.status(), attempt, "Anthropic response received");
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                        Ok(api_err) => format!(
                            "Anthropic API error ({}): {}",
                            api_err.error.type_, api_err.error.message
                        ),
                        Err(_) => format!("API returned {status}: {body}"),
                    };
                    if !RetryPolicy::is_transient(status.as_u16()) {
                        return Err(MnemoError::provider(message));
                    }
                    warn!(status = %status, attempt, attempts, "transient Anthropic error");
                    last_error = message;
                }
                Err(e) => {
                    warn!(error = %e, attempt, attempts, "Anthropic request failed");
                    last_error = format!("HTTP request failed: {e}");
                }
            }
        }

        Err(MnemoError::ServiceUnavailable {
            attempts,
            message: last_error,
        })
    }
}
