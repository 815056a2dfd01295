// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the OpenAI chat completions API.
//!
//! Transport errors and transient statuses are retried with a fixed delay;
//! once the attempts run out the call fails with
//! [`MnemoError::ServiceUnavailable`].

use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use mnemo_core::{MnemoError, RetryPolicy};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::sse::{self, StreamEvent};
use crate::types::{ApiErrorResponse, ChatCompletion, ChatCompletionRequest, StreamOptions};

/// Chat completions endpoint.
pub const API_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        base_url: impl Into<String>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, MnemoError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MnemoError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into(),
            retry,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Sends a non-streaming request and returns the parsed completion.
    pub async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletion, MnemoError> {
        let mut req = request.clone();
        req.stream = false;
        req.stream_options = None;

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

    /// Sends a streaming request and returns the SSE events.
    pub async fn stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, MnemoError>> + Send>>, MnemoError>
    {
        let mut req = request.clone();
        req.stream = true;
        req.stream_options = Some(StreamOptions {
            include_usage: true,
        });

        let response = self.send(&req).await?;
        Ok(sse::parse_sse_stream(response))
    }

    async fn send(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response, MnemoError> {
        let attempts = self.retry.max_attempts;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry.delay).await;
            }

            let result = self
                .client
                .post(&self.base_url)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    debug!(status = %response.status(), attempt, "OpenAI response received");
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let message = error_message(status, &body);
                    if !RetryPolicy::is_transient(status.as_u16()) {
                        return Err(MnemoError::provider(message));
                    }
                    warn!(status = %status, attempt, attempts, "transient OpenAI error");
                    last_error = message;
                }
                Err(e) => {
                    warn!(error = %e, attempt, attempts, "OpenAI request failed");
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

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_err) => format!(
            "OpenAI API error ({}): {}",
            api_err.error.type_.as_deref().unwrap_or("unknown"),
            api_err.error.message
        ),
        Err(_) => format!("API returned {status}: {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::ChatMessage;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str, attempts: u32) -> OpenAiClient {
        OpenAiClient::new(
            "test-key".into(),
            base_url,
            RetryPolicy::new(attempts, Duration::ZERO),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn test_request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage::user("Hello")],
            temperature: 0.1,
            max_tokens: 100,
            stream: false,
            stream_options: None,
            tools: vec![],
            tool_choice: None,
        }
    }

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        })
    }

    #[tokio::test]
    async fn complete_sends_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Hi there!")))
            .mount(&server)
            .await;

        let result = test_client(&server.uri(), 1).complete(&test_request()).await.unwrap();
        assert_eq!(result.choices[0].message.content.as_deref(), Some("Hi there!"));
    }

    #[tokio::test]
    async fn retries_transient_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("after retry")))
            .mount(&server)
            .await;

        let result = test_client(&server.uri(), 3).complete(&test_request()).await.unwrap();
        assert_eq!(result.choices[0].message.content.as_deref(), Some("after retry"));
    }

    #[tokio::test]
    async fn exhausted_retries_are_service_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"type": "rate_limit_error", "message": "slow down"}
            })))
            .expect(3)
            .mount(&server)
            .await;

        let err = test_client(&server.uri(), 3)
            .complete(&test_request())
            .await
            .unwrap_err();
        assert!(matches!(err, MnemoError::ServiceUnavailable { attempts: 3, .. }));
        assert_eq!(err.status_code(), 503);
        assert!(err.to_string().contains("slow down"));
    }

    #[tokio::test]
    async fn client_errors_fail_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"type": "invalid_request_error", "message": "bad model"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server.uri(), 5)
            .complete(&test_request())
            .await
            .unwrap_err();
        assert!(matches!(err, MnemoError::Provider { .. }));
        assert!(err.to_string().contains("invalid_request_error"), "got: {err}");
    }

    #[tokio::test]
    async fn unreachable_host_exhausts_retries() {
        // Port 9 (discard) is closed on test hosts.
        let err = test_client("http://127.0.0.1:9", 2)
            .complete(&test_request())
            .await
            .unwrap_err();
        assert!(matches!(err, MnemoError::ServiceUnavailable { attempts: 2, .. }));
    }
}
