// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted LLM provider for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with pre-configured replies and
//! records every request it receives, so tests can assert on the exact
//! payloads the pipeline produced.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Mutex;

use mnemo_core::{
    AdapterType, FunctionCall, HealthStatus, MnemoError, PluginAdapter, ProviderAdapter,
    ProviderRequest, ProviderResponse, ProviderStream, ProviderStreamChunk, Role, TokenUsage,
};

/// Usage reported for every mock call.
pub const MOCK_USAGE: TokenUsage = TokenUsage {
    input_tokens: 10,
    output_tokens: 20,
};

/// One scripted reply.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    FunctionCall {
        name: String,
        arguments: serde_json::Value,
    },
    /// The call fails with a provider error.
    Error(String),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    /// A function call whose arguments arrive as a raw string.
    pub fn call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        MockReply::FunctionCall {
            name: name.into(),
            arguments: serde_json::Value::String(arguments.into()),
        }
    }
}

type Matcher = Box<dyn Fn(&ProviderRequest) -> bool + Send + Sync>;

struct Route {
    matcher: Matcher,
    replies: VecDeque<MockReply>,
    /// Serve the front reply forever instead of popping it.
    repeat: bool,
}

#[derive(Default)]
struct Script {
    routes: Vec<Route>,
    queue: VecDeque<MockReply>,
    requests: Vec<ProviderRequest>,
}

impl Script {
    fn next(&mut self, request: &ProviderRequest) -> MockReply {
        self.requests.push(request.clone());
        // One-shot routes win over standing ones.
        for repeat in [false, true] {
            for route in self.routes.iter_mut().filter(|r| r.repeat == repeat) {
                if route.replies.is_empty() || !(route.matcher)(request) {
                    continue;
                }
                let reply = if repeat {
                    route.replies.front().cloned()
                } else {
                    route.replies.pop_front()
                };
                if let Some(reply) = reply {
                    return reply;
                }
            }
        }
        self.queue
            .pop_front()
            .unwrap_or_else(|| MockReply::text("mock response"))
    }
}

/// A mock LLM provider that plays back scripted replies.
///
/// Routed replies (matched on the request) are served first; otherwise
/// replies are popped from a FIFO queue. When both are exhausted, a default
/// "mock response" text is returned.
#[derive(Clone, Default)]
pub struct MockProvider {
    script: Arc<Mutex<Script>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock provider pre-loaded with text replies.
    pub fn with_responses(responses: Vec<String>) -> Self {
        let script = Script {
            queue: responses.into_iter().map(MockReply::Text).collect(),
            ..Script::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    /// Add a reply to the end of the queue.
    pub async fn push(&self, reply: MockReply) {
        self.script.lock().await.queue.push_back(reply);
    }

    /// Serve `replies` to requests matching `matcher`, in order.
    pub async fn route<F>(&self, matcher: F, replies: Vec<MockReply>)
    where
        F: Fn(&ProviderRequest) -> bool + Send + Sync + 'static,
    {
        self.script.lock().await.routes.push(Route {
            matcher: Box::new(matcher),
            replies: replies.into(),
            repeat: false,
        });
    }

    /// Answer every request whose system turn contains `needle` with `reply`.
    ///
    /// One-shot routes still take precedence.
    pub async fn always_system(&self, needle: &str, reply: MockReply) {
        let needle = needle.to_string();
        self.script.lock().await.routes.push(Route {
            matcher: Box::new(move |req| system_contains(req, &needle)),
            replies: VecDeque::from([reply]),
            repeat: true,
        });
    }

    /// Serve `replies` to requests whose system turn contains `needle`.
    pub async fn route_system(&self, needle: &str, replies: Vec<MockReply>) {
        let needle = needle.to_string();
        self.route(move |req| system_contains(req, &needle), replies)
            .await;
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.script.lock().await.requests.clone()
    }

    async fn next_reply(&self, request: &ProviderRequest) -> MockReply {
        self.script.lock().await.next(request)
    }
}

fn system_contains(request: &ProviderRequest, needle: &str) -> bool {
    request
        .messages
        .iter()
        .any(|m| m.role == Role::System && m.content.contains(needle))
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemoError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, MnemoError> {
        let (content, function_call) = match self.next_reply(&request).await {
            MockReply::Text(text) => (text, None),
            MockReply::FunctionCall { name, arguments } => {
                (String::new(), Some(FunctionCall { name, arguments }))
            }
            MockReply::Error(message) => return Err(MnemoError::provider(message)),
        };
        Ok(ProviderResponse {
            id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
            content,
            model: request.model,
            stop_reason: Some(
                if function_call.is_some() {
                    "function_call"
                } else {
                    "stop"
                }
                .to_string(),
            ),
            function_call,
            usage: MOCK_USAGE,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, MnemoError> {
        let mut chunks = Vec::new();
        match self.next_reply(&request).await {
            MockReply::Text(text) => {
                // Two deltas so consumers must accumulate.
                let mid = text
                    .char_indices()
                    .nth(text.chars().count() / 2)
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                let (head, tail) = text.split_at(mid);
                for part in [head, tail].into_iter().filter(|p| !p.is_empty()) {
                    chunks.push(Ok(ProviderStreamChunk::text(part)));
                }
            }
            MockReply::FunctionCall { name, arguments } => {
                chunks.push(Ok(ProviderStreamChunk::function_call(FunctionCall {
                    name,
                    arguments,
                })));
            }
            MockReply::Error(message) => return Err(MnemoError::provider(message)),
        }
        chunks.push(Ok(ProviderStreamChunk::usage(MOCK_USAGE)));
        chunks.push(Ok(ProviderStreamChunk::stop()));
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use mnemo_core::{ChatMessage, FunctionCallMode, StreamEventType};

    fn request(system: &str) -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage::system(system), ChatMessage::user("hi")],
            temperature: 0.1,
            max_tokens: 100,
            stream: false,
            tools: vec![],
            function_call: FunctionCallMode::Auto,
        }
    }

    #[tokio::test]
    async fn default_response_when_queue_empty() {
        let provider = MockProvider::new();
        let resp = provider.complete(request("sys")).await.unwrap();
        assert_eq!(resp.content, "mock response");
        assert_eq!(resp.usage, MOCK_USAGE);
    }

    #[tokio::test]
    async fn queued_responses_returned_in_order() {
        let provider = MockProvider::with_responses(vec!["first".into(), "second".into()]);
        assert_eq!(provider.complete(request("s")).await.unwrap().content, "first");
        assert_eq!(provider.complete(request("s")).await.unwrap().content, "second");
        assert_eq!(provider.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn routes_take_precedence_over_queue() {
        let provider = MockProvider::with_responses(vec!["queued".into()]);
        provider
            .route_system("retriever", vec![MockReply::text("routed")])
            .await;

        assert_eq!(provider.complete(request("a retriever")).await.unwrap().content, "routed");
        // Route exhausted, falls through to the queue.
        assert_eq!(provider.complete(request("a retriever")).await.unwrap().content, "queued");
    }

    #[tokio::test]
    async fn standing_routes_repeat_after_one_shots() {
        let provider = MockProvider::new();
        provider.always_system("retriever", MockReply::text("none")).await;
        provider
            .route_system("retriever", vec![MockReply::text("once")])
            .await;

        assert_eq!(provider.complete(request("retriever")).await.unwrap().content, "once");
        for _ in 0..3 {
            assert_eq!(provider.complete(request("retriever")).await.unwrap().content, "none");
        }
        assert_eq!(provider.complete(request("other")).await.unwrap().content, "mock response");
    }

    #[tokio::test]
    async fn function_calls_and_errors() {
        let provider = MockProvider::new();
        provider.push(MockReply::call("get_current_time", "{}")).await;
        provider.push(MockReply::Error("boom".into())).await;

        let resp = provider.complete(request("s")).await.unwrap();
        assert_eq!(resp.function_call.unwrap().name, "get_current_time");
        assert!(provider.complete(request("s")).await.is_err());
    }

    #[tokio::test]
    async fn stream_splits_text_and_reports_usage() {
        let provider = MockProvider::with_responses(vec!["streamed text".into()]);
        let mut stream = provider.stream(request("s")).await.unwrap();
        let mut events = Vec::new();
        while let Some(chunk) = stream.next().await {
            events.push(chunk.unwrap());
        }
        let text: String = events.iter().filter_map(|e| e.text.clone()).collect();
        assert_eq!(text, "streamed text");
        assert_eq!(events.len(), 4);
        assert_eq!(events[2].event_type, StreamEventType::Usage);
        assert_eq!(events[3].event_type, StreamEventType::Stop);
    }
}
