// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI chat-completions provider adapter for Mnemo.
//!
//! Implements [`ProviderAdapter`] for `gpt*` models: single-shot completion
//! and SSE streaming, with function calls surfaced as raw argument text.

pub mod client;
pub mod sse;
pub mod types;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use mnemo_config::MnemoConfig;
use mnemo_core::{
    AdapterType, FunctionCall, FunctionCallMode, HealthStatus, MnemoError, PluginAdapter,
    ProviderAdapter, ProviderRequest, ProviderResponse, ProviderStream, ProviderStreamChunk,
    TokenUsage,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::OpenAiClient;
use crate::sse::StreamEvent;
use crate::types::{ApiUsage, ChatCompletionRequest};

pub struct OpenAiProvider {
    client: OpenAiClient,
}

impl OpenAiProvider {
    /// Builds the provider from configuration.
    ///
    /// The key comes from `openai.api_key`, then `OPENAI_API_KEY`.
    pub fn new(config: &MnemoConfig) -> Result<Self, MnemoError> {
        let api_key = config.openai_api_key().ok_or_else(|| {
            MnemoError::Config(
                "OpenAI API key not found: set openai.api_key or OPENAI_API_KEY".into(),
            )
        })?;
        let client = OpenAiClient::new(
            api_key,
            config.openai.base_url.clone(),
            config.provider.retry_policy(),
            config.provider.timeout(),
        )?;
        info!(base_url = %config.openai.base_url, "OpenAI provider initialized");
        Ok(Self { client })
    }

    pub fn with_client(client: OpenAiClient) -> Self {
        Self { client }
    }
}

/// Maps a provider request onto the chat completions wire format.
pub fn to_completion_request(request: &ProviderRequest) -> ChatCompletionRequest {
    let tool_choice = (!request.tools.is_empty()).then(|| match request.function_call {
        FunctionCallMode::Auto => "auto".to_string(),
        FunctionCallMode::None => "none".to_string(),
    });
    ChatCompletionRequest {
        model: request.model.clone(),
        messages: request.messages.clone(),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream: request.stream,
        stream_options: None,
        tools: request.tools.clone(),
        tool_choice,
    }
}

fn usage(api: Option<ApiUsage>) -> TokenUsage {
    let api = api.unwrap_or_default();
    TokenUsage {
        input_tokens: api.prompt_tokens,
        output_tokens: api.completion_tokens,
    }
}

fn raw_call(name: String, arguments: String) -> FunctionCall {
    FunctionCall {
        name,
        arguments: Value::String(arguments),
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
impl ProviderAdapter for OpenAiProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, MnemoError> {
        let completion = self.client.complete(&to_completion_request(&request)).await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| MnemoError::provider("no choices in OpenAI response"))?;

        let function_call = choice
            .message
            .first_call()
            .map(|c| raw_call(c.name.clone(), c.arguments.clone()));

        Ok(ProviderResponse {
            id: completion.id,
            content: choice.message.content.unwrap_or_default(),
            model: completion.model,
            function_call,
            stop_reason: choice.finish_reason,
            usage: usage(completion.usage),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, MnemoError> {
        let events = self.client.stream(&to_completion_request(&request)).await?;
        let chunks = events
            .scan(StreamAccumulator::default(), |acc, event| {
                let out = match event {
                    Ok(event) => acc.on_event(event),
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(stream::iter(out)))
            })
            .flatten();
        Ok(Box::pin(chunks))
    }
}

/// Folds streamed deltas into provider chunks.
///
/// Function-call name and argument fragments are buffered and emitted as a
/// single chunk once the choice finishes.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    call: Option<(String, String)>,
    stopped: bool,
}

impl StreamAccumulator {
    pub fn on_event(&mut self, event: StreamEvent) -> Vec<Result<ProviderStreamChunk, MnemoError>> {
        let mut out = Vec::new();
        let chunk = match event {
            StreamEvent::Chunk(chunk) => chunk,
            StreamEvent::Done => {
                self.flush_call(&mut out);
                if !self.stopped {
                    self.stopped = true;
                    out.push(Ok(ProviderStreamChunk::stop()));
                }
                return out;
            }
        };

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                out.push(Ok(ProviderStreamChunk::text(text)));
            }
            let fragments = choice
                .delta
                .tool_calls
                .into_iter()
                .flatten()
                .filter(|d| d.index == 0)
                .filter_map(|d| d.function)
                .chain(choice.delta.function_call);
            for fragment in fragments {
                let (name, arguments) = self.call.get_or_insert_with(Default::default);
                if let Some(part) = fragment.name {
                    name.push_str(&part);
                }
                if let Some(part) = fragment.arguments {
                    arguments.push_str(&part);
                }
            }
            if choice.finish_reason.is_some() {
                self.flush_call(&mut out);
            }
        }

        if let Some(api) = chunk.usage {
            out.push(Ok(ProviderStreamChunk::usage(usage(Some(api)))));
        }
        out
    }

    fn flush_call(&mut self, out: &mut Vec<Result<ProviderStreamChunk, MnemoError>>) {
        if let Some((name, arguments)) = self.call.take() {
            if name.is_empty() {
                warn!(arguments = %arguments, "streamed function call without a name, dropped");
                return;
            }
            out.push(Ok(ProviderStreamChunk::function_call(raw_call(
                name, arguments,
            ))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::parse_event_data;
    use mnemo_core::{ChatMessage, RetryPolicy, StreamEventType};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(uri: &str) -> OpenAiProvider {
        let client = OpenAiClient::new(
            "k".into(),
            uri,
            RetryPolicy::new(1, Duration::ZERO),
            Duration::from_secs(5),
        )
        .unwrap();
        OpenAiProvider::with_client(client)
    }

    fn request(stream: bool, tools: Vec<Value>) -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4o".into(),
            messages: vec![
                ChatMessage::system("sys"),
                ChatMessage::user("what time is it"),
                ChatMessage::function("get_current_time", "12:00"),
            ],
            temperature: 0.1,
            max_tokens: 256,
            stream,
            tools,
            function_call: FunctionCallMode::Auto,
        }
    }

    fn time_tool() -> Value {
        json!({"type": "function", "function": {"name": "get_current_time",
            "description": "time", "parameters": {"type": "object", "properties": {}}}})
    }

    fn feed(acc: &mut StreamAccumulator, data: &str) -> Vec<ProviderStreamChunk> {
        acc.on_event(parse_event_data(data).unwrap())
            .into_iter()
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn tool_choice_follows_function_call_mode() {
        let mut req = request(false, vec![time_tool()]);
        assert_eq!(to_completion_request(&req).tool_choice.as_deref(), Some("auto"));
        req.function_call = FunctionCallMode::None;
        assert_eq!(to_completion_request(&req).tool_choice.as_deref(), Some("none"));
        req.tools.clear();
        assert_eq!(to_completion_request(&req).tool_choice, None);
    }

    #[test]
    fn accumulator_joins_tool_call_fragments() {
        let mut acc = StreamAccumulator::default();
        assert!(feed(&mut acc, r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"get_current_time","arguments":"{\"a\""}}]}}]}"#).is_empty());
        assert!(feed(&mut acc, r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":": 1}"}}]}}]}"#).is_empty());
        let out = feed(&mut acc, r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#);
        assert_eq!(out.len(), 1);
        let call = out[0].function_call.clone().unwrap();
        assert_eq!(call.name, "get_current_time");
        assert_eq!(call.arguments, Value::String("{\"a\": 1}".into()));

        let tail = feed(&mut acc, "[DONE]");
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].event_type, StreamEventType::Stop);
    }

    #[test]
    fn accumulator_handles_legacy_function_call_deltas() {
        let mut acc = StreamAccumulator::default();
        feed(&mut acc, r#"{"choices":[{"delta":{"function_call":{"name":"read_notes","arguments":"{}"}}}]}"#);
        let out = feed(&mut acc, "[DONE]");
        assert_eq!(out[0].event_type, StreamEventType::FunctionCall);
        assert_eq!(out[1].event_type, StreamEventType::Stop);
    }

    #[tokio::test]
    async fn complete_returns_raw_function_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "tool_choice": "auto",
                "messages": [{"role": "system"}, {"role": "user"},
                    {"role": "function", "name": "get_current_time"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-2", "model": "gpt-4o",
                "choices": [{"message": {"content": null, "tool_calls": [{"id": "c1",
                    "type": "function", "function": {"name": "get_current_time",
                    "arguments": "{'tz': 'UTC'}"}}]}, "finish_reason": "tool_calls"}],
                "usage": {"prompt_tokens": 30, "completion_tokens": 4}
            })))
            .mount(&server)
            .await;

        let resp = provider(&server.uri())
            .complete(request(false, vec![time_tool()]))
            .await
            .unwrap();
        assert_eq!(resp.content, "");
        let call = resp.function_call.unwrap();
        assert_eq!(call.arguments, Value::String("{'tz': 'UTC'}".into()));
        assert_eq!(resp.usage.total(), 34);
    }

    #[tokio::test]
    async fn stream_yields_text_usage_and_stop() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":2}}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": true, "stream_options": {"include_usage": true}})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let stream = provider(&server.uri()).stream(request(true, vec![])).await.unwrap();
        let chunks: Vec<_> = stream.map(Result::unwrap).collect().await;

        let text: String = chunks.iter().filter_map(|c| c.text.clone()).collect();
        assert_eq!(text, "Hello world");
        let usage = chunks.iter().find_map(|c| c.usage).unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(chunks.last().unwrap().event_type, StreamEventType::Stop);
    }
}
