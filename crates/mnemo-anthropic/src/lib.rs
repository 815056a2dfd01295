// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Claude provider adapter for Mnemo.
//!
//! This crate implements [`ProviderAdapter`] for the Anthropic Messages API,
//! providing both single-shot completion and streaming SSE responses. Chat
//! turns are converted on the way out: system turns are hoisted into the
//! `system` field, function results become assistant turns, and tool schemas
//! are rewritten into `input_schema` form.

pub mod client;
pub mod sse;
pub mod types;

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use mnemo_config::MnemoConfig;
use mnemo_core::{
    AdapterType, FunctionCall, FunctionCallMode, HealthStatus, MnemoError, PluginAdapter,
    ProviderAdapter, ProviderRequest, ProviderResponse, ProviderStream, ProviderStreamChunk, Role,
    TokenUsage,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::AnthropicClient;
use crate::sse::StreamEvent;
use crate::types::{
    ApiMessage, MessageRequest, ResponseContentBlock, SseDelta, ToolDefinition,
};

/// Anthropic Claude provider implementing [`ProviderAdapter`].
pub struct AnthropicProvider {
    client: AnthropicClient,
}

impl AnthropicProvider {
    /// Builds the provider from configuration.
    ///
    /// The key comes from `anthropic.api_key`, then `ANTHROPIC_API_KEY`.
    pub fn new(config: &MnemoConfig) -> Result<Self, MnemoError> {
        let api_key = config.anthropic_api_key().ok_or_else(|| {
            MnemoError::Config(
                "Anthropic API key not found. Set anthropic.api_key in config or ANTHROPIC_API_KEY environment variable.".into(),
            )
        })?;
        let client = AnthropicClient::new(
            &api_key,
            &config.anthropic.api_version,
            config.anthropic.base_url.clone(),
            config.provider.retry_policy(),
            config.provider.timeout(),
        )?;
        info!(api_version = %config.anthropic.api_version, "Anthropic provider initialized");
        Ok(Self { client })
    }

    pub fn with_client(client: AnthropicClient) -> Self {
        Self { client }
    }
}

/// Converts a [`ProviderRequest`] into a Messages API request.
///
/// Consecutive turns of the same role are joined, since the API requires
/// alternating roles.
pub fn to_message_request(request: &ProviderRequest) -> MessageRequest {
    let mut system: Vec<&str> = Vec::new();
    let mut messages: Vec<ApiMessage> = Vec::new();

    for message in &request.messages {
        let role = match message.role {
            Role::System => {
                system.push(&message.content);
                continue;
            }
            Role::User => "user",
            Role::Assistant | Role::Function => "assistant",
        };
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push('\n');
                last.content.push_str(&message.content);
            }
            _ => messages.push(ApiMessage {
                role: role.to_string(),
                content: message.content.clone(),
            }),
        }
    }

    let tools = match request.function_call {
        FunctionCallMode::Auto => request.tools.iter().filter_map(to_tool_definition).collect(),
        FunctionCallMode::None => Vec::new(),
    };

    MessageRequest {
        model: request.model.clone(),
        messages,
        system: (!system.is_empty()).then(|| system.join("\n")),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        stream: request.stream,
        tools,
    }
}

/// `{"type":"function","function":{name, description, parameters}}` to
/// `{name, description, input_schema}`.
pub fn to_tool_definition(schema: &Value) -> Option<ToolDefinition> {
    let function = schema.get("function").unwrap_or(schema);
    let name = function.get("name").and_then(Value::as_str);
    let Some(name) = name else {
        warn!(schema = %schema, "tool schema without a name, skipped");
        return None;
    };
    Some(ToolDefinition {
        name: name.to_string(),
        description: function
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        input_schema: function
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
    })
}

#[async_trait]
impl PluginAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemoError> {
        // Avoid spending tokens on health checks.
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, MnemoError> {
        let response = self.client.complete_message(&to_message_request(&request)).await?;

        let mut content = String::new();
        let mut function_call = None;
        for block in response.content {
            match block {
                ResponseContentBlock::Text { text } => content.push_str(&text),
                ResponseContentBlock::ToolUse { name, input, .. } => {
                    if function_call.is_none() {
                        function_call = Some(FunctionCall {
                            name,
                            arguments: input,
                        });
                    }
                }
            }
        }

        Ok(ProviderResponse {
            id: response.id,
            content,
            model: response.model,
            function_call,
            stop_reason: response.stop_reason,
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, MnemoError> {
        let events = self
            .client
            .stream_message(&to_message_request(&request))
            .await?;
        let chunks = events
            .scan(StreamState::default(), |state, event| {
                let out = match event {
                    Ok(event) => state.on_event(event),
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(stream::iter(out)))
            })
            .flatten();
        Ok(Box::pin(chunks))
    }
}

/// Tracks tool-use blocks and usage across streamed events.
#[derive(Debug, Default)]
pub struct StreamState {
    /// Block index to (tool name, accumulated input JSON).
    tool_blocks: HashMap<usize, (String, String)>,
    usage: TokenUsage,
}

impl StreamState {
    pub fn on_event(&mut self, event: StreamEvent) -> Vec<Result<ProviderStreamChunk, MnemoError>> {
        match event {
            StreamEvent::MessageStart(start) => {
                self.usage.input_tokens = start.message.usage.input_tokens;
                self.usage.output_tokens = start.message.usage.output_tokens;
                vec![]
            }
            StreamEvent::ContentBlockStart(start) => {
                if let ResponseContentBlock::ToolUse { name, .. } = start.content_block {
                    self.tool_blocks.insert(start.index, (name, String::new()));
                }
                vec![]
            }
            StreamEvent::ContentBlockDelta(delta) => match delta.delta {
                SseDelta::TextDelta { text } => vec![Ok(ProviderStreamChunk::text(text))],
                SseDelta::InputJsonDelta { partial_json } => {
                    if let Some((_, json)) = self.tool_blocks.get_mut(&delta.index) {
                        json.push_str(&partial_json);
                    }
                    vec![]
                }
            },
            StreamEvent::ContentBlockStop(stop) => match self.tool_blocks.remove(&stop.index) {
                Some((name, json)) => {
                    let raw = if json.is_empty() { "{}".to_string() } else { json };
                    vec![Ok(ProviderStreamChunk::function_call(FunctionCall {
                        name,
                        arguments: Value::String(raw),
                    }))]
                }
                None => vec![],
            },
            StreamEvent::MessageDelta(delta) => {
                if let Some(usage) = delta.usage {
                    self.usage.output_tokens = usage.output_tokens;
                }
                vec![]
            }
            StreamEvent::MessageStop => vec![
                Ok(ProviderStreamChunk::usage(self.usage)),
                Ok(ProviderStreamChunk::stop()),
            ],
            StreamEvent::Ping => vec![],
            StreamEvent::Error(err) => vec![Err(MnemoError::provider(format!(
                "Anthropic stream error ({}): {}",
                err.error.type_, err.error.message
            )))],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::parse_event;
    use mnemo_core::{ChatMessage, RetryPolicy, StreamEventType};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(uri: &str) -> AnthropicProvider {
        let client = AnthropicClient::new(
            "k",
            "2023-06-01",
            uri,
            RetryPolicy::new(1, Duration::ZERO),
            Duration::from_secs(5),
        )
        .unwrap();
        AnthropicProvider::with_client(client)
    }

    fn notes_tool() -> Value {
        json!({"type": "function", "function": {"name": "read_notes",
            "description": "Read notes", "parameters": {"type": "object", "properties": {}}}})
    }

    fn request(messages: Vec<ChatMessage>, tools: Vec<Value>) -> ProviderRequest {
        ProviderRequest {
            model: "claude-3-opus-20240229".into(),
            messages,
            temperature: 0.1,
            max_tokens: 512,
            stream: false,
            tools,
            function_call: FunctionCallMode::Auto,
        }
    }

    #[test]
    fn system_is_hoisted_and_function_results_become_assistant_turns() {
        let req = request(
            vec![
                ChatMessage::system("be brief"),
                ChatMessage::user("read my notes"),
                ChatMessage::function("read_notes", "--- todo ---\nmilk"),
            ],
            vec![notes_tool()],
        );
        let api = to_message_request(&req);
        assert_eq!(api.system.as_deref(), Some("be brief"));
        assert_eq!(api.messages.len(), 2);
        assert_eq!(api.messages[1].role, "assistant");
        assert_eq!(api.messages[1].content, "--- todo ---\nmilk");
        assert_eq!(api.tools[0].name, "read_notes");
        assert_eq!(api.tools[0].input_schema["type"], "object");
    }

    #[test]
    fn consecutive_same_role_turns_are_joined() {
        let req = request(
            vec![
                ChatMessage::user("one"),
                ChatMessage::user("two"),
                ChatMessage::assistant("three"),
            ],
            vec![],
        );
        let api = to_message_request(&req);
        assert_eq!(api.messages.len(), 2);
        assert_eq!(api.messages[0].content, "one\ntwo");
        assert!(api.system.is_none());
    }

    #[test]
    fn function_call_none_sends_no_tools() {
        let mut req = request(vec![ChatMessage::user("hi")], vec![notes_tool()]);
        req.function_call = FunctionCallMode::None;
        assert!(to_message_request(&req).tools.is_empty());
    }

    #[test]
    fn stream_state_emits_tool_call_on_block_stop() {
        let mut state = StreamState::default();
        let mut feed = |name: &str, data: &str| -> Vec<ProviderStreamChunk> {
            state
                .on_event(parse_event(name, data).unwrap().unwrap())
                .into_iter()
                .map(Result::unwrap)
                .collect()
        };

        feed("message_start", r#"{"message":{"id":"m","content":[],"model":"claude","usage":{"input_tokens":40,"output_tokens":1}}}"#);
        feed("content_block_start", r#"{"index":1,"content_block":{"type":"tool_use","id":"tu","name":"read_notes","input":{}}}"#);
        feed("content_block_delta", r#"{"index":1,"delta":{"type":"input_json_delta","partial_json":"{\"a\":"}}"#);
        feed("content_block_delta", r#"{"index":1,"delta":{"type":"input_json_delta","partial_json":"1}"}}"#);
        let call = feed("content_block_stop", r#"{"index":1}"#);
        assert_eq!(call[0].event_type, StreamEventType::FunctionCall);
        assert_eq!(
            call[0].function_call.clone().unwrap().arguments,
            Value::String("{\"a\":1}".into())
        );

        feed("message_delta", r#"{"delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":9}}"#);
        let end = feed("message_stop", "{}");
        assert_eq!(end[0].usage.unwrap(), TokenUsage { input_tokens: 40, output_tokens: 9 });
        assert_eq!(end[1].event_type, StreamEventType::Stop);
    }

    #[tokio::test]
    async fn complete_maps_tool_use_to_function_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"system": "sys", "tools": [{"name": "read_notes"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1", "type": "message", "role": "assistant", "model": "claude",
                "content": [
                    {"type": "text", "text": "Checking."},
                    {"type": "tool_use", "id": "tu_1", "name": "read_notes", "input": {"x": 1}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 11, "output_tokens": 6}
            })))
            .mount(&server)
            .await;

        let resp = provider(&server.uri())
            .complete(request(
                vec![ChatMessage::system("sys"), ChatMessage::user("notes?")],
                vec![notes_tool()],
            ))
            .await
            .unwrap();
        assert_eq!(resp.content, "Checking.");
        let call = resp.function_call.unwrap();
        assert_eq!(call.name, "read_notes");
        assert_eq!(call.arguments, json!({"x": 1}));
        assert_eq!(resp.usage.total(), 17);
    }

    #[tokio::test]
    async fn stream_accumulates_text_deltas() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: message_start\ndata: {\"message\":{\"id\":\"m\",\"content\":[],\"model\":\"c\",\"usage\":{\"input_tokens\":5,\"output_tokens\":1}}}\n\n",
            "event: content_block_start\ndata: {\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: ping\ndata: {}\n\n",
            "event: content_block_delta\ndata: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "event: content_block_delta\ndata: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "event: content_block_stop\ndata: {\"index\":0}\n\n",
            "event: message_delta\ndata: {\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":2}}\n\n",
            "event: message_stop\ndata: {}\n\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let mut req = request(vec![ChatMessage::user("hi")], vec![]);
        req.stream = true;
        let chunks: Vec<_> = provider(&server.uri())
            .stream(req)
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;

        let text: String = chunks.iter().filter_map(|c| c.text.clone()).collect();
        assert_eq!(text, "Hello");
        assert_eq!(chunks.iter().find_map(|c| c.usage).unwrap().output_tokens, 2);
    }
}
