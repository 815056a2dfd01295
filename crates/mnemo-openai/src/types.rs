// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the OpenAI chat completions API.

use mnemo_core::ChatMessage;
use serde::{Deserialize, Serialize};

// --- Request types ---

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,

    /// Chat turns. Function results keep role `function` and their `name`.
    pub messages: Vec<ChatMessage>,

    pub temperature: f32,

    pub max_tokens: u32,

    pub stream: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,

    /// Tool schemas, already in `{"type":"function","function":{..}}` form.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,

    /// `auto` or `none`; omitted when no tools are sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

// --- Response types ---

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Legacy single function call.
    #[serde(default)]
    pub function_call: Option<WireFunctionCall>,
}

impl ResponseMessage {
    /// The first requested call, preferring `tool_calls`.
    pub fn first_call(&self) -> Option<&WireFunctionCall> {
        self.tool_calls
            .as_ref()
            .and_then(|calls| calls.first())
            .map(|c| &c.function)
            .or(self.function_call.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub function: WireFunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    /// Raw argument text as produced by the model; not guaranteed to be JSON.
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ApiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

// --- Streaming types ---

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
    #[serde(default)]
    pub function_call: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

// --- Errors ---

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_tools_and_choice_when_empty() {
        let req = ChatCompletionRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.1,
            max_tokens: 100,
            stream: false,
            stream_options: None,
            tools: vec![],
            tool_choice: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
        assert!(json.get("stream_options").is_none());
        assert_eq!(json["messages"][0], json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn function_messages_keep_their_name() {
        let json = serde_json::to_value(ChatMessage::function("read_notes", "none")).unwrap();
        assert_eq!(json, json!({"role": "function", "content": "none", "name": "read_notes"}));
    }

    #[test]
    fn first_call_prefers_tool_calls_over_legacy() {
        let message: ResponseMessage = serde_json::from_value(json!({
            "content": null,
            "tool_calls": [{"id": "call_1", "type": "function",
                "function": {"name": "get_current_time", "arguments": "{}"}}],
            "function_call": {"name": "legacy", "arguments": ""}
        }))
        .unwrap();
        assert_eq!(message.first_call().unwrap().name, "get_current_time");

        let legacy: ResponseMessage = serde_json::from_value(json!({
            "function_call": {"name": "legacy", "arguments": "{'a': 1}"}
        }))
        .unwrap();
        assert_eq!(legacy.first_call().unwrap().arguments, "{'a': 1}");
    }

    #[test]
    fn chunk_without_choices_carries_usage() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "c", "choices": [], "usage": {"prompt_tokens": 7, "completion_tokens": 3}
        }))
        .unwrap();
        assert!(chunk.choices.is_empty());
        assert_eq!(chunk.usage.unwrap().prompt_tokens, 7);
    }
}
