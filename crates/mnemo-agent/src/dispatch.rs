// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Function-call dispatch: run the addon the model asked for and feed its
//! result back in a follow-up turn.

use mnemo_context::prompts::FUNCTION_REPLY_SYSTEM_PROMPT;
use mnemo_core::{ChatMessage, FunctionCall, MnemoError};
use mnemo_skill::{AddonLookup, EnabledAddons};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::args::parse_arguments;
use crate::responder::{Reply, RespondOptions, Responder};
use crate::state::{MAX_NESTED_CALLS, RequestState};

/// Unwraps `{"content": ...}` envelopes, however deeply nested.
///
/// Text that is not JSON is returned unchanged.
pub fn extract_content(data: &str) -> String {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(map)) => match map.get("content") {
            Some(Value::String(inner)) => extract_content(inner),
            Some(Value::Null) | None => data.to_string(),
            Some(other) => other.to_string(),
        },
        Ok(Value::String(inner)) => inner,
        _ => data.to_string(),
    }
}

fn error_payload(message: impl std::fmt::Display) -> String {
    json!({ "content": format!("error: {message}") }).to_string()
}

/// Result of handling a model's function call.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Last follow-up reply, or the function result it answered when that
    /// reply had no text.
    pub content: String,
    /// Names of the functions that ran, in order.
    pub calls: Vec<String>,
}

pub struct Dispatcher<'a> {
    responder: &'a Responder,
    addons: &'a EnabledAddons,
}

impl<'a> Dispatcher<'a> {
    pub fn new(responder: &'a Responder, addons: &'a EnabledAddons) -> Self {
        Self { responder, addons }
    }

    pub fn responder(&self) -> &Responder {
        self.responder
    }

    pub fn addons(&self) -> &EnabledAddons {
        self.addons
    }

    /// Runs `call` and any calls its follow-up replies request, up to
    /// [`MAX_NESTED_CALLS`] in total.
    pub async fn dispatch(
        &self,
        state: &mut RequestState,
        call: FunctionCall,
        message: &str,
    ) -> Result<DispatchOutcome, MnemoError> {
        let mut call = call;
        let mut calls = Vec::new();
        let mut last = String::new();

        loop {
            if !state.enter_call() {
                warn!(
                    user = state.user.as_str(),
                    function = call.name.as_str(),
                    limit = MAX_NESTED_CALLS,
                    "nested function call limit reached"
                );
                return Ok(DispatchOutcome { content: last, calls });
            }

            let result = self.invoke(state, &call).await;
            calls.push(call.name.clone());
            let reply = self.function_reply(state, &call.name, &result, message).await?;
            last = if reply.content.is_empty() { result } else { reply.content };

            match reply.function_call {
                Some(next) if !reply.stopped => {
                    debug!(user = state.user.as_str(), from = call.name.as_str(), next = next.name.as_str(), "follow-up requested another function");
                    call = next;
                }
                _ => return Ok(DispatchOutcome { content: last, calls }),
            }
        }
    }

    /// Runs one addon and returns its result as text. Failures become
    /// `{"content": "error: ..."}` payloads for the model to read.
    pub async fn invoke(&self, state: &RequestState, call: &FunctionCall) -> String {
        let mut args = match parse_arguments(self.responder, state, &call.arguments).await {
            Ok(args) => args,
            Err(e) => {
                error!(user = state.user.as_str(), function = call.name.as_str(), error = %e, "dropping function call");
                return error_payload(e);
            }
        };
        args.insert("username".into(), Value::String(state.user.clone()));

        let tool = match self.addons.lookup(&call.name) {
            AddonLookup::Enabled(tool) => tool,
            AddonLookup::Disabled => {
                info!(user = state.user.as_str(), function = call.name.as_str(), "function is disabled");
                return format!("Function {} not found.", call.name);
            }
            AddonLookup::Missing => {
                warn!(user = state.user.as_str(), function = call.name.as_str(), "no addon for function");
                return format!("Module for {} not found.", call.name);
            }
        };

        info!(user = state.user.as_str(), function = call.name.as_str(), "invoking addon");
        match tool.invoke(Value::Object(args)).await {
            Ok(output) if output.is_error => {
                warn!(user = state.user.as_str(), function = call.name.as_str(), error = output.content.as_str(), "addon reported an error");
                error_payload(output.content)
            }
            Ok(output) => output.content,
            Err(e) => {
                error!(user = state.user.as_str(), function = call.name.as_str(), error = %e, "addon failed");
                error_payload(e)
            }
        }
    }

    /// Follow-up turn that lets the model answer with the function result.
    pub async fn function_reply(
        &self,
        state: &RequestState,
        name: &str,
        result: &str,
        message: &str,
    ) -> Result<Reply, MnemoError> {
        let result_turn = if state.is_gpt() {
            ChatMessage::function(name, result)
        } else {
            ChatMessage::assistant(result)
        };
        let messages = vec![
            ChatMessage::system(FUNCTION_REPLY_SYSTEM_PROMPT),
            ChatMessage::user(message),
            result_turn,
        ];
        self.responder
            .respond(
                &state.user,
                messages,
                RespondOptions::streaming(&state.model, state.max_tokens, self.addons.schemas().to_vec()),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_content_unwraps_nested_envelopes() {
        assert_eq!(extract_content("plain text"), "plain text");
        assert_eq!(extract_content(r#"{"content": "hi"}"#), "hi");
        assert_eq!(
            extract_content(r#"{"content": "{\"content\": \"deep\"}"}"#),
            "deep"
        );
        assert_eq!(extract_content(r#"{"content": 42}"#), "42");
    }

    #[test]
    fn extract_content_keeps_other_json() {
        assert_eq!(extract_content(r#"{"answer": 1}"#), r#"{"answer": 1}"#);
        assert_eq!(extract_content("[1,2]"), "[1,2]");
        assert_eq!(extract_content(r#""quoted""#), "quoted");
    }

    #[test]
    fn error_payload_is_content_json() {
        let payload: Value = serde_json::from_str(&error_payload("boom")).unwrap();
        assert_eq!(payload["content"], "error: boom");
    }
}
