// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repair of function-call arguments.
//!
//! Models regularly return arguments that are not quite JSON: Python
//! literals, code fences, trailing ellipses. [`parse_local`] works through
//! increasingly forgiving readings; [`parse_arguments`] adds a single re-ask
//! of the model when none of them succeed.

use std::sync::LazyLock;

use mnemo_context::prompts::{INVALID_JSON_SYSTEM_PROMPT, invalid_json};
use mnemo_core::{ChatMessage, MnemoError};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::responder::{RespondOptions, Responder};
use crate::state::RequestState;

static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```.*?\n").expect("fence pattern is valid"));
static ELLIPSIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\.\.|…").expect("ellipsis pattern is valid"));
static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]+").expect("line break pattern is valid"));
static NON_ASCII: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\x00-\x7F]+").expect("non-ascii pattern is valid"));

/// Strips code fences, ellipses, line breaks, and non-ASCII characters.
pub fn sanitise(text: &str) -> String {
    let text = FENCE_OPEN.replace_all(text, "");
    let text = text.replace("```", "");
    let text = ELLIPSIS.replace_all(&text, "");
    let text = LINE_BREAKS.replace_all(&text, "");
    NON_ASCII.replace_all(&text, "").into_owned()
}

/// Rewrites a Python literal as JSON.
///
/// Single-quoted strings become double-quoted, `True`/`False`/`None` become
/// their JSON spellings, and trailing commas before `}` or `]` are dropped.
/// Text inside strings is left alone.
pub fn normalise_literal(text: &str) -> String {
    let chars: Vec<char> = text.trim().chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                out.push('"');
                i += 1;
                while i < chars.len() && chars[i] != c {
                    match chars[i] {
                        '\\' if i + 1 < chars.len() => {
                            if chars[i + 1] == '\'' {
                                out.push('\'');
                            } else {
                                out.push('\\');
                                out.push(chars[i + 1]);
                            }
                            i += 1;
                        }
                        '"' => out.push_str("\\\""),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        other => out.push(other),
                    }
                    i += 1;
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i + 1 < chars.len() && (chars[i + 1].is_ascii_alphanumeric() || chars[i + 1] == '_') {
                    i += 1;
                }
                let word: String = chars[start..=i].iter().collect();
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(',');
                }
            }
            '(' => out.push('['),
            ')' => out.push(']'),
            other => out.push(other),
        }
        i += 1;
    }
    out
}

fn parse_text(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return Some(Value::Object(Map::new()));
    }
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    if let Ok(value) = serde_json::from_str(&normalise_literal(text)) {
        return Some(value);
    }
    let cleaned = sanitise(text);
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Some(value);
    }
    serde_json::from_str(&normalise_literal(&cleaned)).ok()
}

/// Reads raw arguments without asking the model.
///
/// Returns `None` when no reading succeeds. A value that parses but is not
/// an object yields an empty map.
pub fn parse_local(raw: &Value) -> Option<Map<String, Value>> {
    let value = match raw {
        Value::Array(items) => items.first().cloned().unwrap_or_else(|| Value::Object(Map::new())),
        other => other.clone(),
    };
    let parsed = match value {
        Value::String(text) => parse_text(&text)?,
        other => other,
    };
    Some(match parsed {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

fn raw_text(raw: &Value) -> String {
    match raw {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Parses arguments, re-asking the model once when they cannot be read.
pub async fn parse_arguments(
    responder: &Responder,
    state: &RequestState,
    raw: &Value,
) -> Result<Map<String, Value>, MnemoError> {
    if let Some(args) = parse_local(raw) {
        return Ok(args);
    }

    let text = raw_text(raw);
    warn!(user = state.user.as_str(), arguments = text.as_str(), "invalid function arguments, asking for a repair");
    let messages = vec![
        ChatMessage::system(INVALID_JSON_SYSTEM_PROMPT),
        ChatMessage::user(invalid_json(&text)),
    ];
    let reply = responder
        .respond(&state.user, messages, RespondOptions::plain(&state.model, state.max_tokens))
        .await?;
    let repaired = match reply.function_call {
        Some(call) => call.arguments,
        None => Value::String(reply.content),
    };

    match parse_local(&repaired) {
        Some(args) => {
            debug!(user = state.user.as_str(), "function arguments repaired");
            Ok(args)
        }
        None => {
            error!(user = state.user.as_str(), arguments = text.as_str(), "function arguments could not be repaired");
            Err(MnemoError::Internal(format!("invalid function arguments: {text}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Option<Value> {
        parse_local(&Value::String(text.into())).map(Value::Object)
    }

    #[test]
    fn plain_json_object() {
        assert_eq!(parse(r#"{"city": "Paris"}"#), Some(json!({"city": "Paris"})));
    }

    #[test]
    fn python_literal_dict() {
        assert_eq!(parse("{'a': 1}"), Some(json!({"a": 1})));
        assert_eq!(
            parse("{'flag': True, 'none': None, 'list': [1, 2,],}"),
            Some(json!({"flag": true, "none": null, "list": [1, 2]}))
        );
    }

    #[test]
    fn fenced_input_with_ellipsis() {
        assert_eq!(parse("```json\n{'a': 1}...\n```"), Some(json!({"a": 1})));
        assert_eq!(parse("```\n{\"a\": 1}\n```…"), Some(json!({"a": 1})));
    }

    #[test]
    fn quotes_inside_strings_survive() {
        assert_eq!(
            parse(r#"{'text': 'she said "hi"', 'it\'s': 'ok, fine'}"#),
            Some(json!({"text": "she said \"hi\"", "it's": "ok, fine"}))
        );
    }

    #[test]
    fn lists_take_first_element() {
        assert_eq!(
            parse_local(&json!([{"a": 1}, {"b": 2}])).map(Value::Object),
            Some(json!({"a": 1}))
        );
        assert_eq!(parse_local(&json!([])), Some(Map::new()));
    }

    #[test]
    fn non_objects_become_empty() {
        assert_eq!(parse("42"), Some(json!({})));
        assert_eq!(parse("[1, 2]"), Some(json!({})));
        assert_eq!(parse_local(&Value::Null), Some(Map::new()));
        assert_eq!(parse(""), Some(json!({})));
    }

    #[test]
    fn objects_pass_through() {
        assert_eq!(
            parse_local(&json!({"query": "cats"})).map(Value::Object),
            Some(json!({"query": "cats"}))
        );
    }

    #[test]
    fn garbage_is_unreadable() {
        assert_eq!(parse("definitely not json {"), None);
    }

    #[test]
    fn sanitise_strips_noise() {
        assert_eq!(sanitise("```python\n{\"a\":\r\n 1}…```"), "{\"a\": 1}");
        assert_eq!(sanitise("{\"ä\": 1}"), "{\"\": 1}");
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn json_objects_survive_literal_normalisation(
                key in "[a-z]{1,8}",
                text in "[a-zA-Z0-9 ,.!?']{0,20}",
                n in any::<i32>(),
            ) {
                let value = json!({ key.clone(): text, "n": n });
                let encoded = value.to_string();
                let normalised = normalise_literal(&encoded);
                prop_assert_eq!(serde_json::from_str::<Value>(&normalised).unwrap(), value);
            }

            #[test]
            fn fenced_objects_parse(key in "[a-z]{1,8}", n in 0u32..1000) {
                let input = format!("```json\n{{'{key}': {n}}}...\n```");
                prop_assert_eq!(parse(&input), Some(json!({ key: n })));
            }
        }
    }
}
