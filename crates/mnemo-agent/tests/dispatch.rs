// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Function dispatch, argument repair and chain of thought.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use mnemo_agent::{ChainOfThought, Dispatcher, RequestState, Responder, parse_arguments};
use mnemo_config::SettingsStore;
use mnemo_context::prompts::{FUNCTION_REPLY_SYSTEM_PROMPT, INVALID_JSON_SYSTEM_PROMPT};
use mnemo_core::{ChatMessage, FunctionCall, MnemoError, Role};
use mnemo_skill::{AddonManager, EnabledAddons, Tool, ToolOutput, ToolRegistry};
use mnemo_test_utils::{MockProvider, MockReply};
use serde_json::{Value, json};
use tempfile::TempDir;

const USER: &str = "ada";

/// Returns its arguments as JSON.
struct Echo;

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the arguments back"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }

    async fn invoke(&self, input: Value) -> Result<ToolOutput, MnemoError> {
        Ok(ToolOutput::text(input.to_string()))
    }
}

struct Broken;

#[async_trait]
impl Tool for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn invoke(&self, _input: Value) -> Result<ToolOutput, MnemoError> {
        Ok(ToolOutput::error("disk full"))
    }
}

struct Off;

#[async_trait]
impl Tool for Off {
    fn name(&self) -> &str {
        "off"
    }

    fn description(&self) -> &str {
        "Never enabled"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn invoke(&self, _input: Value) -> Result<ToolOutput, MnemoError> {
        Ok(ToolOutput::text("should not run"))
    }
}

async fn enabled_addons(enabled: &[&str]) -> (TempDir, EnabledAddons) {
    let dir = TempDir::new().unwrap();
    let store = SettingsStore::new(dir.path(), "gpt-4o");
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(Echo));
    registry.register(Arc::new(Broken));
    registry.register(Arc::new(Off));

    let mut settings = store.load(USER).await.unwrap();
    let flags: BTreeMap<String, bool> = enabled.iter().map(|n| (n.to_string(), true)).collect();
    settings.set_addons(&flags);
    store.save(USER, &settings).await.unwrap();

    let (_, addons) = AddonManager::new(registry).load(&store, USER).await.unwrap();
    (dir, addons)
}

fn responder(provider: &MockProvider) -> Responder {
    Responder::new(0.1)
        .with_openai(Arc::new(provider.clone()))
        .with_anthropic(Arc::new(provider.clone()))
}

fn call(name: &str, arguments: Value) -> FunctionCall {
    FunctionCall {
        name: name.into(),
        arguments,
    }
}

fn state(model: &str) -> RequestState {
    RequestState::new(USER, model, 500)
}

#[tokio::test]
async fn invoke_injects_username() {
    let provider = MockProvider::new();
    let responder = responder(&provider);
    let (_dir, addons) = enabled_addons(&["echo"]).await;
    let dispatcher = Dispatcher::new(&responder, &addons);

    let output = dispatcher
        .invoke(&state("gpt-4o"), &call("echo", json!("{'text': 'hi'}")))
        .await;
    let output: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(output, json!({"text": "hi", "username": USER}));
    assert!(provider.requests().await.is_empty());
}

#[tokio::test]
async fn unknown_and_disabled_functions_are_reported() {
    let provider = MockProvider::new();
    let responder = responder(&provider);
    let (_dir, addons) = enabled_addons(&["echo"]).await;
    let dispatcher = Dispatcher::new(&responder, &addons);
    let state = state("gpt-4o");

    assert_eq!(
        dispatcher.invoke(&state, &call("nope", json!("{}"))).await,
        "Module for nope not found."
    );
    assert_eq!(
        dispatcher.invoke(&state, &call("off", json!("{}"))).await,
        "Function off not found."
    );
}

#[tokio::test]
async fn tool_errors_become_content_payloads() {
    let provider = MockProvider::new();
    let responder = responder(&provider);
    let (_dir, addons) = enabled_addons(&["broken"]).await;
    let dispatcher = Dispatcher::new(&responder, &addons);

    let output = dispatcher.invoke(&state("gpt-4o"), &call("broken", json!({}))).await;
    let output: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(output["content"], "error: disk full");
}

#[tokio::test]
async fn broken_arguments_are_repaired_with_one_reask() {
    let provider = MockProvider::with_responses(vec![r#"{"text": "fixed"}"#.into()]);
    let responder = responder(&provider);

    let args = parse_arguments(&responder, &state("gpt-4o"), &json!("text = fixed {"))
        .await
        .unwrap();
    assert_eq!(args["text"], "fixed");

    let requests = provider.requests().await;
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].stream);
    assert_eq!(requests[0].messages[0].content, INVALID_JSON_SYSTEM_PROMPT);
    assert!(requests[0].messages[1].content.contains("text = fixed {"));
}

#[tokio::test]
async fn unrepairable_arguments_fail_after_a_single_reask() {
    let provider = MockProvider::with_responses(vec!["still broken {".into()]);
    let responder = responder(&provider);

    let err = parse_arguments(&responder, &state("gpt-4o"), &json!("definitely not json {"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid function arguments"));
    assert_eq!(provider.requests().await.len(), 1);
}

#[tokio::test]
async fn unrepairable_arguments_reach_the_model_as_an_error() {
    let provider = MockProvider::with_responses(vec!["nope {".into()]);
    let responder = responder(&provider);
    let (_dir, addons) = enabled_addons(&["echo"]).await;
    let dispatcher = Dispatcher::new(&responder, &addons);

    let output = dispatcher
        .invoke(&state("gpt-4o"), &call("echo", json!("broken {")))
        .await;
    let output: Value = serde_json::from_str(&output).unwrap();
    assert!(output["content"].as_str().unwrap().starts_with("error: "));
}

#[tokio::test]
async fn gpt_models_get_a_function_turn() {
    let provider = MockProvider::with_responses(vec!["The echo said hi".into()]);
    let responder = responder(&provider);
    let (_dir, addons) = enabled_addons(&["echo"]).await;
    let dispatcher = Dispatcher::new(&responder, &addons);
    let mut state = state("gpt-4o");

    let outcome = dispatcher
        .dispatch(&mut state, call("echo", json!({"text": "hi"})), "say hi")
        .await
        .unwrap();
    assert_eq!(outcome.content, "The echo said hi");
    assert_eq!(outcome.calls, ["echo"]);

    let requests = provider.requests().await;
    let messages = &requests[0].messages;
    assert_eq!(messages[0], ChatMessage::system(FUNCTION_REPLY_SYSTEM_PROMPT));
    assert_eq!(messages[1], ChatMessage::user("say hi"));
    assert_eq!(messages[2].role, Role::Function);
    assert_eq!(messages[2].name.as_deref(), Some("echo"));
    assert!(requests[0].stream);
    assert_eq!(requests[0].tools.len(), 1);
}

#[tokio::test]
async fn other_models_get_an_assistant_turn() {
    let provider = MockProvider::new();
    let responder = responder(&provider);
    let (_dir, addons) = enabled_addons(&["echo"]).await;
    let dispatcher = Dispatcher::new(&responder, &addons);
    let mut state = state("claude-3-haiku");

    dispatcher
        .dispatch(&mut state, call("echo", json!({})), "say hi")
        .await
        .unwrap();
    let requests = provider.requests().await;
    assert_eq!(requests[0].messages[2].role, Role::Assistant);
    assert!(requests[0].messages[2].name.is_none());
}

#[tokio::test]
async fn nested_calls_stop_at_the_cap() {
    let provider = MockProvider::new();
    for _ in 0..5 {
        provider.push(MockReply::call("echo", r#"{"text": "again"}"#)).await;
    }
    let responder = responder(&provider);
    let (_dir, addons) = enabled_addons(&["echo"]).await;
    let dispatcher = Dispatcher::new(&responder, &addons);
    let mut state = state("gpt-4o");

    let outcome = dispatcher
        .dispatch(&mut state, call("echo", json!({"text": "first"})), "loop")
        .await
        .unwrap();
    assert_eq!(outcome.calls.len(), 3);
    assert_eq!(state.nested_calls(), 3);
    assert_eq!(provider.requests().await.len(), 3);
    // Follow-ups had no text, so the last function result is kept.
    let last: Value = serde_json::from_str(&outcome.content).unwrap();
    assert_eq!(last["text"], "again");
}

#[tokio::test]
async fn empty_follow_up_keeps_the_function_result() {
    let provider = MockProvider::with_responses(vec![String::new()]);
    let responder = responder(&provider);
    let (_dir, addons) = enabled_addons(&["broken"]).await;
    let dispatcher = Dispatcher::new(&responder, &addons);
    let mut state = state("gpt-4o");

    let outcome = dispatcher
        .dispatch(&mut state, call("broken", json!({})), "try it")
        .await
        .unwrap();
    assert_eq!(mnemo_agent::extract_content(&outcome.content), "error: disk full");
}

#[tokio::test]
async fn chain_of_thought_returns_the_yes_answer() {
    let provider = MockProvider::with_responses(vec![
        "1. Check the time\n2. Phrase the answer".into(),
        "It is noon".into(),
        "Noon it is".into(),
        "YES: It is noon.".into(),
    ]);
    let responder = responder(&provider);
    let (_dir, addons) = enabled_addons(&[]).await;
    let dispatcher = Dispatcher::new(&responder, &addons);
    let mut state = state("gpt-4o").with_max_cot_rounds(3);
    let context = [ChatMessage::system("you are helpful")];

    let outcome = ChainOfThought::new(&dispatcher)
        .run(&mut state, "what time is it?", &context)
        .await
        .unwrap();
    assert_eq!(outcome.answer, "It is noon.");
    assert_eq!(outcome.rounds, 1);
    assert!(outcome.trace.contains("- Check the time\nIt is noon\n"));
    assert!(outcome.trace.contains("- Phrase the answer\nNoon it is\n"));

    let requests = provider.requests().await;
    assert_eq!(requests.len(), 4);
    assert!(!requests[0].stream);
    assert!(requests[1].stream);
    assert_eq!(requests[1].messages[0], context[0]);
    assert!(requests[2].messages.last().unwrap().content.contains("Results so far"));
}

#[tokio::test]
async fn chain_of_thought_stops_at_the_round_cap() {
    let provider = MockProvider::with_responses(vec![
        "1. first try".into(),
        "r1".into(),
        "1. second try".into(),
        "r2".into(),
        "1. third try".into(),
    ]);
    let responder = responder(&provider);
    let (_dir, addons) = enabled_addons(&[]).await;
    let dispatcher = Dispatcher::new(&responder, &addons);
    let mut state = state("gpt-4o").with_max_cot_rounds(2);

    let outcome = ChainOfThought::new(&dispatcher)
        .run(&mut state, "hard question", &[])
        .await
        .unwrap();
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.answer, "1. third try");
    assert_eq!(provider.requests().await.len(), 5);
}

#[tokio::test]
async fn chain_of_thought_steps_can_call_functions() {
    let provider = MockProvider::new();
    provider.push(MockReply::text("1. use the echo")).await;
    provider.push(MockReply::call("echo", r#"{"text": "x"}"#)).await;
    provider.push(MockReply::text("echo says x")).await;
    provider.push(MockReply::text("YES: done")).await;
    let responder = responder(&provider);
    let (_dir, addons) = enabled_addons(&["echo"]).await;
    let dispatcher = Dispatcher::new(&responder, &addons);
    let mut state = state("gpt-4o");

    let outcome = ChainOfThought::new(&dispatcher)
        .run(&mut state, "echo x", &[])
        .await
        .unwrap();
    assert_eq!(outcome.answer, "done");
    assert!(outcome.trace.contains("- use the echo\necho says x\n"));
    assert_eq!(state.nested_calls(), 1);
}
