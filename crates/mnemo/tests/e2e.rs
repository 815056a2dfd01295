// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: multi-turn conversations over the test harness, and the
//! `mnemo` binary run against a temp data directory.

use std::path::Path;
use std::process::{Command, Output};

use mnemo_test_utils::{MockReply, TestHarness};
use serde_json::Value;

const USER: &str = "ada";

// ---- Conversations ----

#[tokio::test]
async fn earlier_messages_are_recalled_in_the_system_turn() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec!["Nice name!".into(), "Your cat is Tom.".into()])
        .build()
        .await
        .unwrap();

    harness.send_message(USER, "my cat is called Tom").await.unwrap();
    let reply = harness.send_message(USER, "what is my cat called?").await.unwrap();
    assert_eq!(reply.content, "Your cat is Tom.");

    let requests = harness.provider.requests().await;
    let last = requests.iter().filter(|r| r.stream).last().unwrap();
    assert!(last.messages[0].content.contains("my cat is called Tom"));
}

#[tokio::test]
async fn notes_are_written_and_shown_to_the_model() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .provider
        .route(
            |req| req.messages[0].content.contains("maintain the user's notes"),
            vec![MockReply::text(
                r#"[{"action": "create", "file": "shopping", "content": "oat milk"}]"#,
            )],
        )
        .await;

    harness.send_message(USER, "add oat milk to my shopping list").await.unwrap();

    let note = harness.settings.paths(USER).notes_dir().join("shopping");
    assert_eq!(tokio::fs::read_to_string(&note).await.unwrap(), "oat milk");

    let requests = harness.provider.requests().await;
    let chat = requests.iter().find(|r| r.stream).unwrap();
    assert!(chat.messages[0].content.contains("Notes:\nshopping:\noat milk"));
}

#[tokio::test]
async fn every_turn_reports_usage() {
    let harness = TestHarness::builder().build().await.unwrap();
    for text in ["one", "two", "three"] {
        harness.send_message(USER, text).await.unwrap();
    }

    let events = harness.usage.events().await;
    assert_eq!(events.iter().filter(|e| !e.brain).count(), 3);
    assert!(events.iter().all(|e| e.username == USER));
}

// ---- Binary ----

fn mnemo(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mnemo"))
        .args(args)
        .current_dir(dir)
        .env("MNEMO_STORAGE_DATABASE_PATH", dir.join("mnemo.db"))
        .env("MNEMO_AGENT_USERS_DIR", dir.join("users"))
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env("HOME", dir)
        .env_remove("OPENAI_API_KEY")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("RUST_LOG")
        .output()
        .expect("mnemo binary runs")
}

fn stdout_json(output: &Output) -> Value {
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn migrate_lists_applied_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let output = mnemo(dir.path(), &["migrate"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.trim().is_empty());
    assert!(dir.path().join("mnemo.db").exists());
}

#[test]
fn settings_prints_the_healed_document() {
    let dir = tempfile::tempdir().unwrap();
    let settings = stdout_json(&mnemo(dir.path(), &["settings", "--user", USER]));
    assert_eq!(settings["active_model"]["active_model"], "gpt-4o");
    assert_eq!(settings["memory"]["max_tokens"], 128_000);
}

#[test]
fn stats_start_empty() {
    let dir = tempfile::tempdir().unwrap();
    let report = stdout_json(&mnemo(dir.path(), &["stats"]));
    assert_eq!(report["global"]["total_messages"], 0);
    assert_eq!(report["users"], serde_json::json!([]));
}

#[test]
fn purging_an_unknown_user_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = mnemo(dir.path(), &["purge", "--user", "nobody"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

#[test]
fn chat_without_provider_keys_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let output = mnemo(dir.path(), &["chat", "--user", USER, "hello"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("adapter not found"));
}

#[test]
fn invalid_config_exits_with_status_one() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("mnemo.toml"), "[agent]\nnmae = \"typo\"\n").unwrap();
    let output = mnemo(dir.path(), &["migrate"]);
    assert_eq!(output.status.code(), Some(1));
}
