// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline tests.
//!
//! `TestHarness` assembles a complete message pipeline over a temp users
//! directory, an in-memory statistics database, an in-memory memory store,
//! and a [`MockProvider`] serving both OpenAI and Anthropic models.
//!
//! Memory and note calls get standing "nothing to do" replies, so queued
//! replies reach the chat turns. Tests that care about those calls add
//! one-shot routes, which take precedence.

use std::sync::Arc;

use mnemo_agent::{MessageRequest, Pipeline, PipelineReply, Responder};
use mnemo_config::{SettingsStore, UserSettings};
use mnemo_context::BrainRole;
use mnemo_core::MnemoError;
use mnemo_memory::SqliteMemoryStore;
use mnemo_skill::builtin::register_builtins;
use mnemo_skill::{AddonManager, Tool, ToolRegistry};
use mnemo_storage::Database;
use serde_json::{Map, Value, json};

use crate::mock_provider::{MockProvider, MockReply};
use crate::mock_usage::MockUsageSink;

/// Builder for configuring a [`TestHarness`].
pub struct TestHarnessBuilder {
    model: String,
    responses: Vec<String>,
    tools: Vec<Arc<dyn Tool>>,
    builtins: bool,
    cot_max_rounds: u32,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            responses: Vec::new(),
            tools: Vec::new(),
            builtins: false,
            cot_max_rounds: 2,
        }
    }

    /// Active model written into new users' settings.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Queue text replies on the mock provider.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Register an extra tool. It starts disabled for every user.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Register the built-in addons.
    pub fn with_builtins(mut self) -> Self {
        self.builtins = true;
        self
    }

    pub fn with_cot_max_rounds(mut self, rounds: u32) -> Self {
        self.cot_max_rounds = rounds;
        self
    }

    pub async fn build(self) -> Result<TestHarness, MnemoError> {
        let temp_dir = tempfile::TempDir::new()?;
        let settings = SettingsStore::new(temp_dir.path().join("users"), &self.model);

        let mut registry = ToolRegistry::new();
        if self.builtins {
            register_builtins(&mut registry, &settings);
        }
        for tool in self.tools {
            registry.register(tool);
        }

        let provider = if self.responses.is_empty() {
            MockProvider::new()
        } else {
            MockProvider::with_responses(self.responses)
        };
        for (role, reply) in [
            (BrainRole::Retriever, "none"),
            (BrainRole::CategoriseQuery, "none"),
            (BrainRole::Categorise, "none"),
            (BrainRole::Notetaker, "[]"),
        ] {
            provider
                .always_system(role.system_prompt(), MockReply::text(reply))
                .await;
        }
        let usage = MockUsageSink::new();
        let responder = Responder::new(0.1)
            .with_openai(Arc::new(provider.clone()))
            .with_anthropic(Arc::new(provider.clone()))
            .with_usage_sink(Arc::new(usage.clone()));

        let db = Database::open_in_memory().await?;
        let store = Arc::new(SqliteMemoryStore::open_in_memory().await?);
        let pipeline = Pipeline::new(
            settings.clone(),
            AddonManager::new(registry),
            store.clone(),
            responder,
            db.clone(),
        )
        .with_cot_max_rounds(self.cot_max_rounds);

        Ok(TestHarness {
            provider,
            usage,
            store,
            db,
            settings,
            pipeline,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete pipeline with scripted provider and temp storage.
pub struct TestHarness {
    pub provider: MockProvider,
    pub usage: MockUsageSink,
    pub store: Arc<SqliteMemoryStore>,
    pub db: Database,
    pub settings: SettingsStore,
    pub pipeline: Pipeline,
    /// Kept alive so the users directory outlives the harness.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Send a plain message for `user`.
    pub async fn send_message(&self, user: &str, text: &str) -> Result<PipelineReply, MnemoError> {
        self.pipeline
            .process_message(MessageRequest::new(user, text))
            .await
    }

    pub async fn process(&self, request: MessageRequest) -> Result<PipelineReply, MnemoError> {
        self.pipeline.process_message(request).await
    }

    /// Edit a user's settings document in place.
    pub async fn update_settings<F>(&self, user: &str, edit: F) -> Result<(), MnemoError>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let mut document = self.settings.load(user).await?.into_document();
        edit(&mut document);
        self.settings
            .save(user, &UserSettings::from_document(document))
            .await
    }

    /// Set every memory allowance except `max_tokens` and `output`.
    ///
    /// Allowances of 100 or less switch the matching recall step off.
    pub async fn set_allowances(&self, user: &str, allowance: i64) -> Result<(), MnemoError> {
        self.update_settings(user, |doc| {
            if let Some(memory) = doc.get_mut("memory").and_then(Value::as_object_mut) {
                for key in ["ltm1", "ltm2", "episodic", "recent", "notes"] {
                    memory.insert(key.into(), json!(allowance));
                }
            }
        })
        .await
    }

    pub async fn enable_addon(&self, user: &str, name: &str) -> Result<(), MnemoError> {
        self.update_settings(user, |doc| {
            let addons = doc
                .entry("addons")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(addons) = addons.as_object_mut() {
                addons.insert(name.into(), Value::Bool(true));
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::MemoryClient;
    use mnemo_memory::ACTIVE_BRAIN;

    #[tokio::test]
    async fn builder_creates_working_environment() {
        let harness = TestHarness::builder().build().await.unwrap();
        let settings = harness.settings.load("ada").await.unwrap();
        assert_eq!(settings.active_model(), "gpt-4o");
        assert!(settings.addons().is_empty());
    }

    #[tokio::test]
    async fn send_message_returns_mock_response() {
        let harness = TestHarness::builder()
            .with_mock_responses(vec!["test output".to_string()])
            .build()
            .await
            .unwrap();
        harness.set_allowances("ada", 0).await.unwrap();

        let reply = harness.send_message("ada", "hello world").await.unwrap();
        assert_eq!(reply.content, "test output");
        assert!(reply.stored);
        // The message and the reply.
        assert_eq!(harness.store.count(ACTIVE_BRAIN, Some("ada")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn builtins_start_disabled() {
        let harness = TestHarness::builder().with_builtins().build().await.unwrap();
        harness.set_allowances("ada", 0).await.unwrap();
        harness.send_message("ada", "hi").await.unwrap();

        let addons = harness.settings.load("ada").await.unwrap().addons();
        assert_eq!(addons.get("get_current_time"), Some(&false));
        assert_eq!(addons.get("read_notes"), Some(&false));
    }

    #[tokio::test]
    async fn harnesses_do_not_share_storage() {
        let h1 = TestHarness::builder().build().await.unwrap();
        let h2 = TestHarness::builder().build().await.unwrap();
        h1.set_allowances("ada", 0).await.unwrap();
        h1.send_message("ada", "msg1").await.unwrap();

        assert_eq!(h1.store.count(ACTIVE_BRAIN, Some("ada")).await.unwrap(), 2);
        assert_eq!(h2.store.count(ACTIVE_BRAIN, Some("ada")).await.unwrap(), 0);
    }
}
