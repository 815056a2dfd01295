// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mnemo chat` command implementation.
//!
//! Wires the full message pipeline against the configured providers, sends
//! one message, and prints the reply.

use std::path::Path;
use std::sync::Arc;

use mnemo_agent::{MessageRequest, Pipeline, Responder};
use mnemo_config::{MnemoConfig, SettingsStore};
use mnemo_core::MnemoError;
use mnemo_cost::UsageRecorder;
use mnemo_memory::SqliteMemoryStore;
use mnemo_skill::builtin::register_builtins;
use mnemo_skill::{AddonManager, ToolRegistry};
use mnemo_storage::Database;
use mnemo_storage::queries::users;
use tracing::debug;

use crate::ChatArgs;

/// File name of the memory store inside `agent.users_dir`.
const MEMORY_DB: &str = "memory.db";

pub fn memory_path(config: &MnemoConfig) -> std::path::PathBuf {
    Path::new(&config.agent.users_dir).join(MEMORY_DB)
}

/// Build the pipeline described by `config`.
pub async fn build_pipeline(config: &MnemoConfig) -> Result<Pipeline, MnemoError> {
    let db = Database::open(&config.storage).await?;
    let memory = Arc::new(SqliteMemoryStore::open(memory_path(config)).await?);
    let recorder = UsageRecorder::new(db.clone());
    let responder = Responder::from_config(config)?.with_usage_sink(Arc::new(recorder));

    let settings = SettingsStore::from_config(config);
    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, &settings);

    Ok(Pipeline::new(settings, AddonManager::new(registry), memory, responder, db)
        .with_cot_max_rounds(config.cot.max_rounds))
}

/// Run the `mnemo chat` command.
pub async fn run_chat(config: &MnemoConfig, args: ChatArgs) -> Result<(), MnemoError> {
    let db = Database::open(&config.storage).await?;
    users::ensure_user(&db, &args.user).await?;
    let pipeline = build_pipeline(config).await?;

    let request = MessageRequest {
        chat_id: args.chat_id,
        display_name: args.display_name,
        ..MessageRequest::new(&args.user, &args.message)
    };
    let reply = pipeline.process_message(request).await?;
    debug!(user = %args.user, remaining = reply.trace.remaining, "chat reply ready");

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reply).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        println!("{}", reply.content);
    }
    Ok(())
}
