// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maintenance commands: `purge`, `migrate` and `settings`.

use mnemo_config::{MnemoConfig, SettingsStore};
use mnemo_core::{MemoryClient, MnemoError};
use mnemo_memory::SqliteMemoryStore;
use mnemo_storage::Database;
use mnemo_storage::queries::users;
use tracing::info;

use crate::chat::memory_path;

/// Rows and memories removed by a purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub found: bool,
    pub memories: usize,
}

pub async fn purge(
    db: &Database,
    memory: Option<&dyn MemoryClient>,
    user: &str,
) -> Result<PurgeOutcome, MnemoError> {
    let found = users::purge_user(db, user).await?;
    let memories = match memory {
        Some(store) => store.wipe_all(Some(user)).await?,
        None => 0,
    };
    info!(user, found, memories, "user purged");
    Ok(PurgeOutcome { found, memories })
}

/// Run the `mnemo purge` command.
pub async fn run_purge(config: &MnemoConfig, user: &str, memories: bool) -> Result<(), MnemoError> {
    let db = Database::open(&config.storage).await?;
    let store = if memories {
        Some(SqliteMemoryStore::open(memory_path(config)).await?)
    } else {
        None
    };
    let outcome = purge(&db, store.as_ref().map(|s| s as &dyn MemoryClient), user).await?;

    if !outcome.found {
        return Err(MnemoError::NotFound(format!("user {user}")));
    }
    println!("purged {user}");
    if memories {
        println!("removed {} memories", outcome.memories);
    }
    Ok(())
}

/// Run the `mnemo migrate` command. Opening the database applies pending
/// migrations; the applied list is printed.
pub async fn run_migrate(config: &MnemoConfig) -> Result<(), MnemoError> {
    let db = Database::open(&config.storage).await?;
    for name in db.applied_migrations().await? {
        println!("{name}");
    }
    Ok(())
}

/// Run the `mnemo settings` command. Loading heals the document and writes
/// it back, so this also repairs an outdated settings file.
pub async fn run_settings(config: &MnemoConfig, user: &str) -> Result<(), MnemoError> {
    let store = SettingsStore::from_config(config);
    let settings = store.load(user).await?;
    println!("{}", serde_json::to_string_pretty(settings.document())?);
    Ok(())
}
