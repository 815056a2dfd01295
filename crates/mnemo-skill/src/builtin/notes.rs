// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `read_notes`: every note of the caller.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mnemo_config::UserPaths;
use mnemo_core::MnemoError;
use mnemo_memory::NoteStore;
use serde_json::{Value, json};

use super::username;
use crate::tool::{Tool, ToolOutput};

pub struct ReadNotesTool {
    users_dir: PathBuf,
}

impl ReadNotesTool {
    pub fn new(users_dir: impl AsRef<Path>) -> Self {
        Self {
            users_dir: users_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Tool for ReadNotesTool {
    fn name(&self) -> &str {
        "read_notes"
    }

    fn description(&self) -> &str {
        "Read all notes the assistant has taken about the user"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn invoke(&self, input: Value) -> Result<ToolOutput, MnemoError> {
        let user = username(&input)?;
        let store = NoteStore::for_user(&UserPaths::new(&self.users_dir, user));
        let notes = store.notes_as_string().await?;
        if notes.is_empty() {
            return Ok(ToolOutput::text("No notes found."));
        }
        Ok(ToolOutput::text(notes))
    }
}
