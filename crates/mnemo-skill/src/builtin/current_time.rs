// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `get_current_time`: the current time in the caller's timezone.

use async_trait::async_trait;
use chrono::Utc;
use mnemo_config::SettingsStore;
use mnemo_core::MnemoError;
use serde_json::{Value, json};
use tracing::debug;

use super::username;
use crate::tool::{Tool, ToolOutput};

pub struct CurrentTimeTool {
    settings: SettingsStore,
}

impl CurrentTimeTool {
    pub fn new(settings: SettingsStore) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in the user's timezone"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn invoke(&self, input: Value) -> Result<ToolOutput, MnemoError> {
        let user = username(&input)?;
        let timezone = self.settings.load(user).await?.timezone();
        let now = timezone.localize(Utc::now());
        debug!(user, timezone = %timezone.label(), "current time requested");
        Ok(ToolOutput::text(format!(
            "{} ({})",
            now.format("%A %d %B %Y %H:%M:%S"),
            timezone.label()
        )))
    }
}
