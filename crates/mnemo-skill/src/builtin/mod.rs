// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in addons, available without any registration by the host.

pub mod current_time;
pub mod notes;

pub use current_time::CurrentTimeTool;
pub use notes::ReadNotesTool;

use std::sync::Arc;

use mnemo_config::SettingsStore;

use crate::ToolRegistry;

/// Registers all built-in addons into the given registry.
pub fn register_builtins(registry: &mut ToolRegistry, settings: &SettingsStore) {
    registry.register(Arc::new(CurrentTimeTool::new(settings.clone())));
    registry.register(Arc::new(ReadNotesTool::new(settings.users_dir())));
}

/// The `username` the dispatcher injects into every call.
pub(crate) fn username(input: &serde_json::Value) -> Result<&str, mnemo_core::MnemoError> {
    input
        .get("username")
        .and_then(serde_json::Value::as_str)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| mnemo_core::MnemoError::Internal("missing username argument".into()))
}
