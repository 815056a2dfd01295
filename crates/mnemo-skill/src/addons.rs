// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciles a user's addon flags with the registered tools.

use std::collections::BTreeMap;
use std::sync::Arc;

use mnemo_config::{SettingsStore, UserSettings};
use mnemo_core::MnemoError;
use serde_json::Value;
use tracing::{debug, info};

use crate::tool::{Tool, ToolRegistry, function_schema};

/// Result of resolving a function name the model asked for.
pub enum AddonLookup {
    Enabled(Arc<dyn Tool>),
    /// Registered, but switched off in the user's settings.
    Disabled,
    /// No addon of that name is registered.
    Missing,
}

/// The addons one user can call during a request.
#[derive(Default)]
pub struct EnabledAddons {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    disabled: Vec<String>,
    schemas: Vec<Value>,
}

impl EnabledAddons {
    pub fn lookup(&self, name: &str) -> AddonLookup {
        if let Some(tool) = self.tools.get(name) {
            AddonLookup::Enabled(Arc::clone(tool))
        } else if self.disabled.iter().any(|d| d == name) {
            AddonLookup::Disabled
        } else {
            AddonLookup::Missing
        }
    }

    /// Function schemas of the enabled addons, sorted by name.
    pub fn schemas(&self) -> &[Value] {
        &self.schemas
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Owns the tool registry and applies it to settings documents.
#[derive(Clone)]
pub struct AddonManager {
    registry: Arc<ToolRegistry>,
}

impl AddonManager {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Drops flags of unregistered addons and adds new addons as disabled.
    ///
    /// Returns the enabled addons and whether the settings changed.
    pub fn reconcile(&self, settings: &mut UserSettings) -> (EnabledAddons, bool) {
        let current = settings.addons();
        let mut reconciled = BTreeMap::new();
        for name in self.registry.names() {
            let enabled = current.get(name).copied().unwrap_or_else(|| {
                info!(addon = name, "new addon registered, disabled by default");
                false
            });
            reconciled.insert(name.to_string(), enabled);
        }
        for stale in current.keys().filter(|k| !self.registry.contains(k)) {
            info!(addon = %stale, "removing unregistered addon from settings");
        }

        let changed = reconciled != current;
        if changed {
            settings.set_addons(&reconciled);
        }

        let mut addons = EnabledAddons::default();
        for (name, enabled) in reconciled {
            match self.registry.get(&name) {
                Some(tool) if enabled => {
                    addons.schemas.push(function_schema(tool.as_ref()));
                    addons.tools.insert(name, tool);
                }
                _ => addons.disabled.push(name),
            }
        }
        debug!(enabled = addons.tools.len(), changed, "addons reconciled");
        (addons, changed)
    }

    /// Loads a user's settings, reconciles them, and saves when they changed.
    pub async fn load(
        &self,
        store: &SettingsStore,
        username: &str,
    ) -> Result<(UserSettings, EnabledAddons), MnemoError> {
        let mut settings = store.load(username).await?;
        let (addons, changed) = self.reconcile(&mut settings);
        if changed {
            store.save(username, &settings).await?;
        }
        Ok((settings, addons))
    }
}
