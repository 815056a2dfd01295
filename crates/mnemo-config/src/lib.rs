// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Mnemo agent backend.
//!
//! Two layers live here: the server configuration (`mnemo.toml` plus `MNEMO_*`
//! environment overrides, validated with miette diagnostics) and the per-user
//! settings documents stored under `agent.users_dir`.
//!
//! # Usage
//!
//! ```no_run
//! use mnemo_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("users live in {}", config.agent.users_dir);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod paths;
pub mod settings;
pub mod timezone;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::MnemoConfig;
pub use paths::{UserPaths, convert_username};
pub use settings::{MemorySettings, SettingsStore, UserSettings, default_settings};
pub use timezone::UserTimezone;

/// Load configuration from the XDG hierarchy and validate it.
///
/// Figment errors are converted into diagnostics pointing into the TOML file
/// that caused them.
pub fn load_and_validate() -> Result<MnemoConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(
            err,
            &read_toml_sources(),
        )),
    }
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<MnemoConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

fn read_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![std::path::PathBuf::from("/etc/mnemo/mnemo.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("mnemo/mnemo.toml"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("mnemo.toml"));
    }

    candidates
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            Some((path.display().to_string(), content))
        })
        .collect()
}
