// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait, addon registry, and built-in addons for the Mnemo agent backend.
//!
//! Addons are [`Tool`] trait objects registered explicitly at startup. Each
//! user's settings document carries an enabled flag per addon;
//! [`AddonManager`] keeps that map in sync with the registry and hands the
//! dispatcher the enabled subset.
//!
//! Built-in addons:
//! - [`builtin::CurrentTimeTool`]: the current time in the user's timezone
//! - [`builtin::ReadNotesTool`]: every note the user has

pub mod addons;
pub mod builtin;
pub mod tool;

pub use addons::{AddonLookup, AddonManager, EnabledAddons};
pub use tool::{Tool, ToolOutput, ToolRegistry};
