// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for providers, memory stores, and usage sinks.
//!
//! Adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod memory;
pub mod provider;
pub mod usage;

pub use adapter::PluginAdapter;
pub use memory::MemoryClient;
pub use provider::{ProviderAdapter, ProviderStream};
pub use usage::UsageSink;
