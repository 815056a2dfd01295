// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Callback invoked after every successful provider call.

use async_trait::async_trait;

use crate::error::MnemoError;
use crate::types::UsageEvent;

/// Receives usage counters from the responder.
///
/// Errors returned here are logged by the caller and never abort a reply.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record_usage(&self, event: UsageEvent) -> Result<(), MnemoError>;
}
