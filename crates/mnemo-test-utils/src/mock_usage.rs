// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage sink that keeps every event in memory.

use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::{MnemoError, UsageEvent, UsageSink};
use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct MockUsageSink {
    events: Arc<Mutex<Vec<UsageEvent>>>,
    fail: bool,
}

impl MockUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every call fails, for checking that failures are swallowed.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl UsageSink for MockUsageSink {
    async fn record_usage(&self, event: UsageEvent) -> Result<(), MnemoError> {
        self.events.lock().await.push(event);
        if self.fail {
            return Err(MnemoError::Internal("usage sink unavailable".into()));
        }
        Ok(())
    }
}
