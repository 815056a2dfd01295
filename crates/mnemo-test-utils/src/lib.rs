// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Mnemo integration tests.
//!
//! Provides scripted adapters and a harness for fast, deterministic tests
//! without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - LLM provider playing back scripted replies
//! - [`MockUsageSink`] - usage sink that records every event
//! - [`TestHarness`] - a full message pipeline over temp storage

pub mod harness;
pub mod mock_provider;
pub mod mock_usage;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_provider::{MOCK_USAGE, MockProvider, MockReply};
pub use mock_usage::MockUsageSink;
