// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pricing and usage recording for the Mnemo agent backend.

pub mod pricing;
pub mod recorder;
pub mod voice;

pub use pricing::{MessageCost, ModelPricing, calculate_cost, get_pricing};
pub use recorder::{UsageRecorder, UsageReport};
pub use voice::{AudioCharge, record_speech, record_transcription};
