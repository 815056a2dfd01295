// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request handling for the Mnemo agent backend.
//!
//! A [`Pipeline`] takes one user message through settings, token budgeting,
//! memory recall, and prompt assembly, then asks the [`Responder`] for a
//! reply. Function calls in the reply go through the [`Dispatcher`], and
//! users with chain-of-thought enabled are answered by [`ChainOfThought`].

pub mod args;
pub mod cot;
pub mod dispatch;
pub mod pipeline;
pub mod responder;
pub mod state;

pub use args::{parse_arguments, parse_local};
pub use cot::{ChainOfThought, CotOutcome};
pub use dispatch::{DispatchOutcome, Dispatcher, extract_content};
pub use pipeline::{MessageRequest, Pipeline, PipelineReply, Trace};
pub use responder::{MAX_OUTPUT_TOKENS, Reply, RespondOptions, Responder, StopFlags};
pub use state::{MAX_NESTED_CALLS, RequestState};
