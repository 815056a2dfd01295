// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chain-of-thought mode: plan, run each step, summarise, repeat until the
//! model answers `YES:` or the round cap is hit.

use std::sync::LazyLock;

use mnemo_context::prompts::{cot_plan, cot_summary};
use mnemo_core::{ChatMessage, MnemoError};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::dispatch::{Dispatcher, extract_content};
use crate::responder::RespondOptions;
use crate::state::RequestState;

static PLAN_STEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+[.)]\s*(.+?)\s*$").expect("plan step pattern is valid"));

const FINAL_MARKER: &str = "YES:";

/// Numbered steps of a plan. Unnumbered text counts as a single step.
pub fn parse_plan(plan: &str) -> Vec<String> {
    let steps: Vec<String> = plan
        .lines()
        .filter_map(|line| PLAN_STEP.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect();
    if steps.is_empty() && !plan.trim().is_empty() {
        return vec![plan.trim().to_string()];
    }
    steps
}

/// The answer following a leading `YES:`, if present.
pub fn final_answer(summary: &str) -> Option<&str> {
    summary.trim_start().strip_prefix(FINAL_MARKER).map(str::trim)
}

#[derive(Debug, Clone, Default)]
pub struct CotOutcome {
    pub answer: String,
    /// Step results of every round, in order.
    pub trace: String,
    pub rounds: u32,
}

pub struct ChainOfThought<'d, 'a> {
    dispatcher: &'d Dispatcher<'a>,
}

impl<'d, 'a> ChainOfThought<'d, 'a> {
    pub fn new(dispatcher: &'d Dispatcher<'a>) -> Self {
        Self { dispatcher }
    }

    /// Answers `message` step by step.
    ///
    /// `context` is the assembled conversation without the final user turn.
    pub async fn run(
        &self,
        state: &mut RequestState,
        message: &str,
        context: &[ChatMessage],
    ) -> Result<CotOutcome, MnemoError> {
        let responder = self.dispatcher.responder();
        let mut plan = responder
            .respond(&state.user, with_turn(context, cot_plan(message)), plain(state))
            .await?
            .content;
        let mut outcome = CotOutcome::default();
        let mut summary = String::new();

        while state.begin_cot_round() {
            outcome.rounds = state.cot_rounds();
            let steps = parse_plan(&plan);
            debug!(user = state.user.as_str(), round = outcome.rounds, steps = steps.len(), "running plan");

            for step in &steps {
                let result = self.run_step(state, step, &outcome.trace, context).await?;
                outcome.trace.push_str(&format!("- {step}\n{result}\n"));
            }

            summary = responder
                .respond(
                    &state.user,
                    with_turn(context, cot_summary(message, &outcome.trace)),
                    plain(state),
                )
                .await?
                .content;
            if let Some(answer) = final_answer(&summary) {
                info!(user = state.user.as_str(), rounds = outcome.rounds, "chain of thought finished");
                outcome.answer = answer.to_string();
                return Ok(outcome);
            }
            plan = summary.clone();
        }

        warn!(user = state.user.as_str(), rounds = outcome.rounds, "chain of thought round limit reached");
        outcome.answer = summary;
        Ok(outcome)
    }

    async fn run_step(
        &self,
        state: &mut RequestState,
        step: &str,
        trace: &str,
        context: &[ChatMessage],
    ) -> Result<String, MnemoError> {
        let prompt = if trace.is_empty() {
            step.to_string()
        } else {
            format!("{step}\n\nResults so far:\n{trace}")
        };
        let options = RespondOptions::streaming(
            &state.model,
            state.max_tokens,
            self.dispatcher.addons().schemas().to_vec(),
        );
        let reply = self
            .dispatcher
            .responder()
            .respond(&state.user, with_turn(context, prompt), options)
            .await?;

        match reply.function_call {
            Some(call) => {
                state.reset_calls();
                let outcome = self.dispatcher.dispatch(state, call, step).await?;
                Ok(extract_content(&outcome.content))
            }
            None => Ok(extract_content(&reply.content)),
        }
    }
}

fn plain(state: &RequestState) -> RespondOptions {
    RespondOptions::plain(&state.model, state.max_tokens)
}

fn with_turn(context: &[ChatMessage], content: String) -> Vec<ChatMessage> {
    let mut messages = context.to_vec();
    messages.push(ChatMessage::user(content));
    messages
}
