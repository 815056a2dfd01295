// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Internal LLM calls made on behalf of the memory and notes pipelines.

use std::sync::Arc;
use std::time::Instant;

use mnemo_context::BrainRole;
use mnemo_core::{
    ChatMessage, FunctionCallMode, MnemoError, ProviderAdapter, ProviderRequest, UsageEvent,
    UsageSink,
};
use tracing::{debug, warn};

/// Sampling temperature for brain calls.
pub const BRAIN_TEMPERATURE: f32 = 0.1;

/// Issues single-turn role prompts and books their usage as brain tokens.
#[derive(Clone)]
pub struct Brain {
    provider: Arc<dyn ProviderAdapter>,
    model: String,
    usage: Option<Arc<dyn UsageSink>>,
}

impl Brain {
    pub fn new(provider: Arc<dyn ProviderAdapter>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            usage: None,
        }
    }

    pub fn with_usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage = Some(sink);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends `prompt` under `role`'s system prompt and returns the reply text.
    pub async fn ask(
        &self,
        role: BrainRole,
        prompt: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, MnemoError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(role.system_prompt()),
                ChatMessage::user(prompt),
            ],
            temperature: BRAIN_TEMPERATURE,
            max_tokens,
            stream: false,
            tools: Vec::new(),
            function_call: FunctionCallMode::None,
        };

        let started = Instant::now();
        let response = self.provider.complete(request).await?;
        let elapsed = started.elapsed();
        debug!(
            role = role.as_str(),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            elapsed_ms = elapsed.as_millis() as u64,
            "brain call complete"
        );

        if let Some(sink) = &self.usage {
            let event = UsageEvent {
                username: user.to_string(),
                model: self.model.clone(),
                usage: response.usage,
                elapsed,
                brain: true,
            };
            if let Err(e) = sink.record_usage(event).await {
                warn!(user, error = %e, "failed to record brain usage");
            }
        }

        Ok(response.content.trim().to_string())
    }
}
