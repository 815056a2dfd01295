// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The user-facing LLM call: provider selection, stream accumulation,
//! usage reporting, and the per-user stop flag.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use futures::StreamExt;
use mnemo_anthropic::AnthropicProvider;
use mnemo_config::MnemoConfig;
use mnemo_core::{
    ChatMessage, FunctionCall, FunctionCallMode, MnemoError, ProviderAdapter, ProviderRequest,
    ProviderStream, StreamEventType, TokenUsage, UsageEvent, UsageSink,
};
use mnemo_openai::OpenAiProvider;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Output ceiling for any single reply.
pub const MAX_OUTPUT_TOKENS: u32 = 4000;

/// Per-call knobs.
#[derive(Debug, Clone)]
pub struct RespondOptions {
    pub model: String,
    pub stream: bool,
    pub max_tokens: u32,
    pub tools: Vec<Value>,
    pub function_call: FunctionCallMode,
}

impl RespondOptions {
    /// Streaming call with the given tools offered in `auto` mode.
    pub fn streaming(model: impl Into<String>, max_tokens: u32, tools: Vec<Value>) -> Self {
        Self {
            model: model.into(),
            stream: true,
            max_tokens,
            tools,
            function_call: FunctionCallMode::Auto,
        }
    }

    /// Non-streaming call without tools.
    pub fn plain(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            stream: false,
            max_tokens,
            tools: Vec::new(),
            function_call: FunctionCallMode::None,
        }
    }
}

/// What the model said, or the function it wants called.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub content: String,
    pub function_call: Option<FunctionCall>,
    pub usage: TokenUsage,
    /// The stream was cut short by the user's stop flag.
    pub stopped: bool,
}

/// Users whose in-flight reply should end early.
#[derive(Debug, Clone, Default)]
pub struct StopFlags {
    users: Arc<RwLock<HashSet<String>>>,
}

impl StopFlags {
    pub fn request_stop(&self, user: &str) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.to_string());
    }

    pub fn reset(&self, user: &str) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user);
    }

    pub fn is_set(&self, user: &str) -> bool {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(user)
    }
}

/// Routes chat requests to OpenAI (`gpt*` models) or Anthropic.
#[derive(Clone)]
pub struct Responder {
    openai: Option<Arc<dyn ProviderAdapter>>,
    anthropic: Option<Arc<dyn ProviderAdapter>>,
    usage: Option<Arc<dyn UsageSink>>,
    temperature: f32,
    stops: StopFlags,
}

impl Responder {
    pub fn new(temperature: f32) -> Self {
        Self {
            openai: None,
            anthropic: None,
            usage: None,
            temperature,
            stops: StopFlags::default(),
        }
    }

    /// Builds a provider for every API key that resolves.
    pub fn from_config(config: &MnemoConfig) -> Result<Self, MnemoError> {
        let mut responder = Self::new(config.provider.temperature);
        if config.openai_api_key().is_some() {
            responder.openai = Some(Arc::new(OpenAiProvider::new(config)?));
        }
        if config.anthropic_api_key().is_some() {
            responder.anthropic = Some(Arc::new(AnthropicProvider::new(config)?));
        }
        if responder.openai.is_none() && responder.anthropic.is_none() {
            warn!("no provider API key configured");
        }
        Ok(responder)
    }

    pub fn with_openai(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.openai = Some(provider);
        self
    }

    pub fn with_anthropic(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.anthropic = Some(provider);
        self
    }

    pub fn with_usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage = Some(sink);
        self
    }

    pub fn usage_sink(&self) -> Option<&Arc<dyn UsageSink>> {
        self.usage.as_ref()
    }

    pub fn stop_flags(&self) -> &StopFlags {
        &self.stops
    }

    /// Provider serving `model`.
    pub fn provider_for(&self, model: &str) -> Result<Arc<dyn ProviderAdapter>, MnemoError> {
        let (slot, name) = if model.starts_with("gpt") {
            (&self.openai, "openai")
        } else {
            (&self.anthropic, "anthropic")
        };
        slot.clone().ok_or_else(|| MnemoError::AdapterNotFound {
            adapter_type: "Provider".into(),
            name: name.into(),
        })
    }

    /// Sends `messages` and returns the accumulated reply.
    pub async fn respond(
        &self,
        user: &str,
        messages: Vec<ChatMessage>,
        options: RespondOptions,
    ) -> Result<Reply, MnemoError> {
        let provider = self.provider_for(&options.model)?;
        let model = options.model.clone();
        let request = ProviderRequest {
            model: options.model,
            messages,
            temperature: self.temperature,
            max_tokens: options.max_tokens,
            stream: options.stream,
            tools: options.tools,
            function_call: options.function_call,
        };

        let started = Instant::now();
        let reply = if request.stream {
            let stream = provider.stream(request).await?;
            self.collect(user, stream).await?
        } else {
            let response = provider.complete(request).await?;
            Reply {
                content: response.content,
                function_call: response.function_call,
                usage: response.usage,
                stopped: false,
            }
        };
        let elapsed = started.elapsed();

        debug!(
            user,
            model = model.as_str(),
            input_tokens = reply.usage.input_tokens,
            output_tokens = reply.usage.output_tokens,
            function_call = reply.function_call.as_ref().map(|c| c.name.as_str()),
            elapsed_ms = elapsed.as_millis() as u64,
            "reply complete"
        );
        self.record(user, &model, reply.usage, elapsed).await;
        Ok(reply)
    }

    async fn collect(&self, user: &str, mut stream: ProviderStream) -> Result<Reply, MnemoError> {
        let mut reply = Reply::default();
        while let Some(chunk) = stream.next().await {
            if self.stops.is_set(user) {
                info!(user, chars = reply.content.len(), "stream stopped by user");
                reply.stopped = true;
                break;
            }
            let chunk = chunk?;
            match chunk.event_type {
                StreamEventType::TextDelta => {
                    if let Some(text) = chunk.text {
                        reply.content.push_str(&text);
                    }
                }
                StreamEventType::FunctionCall => {
                    if chunk.function_call.is_some() {
                        reply.function_call = chunk.function_call;
                    }
                }
                StreamEventType::Usage => {
                    if let Some(usage) = chunk.usage {
                        reply.usage = usage;
                    }
                }
                StreamEventType::Stop => break,
            }
        }
        Ok(reply)
    }

    async fn record(&self, user: &str, model: &str, usage: TokenUsage, elapsed: Duration) {
        let Some(sink) = &self.usage else {
            return;
        };
        let event = UsageEvent {
            username: user.to_string(),
            model: model.to_string(),
            usage,
            elapsed,
            brain: false,
        };
        if let Err(e) = sink.record_usage(event).await {
            warn!(user, model, error = %e, "failed to record usage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_flags_are_per_user() {
        let flags = StopFlags::default();
        flags.request_stop("ada");
        assert!(flags.is_set("ada"));
        assert!(!flags.is_set("bob"));

        let shared = flags.clone();
        shared.reset("ada");
        assert!(!flags.is_set("ada"));
    }

    #[test]
    fn missing_provider_is_adapter_not_found() {
        let responder = Responder::new(0.1);
        let err = responder.provider_for("gpt-4o").err().unwrap();
        assert!(matches!(err, MnemoError::AdapterNotFound { ref name, .. } if name == "openai"));
        let err = responder.provider_for("claude-3-opus-20240229").err().unwrap();
        assert!(matches!(err, MnemoError::AdapterNotFound { ref name, .. } if name == "anthropic"));
    }

    #[test]
    fn option_presets() {
        let opts = RespondOptions::streaming("gpt-4o", 100, vec![serde_json::json!({})]);
        assert!(opts.stream);
        assert_eq!(opts.function_call, FunctionCallMode::Auto);

        let opts = RespondOptions::plain("gpt-4o", 100);
        assert!(!opts.stream);
        assert!(opts.tools.is_empty());
    }
}
