// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The message pipeline: budget the prompt, recall memory, generate, and
//! dispatch function calls for one user message.

use std::sync::Arc;

use chrono::NaiveDateTime;
use mnemo_config::{SettingsStore, UserSettings, UserTimezone};
use mnemo_context::history::HISTORY_WINDOW;
use mnemo_context::prompts::{self, NO_OBSERVATIONS, TAB_DESCRIPTION_SYSTEM_PROMPT};
use mnemo_context::{
    ACCOUNTING_MODEL, ChatPrompt, Debit, HistoryEntry, RecentHistory, TokenBudget, count,
    count_functions, date_line, episodic_block, full_message, inject_image_description,
    instruction_string, select_system_prompt, truncate_before_uid,
};
use mnemo_core::{ChatMessage, MemoryClient, Metadata, MnemoError};
use mnemo_memory::fusion::render_dated;
use mnemo_memory::{ACTIVE_BRAIN, Brain, MemoryFusion, NoteStore, NoteTaker, merge};
use mnemo_skill::{AddonManager, EnabledAddons};
use mnemo_storage::Database;
use mnemo_storage::queries::{statistics, users};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::cot::ChainOfThought;
use crate::dispatch::{Dispatcher, extract_content};
use crate::responder::{MAX_OUTPUT_TOKENS, RespondOptions, Responder};
use crate::state::RequestState;

/// Sections with an allowance at or below this are skipped.
pub const MIN_SECTION_ALLOWANCE: i64 = 100;

/// Author recorded on stored assistant replies.
const ASSISTANT: &str = "assistant";

/// One incoming chat message.
#[derive(Debug, Clone, Default)]
pub struct MessageRequest {
    pub user: String,
    pub message: String,
    pub chat_id: Option<String>,
    pub display_name: Option<String>,
    /// Client id of the message, stored with the memories it creates.
    pub uid: Option<String>,
    /// Answer again, ignoring history from `uid` on and skipping recall.
    pub regenerate: bool,
    pub image_description: Option<String>,
    /// Original send time for imported or replayed messages.
    pub timestamp: Option<NaiveDateTime>,
}

impl MessageRequest {
    pub fn new(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            message: message.into(),
            ..Self::default()
        }
    }
}

/// How the token budget was spent.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub limit: i64,
    pub remaining: i64,
    pub debits: Vec<Debit>,
}

impl From<&TokenBudget> for Trace {
    fn from(budget: &TokenBudget) -> Self {
        Self {
            limit: budget.limit(),
            remaining: budget.remaining(),
            debits: budget.debits().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReply {
    pub content: String,
    /// Functions that ran while answering, in order.
    pub functions: Vec<String>,
    /// The reply was stored in the active brain.
    pub stored: bool,
    pub trace: Trace,
}

/// Recall output feeding the system turn.
#[derive(Default)]
struct Recall {
    memory: String,
    instruction: String,
}

/// Wires settings, addons, memory, and the responder together.
#[derive(Clone)]
pub struct Pipeline {
    settings: SettingsStore,
    addons: AddonManager,
    memory: Arc<dyn MemoryClient>,
    responder: Responder,
    db: Database,
    cot_max_rounds: u32,
}

impl Pipeline {
    pub fn new(
        settings: SettingsStore,
        addons: AddonManager,
        memory: Arc<dyn MemoryClient>,
        responder: Responder,
        db: Database,
    ) -> Self {
        Self {
            settings,
            addons,
            memory,
            responder,
            db,
            cot_max_rounds: 2,
        }
    }

    pub fn with_cot_max_rounds(mut self, rounds: u32) -> Self {
        self.cot_max_rounds = rounds;
        self
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Ends the user's in-flight reply with the text streamed so far.
    pub fn stop(&self, user: &str) {
        self.responder.stop_flags().request_stop(user);
    }

    fn brain(&self, model: &str) -> Result<Brain, MnemoError> {
        let brain = Brain::new(self.responder.provider_for(model)?, model);
        Ok(match self.responder.usage_sink() {
            Some(sink) => brain.with_usage_sink(Arc::clone(sink)),
            None => brain,
        })
    }

    /// Answers one message.
    pub async fn process_message(&self, request: MessageRequest) -> Result<PipelineReply, MnemoError> {
        let user = request.user.as_str();
        let chat_id = request.chat_id.as_deref();
        self.responder.stop_flags().reset(user);

        let (settings, addons) = self.addons.load(&self.settings, user).await?;
        let allowance = settings.memory();
        let model = settings.active_model().to_string();
        let timezone = settings.timezone();
        let mut budget = TokenBudget::new(allowance.max_tokens);
        budget.debit("functions", count_functions(addons.schemas(), ACCOUNTING_MODEL));

        let records = self
            .memory
            .most_recent(ACTIVE_BRAIN, HISTORY_WINDOW, chat_id, Some(user))
            .await?;
        let mut entries: Vec<HistoryEntry> = records.into_iter().map(HistoryEntry::from).collect();
        if request.regenerate {
            if let Some(uid) = request.uid.as_deref() {
                entries = truncate_before_uid(entries, uid);
            }
        }
        let history = RecentHistory::fit(entries, allowance.recent);
        let all_messages = history.all_messages(&request.message);
        budget.debit("all_messages", count(&all_messages, ACCOUNTING_MODEL));

        if let Some(chat_id) = chat_id {
            if history.entries.len() >= 2 {
                self.describe_tab(user, chat_id, &model, &all_messages).await;
            }
        }

        let brain = self.brain(&model)?;
        let fusion = MemoryFusion::new(Arc::clone(&self.memory), brain.clone(), timezone.clone())
            .verbose(settings.verbose());
        let recall = if request.regenerate {
            debug!(user, "regenerating, memory recall skipped");
            Recall::default()
        } else {
            self.recall(&request, &settings, &fusion, brain, &timezone, &all_messages, &mut budget)
                .await?
        };

        let message = match &request.image_description {
            Some(description) => inject_image_description(&request.message, description),
            None => request.message.clone(),
        };
        let display_name = match &request.display_name {
            Some(name) => name.clone(),
            None => users::display_name(&self.db, user).await?,
        };
        let system_prompt = select_system_prompt(settings.system_prompt());
        let date = date_line(request.timestamp, &timezone);
        let full = full_message(&display_name, &recall.memory, &recall.instruction);
        let messages = ChatPrompt {
            system_prompt: &system_prompt,
            date_line: &date,
            full_message: &full,
            history: &history.entries,
            user_message: &message,
        }
        .into_messages();

        budget.ensure_non_negative()?;

        let max_tokens = allowance.output.clamp(1, i64::from(MAX_OUTPUT_TOKENS)) as u32;
        let mut state = RequestState::new(user, model.as_str(), max_tokens)
            .with_chat_id(request.chat_id.clone())
            .with_max_cot_rounds(self.cot_max_rounds);
        let dispatcher = Dispatcher::new(&self.responder, &addons);

        let (content, functions) = if settings.cot_enabled() {
            let context = &messages[..messages.len().saturating_sub(1)];
            let outcome = ChainOfThought::new(&dispatcher).run(&mut state, &message, context).await?;
            (outcome.answer, Vec::new())
        } else {
            self.generate(&dispatcher, &mut state, &addons, messages, &message).await?
        };

        let stored = if functions.is_empty() && !content.is_empty() {
            let metadata = reply_metadata(chat_id, request.uid.as_deref());
            fusion.process_assistant_reply(user, &content, metadata).await?
        } else {
            false
        };

        let (daily, total) = statistics::update_message_count(&self.db, user).await?;
        info!(
            user,
            model = model.as_str(),
            functions = functions.len(),
            remaining = budget.remaining(),
            daily,
            total,
            "message processed"
        );

        Ok(PipelineReply {
            content,
            functions,
            stored,
            trace: Trace::from(&budget),
        })
    }

    async fn generate(
        &self,
        dispatcher: &Dispatcher<'_>,
        state: &mut RequestState,
        addons: &EnabledAddons,
        messages: Vec<ChatMessage>,
        message: &str,
    ) -> Result<(String, Vec<String>), MnemoError> {
        let options = RespondOptions::streaming(&state.model, state.max_tokens, addons.schemas().to_vec());
        let reply = self.responder.respond(&state.user, messages, options).await?;

        match reply.function_call {
            Some(call) if !reply.stopped => {
                let outcome = dispatcher.dispatch(state, call, message).await?;
                Ok((extract_content(&outcome.content), outcome.calls))
            }
            _ => Ok((extract_content(&reply.content), Vec::new())),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn recall(
        &self,
        request: &MessageRequest,
        settings: &UserSettings,
        fusion: &MemoryFusion,
        brain: Brain,
        timezone: &UserTimezone,
        all_messages: &str,
        budget: &mut TokenBudget,
    ) -> Result<Recall, MnemoError> {
        let user = request.user.as_str();
        let allowance = settings.memory();
        let metadata = message_metadata(request);

        let active = fusion
            .process_active_brain(user, &request.message, all_messages, allowance.ltm1, metadata.clone())
            .await?;
        budget.debit("active_brain", active.tokens);

        let episodic = if allowance.episodic > MIN_SECTION_ALLOWANCE {
            let (result, label) = fusion
                .process_episodic_memory(user, &request.message, allowance.episodic)
                .await?;
            episodic_block(&label, &result.rendered)
        } else {
            String::new()
        };
        budget.debit("episodic", count(&episodic, ACCOUNTING_MODEL));

        let memory = if allowance.ltm2 > MIN_SECTION_ALLOWANCE {
            let incoming = fusion
                .process_incoming_memory(user, &request.message, allowance.ltm2, metadata)
                .await?;
            budget.debit("categorised", incoming.tokens);
            render_dated(&merge(&active.entries, &incoming.entries))
        } else {
            budget.debit("categorised", 0);
            String::new()
        };

        let notes = if allowance.notes > MIN_SECTION_ALLOWANCE {
            let store = NoteStore::for_user(&self.settings.paths(user));
            let taker = NoteTaker::new(store, brain, timezone.clone()).verbose(settings.verbose());
            Some(taker.take_notes(user, all_messages, &request.message).await?)
        } else {
            None
        };
        let notes_tokens = notes
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(|n| count(&prompts::notes(n), ACCOUNTING_MODEL))
            .unwrap_or(0);
        budget.debit("notes", notes_tokens);

        Ok(Recall {
            memory,
            instruction: instruction_string(&episodic, NO_OBSERVATIONS, notes.as_deref()),
        })
    }

    /// Names a placeholder chat tab after the conversation. Never fails the request.
    async fn describe_tab(&self, user: &str, chat_id: &str, model: &str, all_messages: &str) {
        match users::needs_tab_description(&self.db, chat_id).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(user, chat_id, error = %e, "failed to read chat tab");
                return;
            }
        }

        let messages = vec![
            ChatMessage::system(TAB_DESCRIPTION_SYSTEM_PROMPT),
            ChatMessage::user(all_messages),
        ];
        let options = RespondOptions::plain(model, MAX_OUTPUT_TOKENS);
        let title = match self.responder.respond(user, messages, options).await {
            Ok(reply) if !reply.content.trim().is_empty() => reply.content.trim().to_string(),
            Ok(_) => return,
            Err(e) => {
                warn!(user, chat_id, error = %e, "failed to generate tab description");
                return;
            }
        };
        match users::update_tab_description(&self.db, chat_id, &title).await {
            Ok(_) => debug!(user, chat_id, title = title.as_str(), "chat tab renamed"),
            Err(e) => warn!(user, chat_id, error = %e, "failed to store tab description"),
        }
    }
}

fn message_metadata(request: &MessageRequest) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("username".into(), Value::String(request.user.clone()));
    if let Some(chat_id) = &request.chat_id {
        metadata.insert("chat_id".into(), Value::String(chat_id.clone()));
    }
    if let Some(uid) = &request.uid {
        metadata.insert("uid".into(), Value::String(uid.clone()));
    }
    if let Some(ts) = request.timestamp {
        metadata.insert("created_at".into(), json!(ts.and_utc().timestamp() as f64));
    }
    metadata
}

fn reply_metadata(chat_id: Option<&str>, uid: Option<&str>) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("username".into(), Value::String(ASSISTANT.into()));
    if let Some(chat_id) = chat_id {
        metadata.insert("chat_id".into(), Value::String(chat_id.into()));
    }
    if let Some(uid) = uid {
        metadata.insert("uid".into(), Value::String(uid.into()));
    }
    metadata
}
