// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt templates.

/// Base system prompt appended to every persona.
pub const SYSTEM_PROMPT: &str = "You are a helpful personal assistant with a long-term memory. \
The memories, notes and episodic memory below were retrieved for this conversation and may be \
incomplete or only partly relevant. Use them when they help, never invent memories, and say so \
when you do not know something. Answer in the user's language. Use the available functions when \
a task needs them.";

/// Persona selected by the `stoic` system prompt setting.
pub const STOIC_SYSTEM_PROMPT: &str = "You are a calm and thoughtful companion in the tradition of \
the Stoics. You speak plainly, focus on what is within the user's control, and keep your answers \
short unless asked for detail.";

/// System prompt for the follow-up turn after a function ran.
pub const FUNCTION_REPLY_SYSTEM_PROMPT: &str = "You called a function on behalf of the user and \
its result follows. Use the result to answer the user's last message directly. Do not mention \
that a function was called unless the user asks. If the result is an error, explain briefly \
what went wrong.";

/// System prompt for repairing malformed function arguments.
pub const INVALID_JSON_SYSTEM_PROMPT: &str = "You repair malformed JSON. Reply with a single \
valid JSON object and nothing else: no code fences, no explanations.";

/// System prompt for naming a chat tab.
pub const TAB_DESCRIPTION_SYSTEM_PROMPT: &str = "You write titles for chat tabs. Describe the \
given conversation in under 5 words. Do not answer the conversation. Reply with the title only.";

/// Fixed suffix of the `all_messages` block.
pub const HISTORY_SUFFIX: &str = "\n Do not reply to any of the previous questions or messages! \
The chat above is for reference only. It is important to follow the previously given \
instructions and adhere to the required format and structure. Do not say anything else.\n";

/// Label used when no observations are available.
pub const NO_OBSERVATIONS: &str = "No observations available.";

/// First system message of a chat request.
pub fn start_message(display_name: &str, memory: &str, instruction: &str) -> String {
    format!(
        "You are talking to {display_name}.\n\
         Relevant memories (id, date, content and score, lower scores are closer matches):\n\
         {memory}\n\n\
         {instruction}\n\
         Only use the information above when it is relevant to the current message."
    )
}

/// Wraps the user's notes for the instruction block.
pub fn notes(notes: &str) -> String {
    format!("\nNotes:\n{notes}\n")
}

/// Asks the model to turn malformed arguments into valid JSON.
pub fn invalid_json(arguments: &str) -> String {
    format!(
        "The following function arguments are not valid JSON:\n{arguments}\n\n\
         Rewrite them as a valid JSON object with the same keys and values."
    )
}

/// Wraps the user message for a chain-of-thought planning turn.
pub fn cot_plan(message: &str) -> String {
    format!(
        "Break the following request down into a short numbered plan. Each step must be a \
         single action that can be carried out on its own, using the available functions \
         where needed. Reply with the numbered steps only.\n\nRequest: {message}"
    )
}

/// Asks the model whether the gathered step results answer the request.
pub fn cot_summary(message: &str, trace: &str) -> String {
    format!(
        "Request: {message}\n\nResults of the steps taken so far:\n{trace}\n\n\
         If these results are enough to answer the request, reply with `YES: ` followed by the \
         final answer. Otherwise reply with a new numbered plan for the remaining work."
    )
}

/// Role prompts for internal memory and notes calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrainRole {
    /// Splits a chat into search queries.
    Retriever,
    /// Produces `Category: query` lines.
    CategoriseQuery,
    /// Produces one category per line.
    Categorise,
    /// Emits note actions as JSON.
    Notetaker,
}

impl BrainRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrainRole::Retriever => "retriever",
            BrainRole::CategoriseQuery => "categorise_query",
            BrainRole::Categorise => "categorise",
            BrainRole::Notetaker => "notetaker",
        }
    }

    /// System prompt for this role.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            BrainRole::Retriever => {
                "You receive a short chat history and a last message. Break the last message \
                 down into several search queries for retrieving related messages. Reply with \
                 one query per line and nothing else, or `none` if no search is needed.\n\
                 Example:\nWhat is the capital of France?\nInfo about the capital of France"
            }
            BrainRole::CategoriseQuery => {
                "You receive a short chat history and a last message. For the last message give \
                 a category (Factual Information, Personal Information, Procedural Knowledge, \
                 Conceptual Knowledge, Meta-knowledge or Temporal Information) and a search \
                 query. One pair per line, in this format only: `category: query`.\n\
                 Example:\nProcedural Knowledge: how the backup script works\n\
                 Personal Information: the user's birthday"
            }
            BrainRole::Categorise => {
                "You receive a message. Give the categories it belongs to (Factual Information, \
                 Personal Information, Procedural Knowledge, Conceptual Knowledge, \
                 Meta-knowledge or Temporal Information), one per line and nothing else.\n\
                 Example:\nProcedural Knowledge\nPersonal Information"
            }
            BrainRole::Notetaker => {
                "You maintain the user's notes and task lists. You receive the current notes, a \
                 short chat history and a last message. Decide whether the last message should \
                 be added to, update or delete a note. Only store things worth keeping that the \
                 user asked for, like shopping lists, reminders or instructions. Reply with JSON \
                 only: a list of objects with the keys `action` (add, create, delete, update, \
                 skip), `file` (for example shoppinglist) and `content`. When updating a list, \
                 repeat the whole list.\n\
                 Example: [{\"action\": \"create\", \"file\": \"shoppinglist\", \"content\": \
                 \"cookies\"}]"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_message_carries_all_parts() {
        let msg = start_message("Ada", "(1) likes tea (score: 0.1)", "Observations:\nnone\n");
        assert!(msg.contains("Ada"));
        assert!(msg.contains("(1) likes tea"));
        assert!(msg.contains("Observations:"));
    }

    #[test]
    fn brain_roles_have_distinct_prompts() {
        let roles = [
            BrainRole::Retriever,
            BrainRole::CategoriseQuery,
            BrainRole::Categorise,
            BrainRole::Notetaker,
        ];
        for (i, a) in roles.iter().enumerate() {
            for b in &roles[i + 1..] {
                assert_ne!(a.system_prompt(), b.system_prompt());
            }
        }
        assert_eq!(BrainRole::CategoriseQuery.as_str(), "categorise_query");
    }

    #[test]
    fn invalid_json_embeds_arguments() {
        assert!(invalid_json("{'a': }").contains("{'a': }"));
    }
}
