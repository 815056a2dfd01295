// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-term memory for the Mnemo agent backend.
//!
//! - [`store`]: the SQLite-backed [`MemoryClient`](mnemo_core::MemoryClient)
//! - [`fusion`]: recall from the active brain, categorised and episodic
//!   memory, deduplicated and trimmed to a token allowance
//! - [`notes`]: per-user note files and the note taker
//! - [`brain`]: the internal LLM calls these pipelines make

pub mod brain;
pub mod fusion;
pub mod notes;
pub mod store;

pub use brain::Brain;
pub use fusion::{ACTIVE_BRAIN, EPISODIC, FusedEntry, FusionResult, MemoryFusion, merge};
pub use notes::{ApplyOutcome, NoteAction, NoteStore, NoteTaker, parse_note_actions};
pub use store::{SqliteMemoryStore, lexical_distance};
