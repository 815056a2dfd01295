// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost accounting for speech synthesis and transcription.

use mnemo_core::MnemoError;
use mnemo_storage::Database;
use mnemo_storage::queries::statistics;
use tracing::info;

/// Lifetime totals reported after an audio charge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioCharge {
    /// This charge in USD.
    pub cost: f64,
    /// Lifetime tokens (synthesized characters count as tokens).
    pub total_tokens: i64,
    /// Lifetime spend including voice.
    pub total_cost: f64,
}

/// Charge a user for synthesizing `characters` characters of speech.
pub async fn record_speech(
    db: &Database,
    username: &str,
    characters: usize,
) -> Result<AudioCharge, MnemoError> {
    let characters = i64::try_from(characters).unwrap_or(i64::MAX);
    let before = statistics::statistic(db, username)
        .await?
        .map(|s| s.voice_usage)
        .unwrap_or(0.0);
    let totals = statistics::add_voice_usage(db, username, characters).await?;
    let (total_tokens, total_cost) = statistics::get_token_usage(db, username, false).await?;

    let cost = totals.voice_usage - before;
    info!(user = username, characters, cost, "speech usage recorded");
    Ok(AudioCharge {
        cost,
        total_tokens,
        total_cost,
    })
}

/// Charge a user for a transcription that cost `cost` USD.
pub async fn record_transcription(
    db: &Database,
    username: &str,
    cost: f64,
) -> Result<AudioCharge, MnemoError> {
    statistics::add_whisper_usage(db, username, cost).await?;
    let (total_tokens, total_cost) = statistics::get_token_usage(db, username, false).await?;
    info!(user = username, cost, "transcription usage recorded");
    Ok(AudioCharge {
        cost,
        total_tokens,
        total_cost,
    })
}
