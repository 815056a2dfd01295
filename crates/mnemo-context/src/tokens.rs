// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token counting with tiktoken encodings.
//!
//! Budget accounting always counts with the encoding of
//! [`ACCOUNTING_MODEL`], regardless of which model answers the request.
//! Models without a known encoding fall back to counting characters.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use serde_json::Value;
use tiktoken_rs::CoreBPE;
use tiktoken_rs::tokenizer::{Tokenizer, get_tokenizer};
use tracing::{debug, warn};

/// Model whose encoding is used for context budgeting.
pub const ACCOUNTING_MODEL: &str = "gpt-4";

/// Fixed overhead of a function list, added once.
const FUNCTIONS_OVERHEAD: usize = 12;
/// Overhead of a `properties` block.
const PROPERTIES_OVERHEAD: usize = 11;

/// Encodings are expensive to build; keep one per encoding so model aliases
/// sharing an encoding share the entry. The key set is bounded by the
/// encodings tiktoken knows.
static ENCODINGS: LazyLock<Mutex<HashMap<Tokenizer, Arc<CoreBPE>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn encoding_for(model: &str) -> Option<Arc<CoreBPE>> {
    let Some(tokenizer) = get_tokenizer(model) else {
        debug!(model, "no tokenizer for model, counting characters");
        return None;
    };
    let mut cache = match ENCODINGS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(bpe) = cache.get(&tokenizer) {
        return Some(Arc::clone(bpe));
    }
    match tiktoken_rs::get_bpe_from_tokenizer(tokenizer) {
        Ok(bpe) => {
            let bpe = Arc::new(bpe);
            cache.insert(tokenizer, Arc::clone(&bpe));
            Some(bpe)
        }
        Err(e) => {
            warn!(model, error = %e, "failed to load tokenizer, counting characters");
            None
        }
    }
}

fn encoded_len(bpe: &CoreBPE, text: &str) -> usize {
    bpe.encode_with_special_tokens(text).len()
}

/// Number of tokens `text` takes in `model`'s encoding.
///
/// Never fails: an unknown model counts one token per character.
pub fn count(text: &str, model: &str) -> usize {
    match encoding_for(model) {
        Some(bpe) => encoded_len(&bpe, text),
        None => text.chars().count(),
    }
}

/// Estimated prompt cost of a list of function schemas.
///
/// Schemas are expected in `{"type": "function", "function": {...}}` form;
/// entries of any other type are ignored. Returns 0 for a model without a
/// known encoding.
pub fn count_functions(schemas: &[Value], model: &str) -> usize {
    let Some(bpe) = encoding_for(model) else {
        return 0;
    };

    let mut total: i64 = 0;
    for tool in schemas {
        if tool.get("type").and_then(Value::as_str) != Some("function") {
            continue;
        }
        let Some(function) = tool.get("function") else {
            continue;
        };
        let text_of = |key: &str| function.get(key).and_then(Value::as_str).unwrap_or("");

        let mut tokens = encoded_len(&bpe, text_of("name")) as i64;
        tokens += encoded_len(&bpe, text_of("description")) as i64;

        let properties = function
            .get("parameters")
            .and_then(|p| p.get("properties"))
            .and_then(Value::as_object);
        if let Some(properties) = properties {
            for (key, property) in properties {
                tokens += encoded_len(&bpe, key) as i64;
                let Some(fields) = property.as_object() else {
                    continue;
                };
                for (field, value) in fields {
                    match field.as_str() {
                        "type" | "description" => {
                            tokens += 2;
                            tokens += encoded_len(&bpe, value.as_str().unwrap_or("")) as i64;
                        }
                        "default" => tokens += 2,
                        "enum" => {
                            tokens -= 3;
                            for member in value.as_array().into_iter().flatten() {
                                tokens += 3;
                                let member = match member.as_str() {
                                    Some(s) => s.to_string(),
                                    None => member.to_string(),
                                };
                                tokens += encoded_len(&bpe, &member) as i64;
                            }
                        }
                        "items" => tokens += 10,
                        other => warn!(field = other, property = %key, "unsupported schema field"),
                    }
                }
            }
            tokens += PROPERTIES_OVERHEAD as i64;
        }
        total += tokens;
    }

    (total + FUNCTIONS_OVERHEAD as i64).max(0) as usize
}
