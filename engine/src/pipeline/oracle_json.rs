//! Decoding of untrusted oracle replies
//!
//! The oracle is asked for JSON but may wrap it in prose or code fences,
//! truncate it, or ignore the schema. Every stage goes through [`ask`],
//! which separates "could not reach the oracle" from "the oracle answered
//! with something unusable" so stages can log the difference while
//! applying the same fallback.

use serde::de::DeserializeOwned;

use crate::llm::LLMProvider;

/// Why an oracle call produced nothing usable
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("malformed oracle reply: {0}")]
    Malformed(String),
}

/// Locate the JSON object embedded in `text`.
///
/// Takes the span from the first `{` to the last `}`. If that span is not
/// valid JSON (prose with stray braces after the object, or two objects),
/// falls back to the first balanced object starting at the first `{`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    let span = &text[start..=end];
    if serde_json::from_str::<serde_json::Value>(span).is_ok() {
        return Some(span);
    }

    extract_balanced_json(&text[start..])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode a raw oracle reply into `T`
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, OracleError> {
    let json = extract_json_object(text)
        .ok_or_else(|| OracleError::Malformed("no JSON object in reply".to_string()))?;

    serde_json::from_str(json).map_err(|e| OracleError::Malformed(e.to_string()))
}

/// Send one prompt to the oracle and decode the reply into `T`
pub async fn ask<T: DeserializeOwned>(
    provider: &dyn LLMProvider,
    prompt: &str,
    max_tokens: u32,
) -> Result<T, OracleError> {
    let reply = provider
        .generate(prompt, max_tokens)
        .await
        .map_err(|e| OracleError::Unavailable(e.to_string()))?;

    decode(&reply)
}
