//! Goal inference
//!
//! Asks the oracle for every question, request, offer or suggestion in one
//! user message and turns each clause into a fresh [`Goal`].

use serde::Deserialize;
use sdk::Goal;

use super::oracle_json::{self, OracleError};
use crate::llm::LLMProvider;

#[derive(Debug, Deserialize)]
struct InferenceReply {
    clauses: Vec<RawClause>,
}

/// Intermediate deserialization type for one oracle clause
#[derive(Debug, Deserialize)]
struct RawClause {
    clause: String,
    #[serde(rename = "type")]
    kind: String,
}

pub(crate) fn inference_prompt(message: &str) -> String {
    format!(
        r#"You will be presented with human dialogue in a conversation with you, an assistant. Your task is to extract every clause verbatim from the document exactly as it appears.

List all clauses in the dialogue that are either a question, request, offer, or suggestion. Briefly summarize how to address the goal of the clause in ONE sentence.

Please respond ONLY with a valid JSON in the following format:

{{
  "clauses": [
    {{"clause": "<CLAUSE_1>", "type": "<TYPE_1>", "summary": "<SUMMARY_1>"}},
    {{"clause": "<CLAUSE_2>", "type": "<TYPE_2>", "summary": "<SUMMARY_2>"}}
  ]
}}

Human dialogue: {message}"#
    )
}

/// Extract goals from one user message.
///
/// Ids are `G{existing_goal_count + i}` in clause order. Never fails: an
/// unreachable oracle or an unusable reply yields an empty list.
pub async fn infer_goals(
    provider: &dyn LLMProvider,
    message: &str,
    message_id: &str,
    existing_goal_count: usize,
    max_tokens: u32,
) -> Vec<Goal> {
    let prompt = inference_prompt(message);

    let reply: InferenceReply = match oracle_json::ask(provider, &prompt, max_tokens).await {
        Ok(reply) => reply,
        Err(OracleError::Unavailable(e)) => {
            tracing::warn!(message_id, "Goal inference skipped, oracle unavailable: {}", e);
            return Vec::new();
        }
        Err(OracleError::Malformed(e)) => {
            tracing::warn!(message_id, "Goal inference reply unusable: {}", e);
            return Vec::new();
        }
    };

    let goals: Vec<Goal> = reply
        .clauses
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            Goal::new(
                format!("G{}", existing_goal_count + i),
                raw.clause,
                raw.kind,
                message_id,
            )
        })
        .collect();

    tracing::debug!(message_id, count = goals.len(), "Goals inferred");
    goals
}
