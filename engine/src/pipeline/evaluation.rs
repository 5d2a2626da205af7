//! Goal evaluation
//!
//! Judges how one assistant reply addresses one goal and records the
//! outcome on the goal itself.

use chrono::Utc;
use serde::Deserialize;
use sdk::{EvaluationCategory, EvaluationRecord, Goal, GoalStatus};

use super::oracle_json::{self, OracleError};
use crate::llm::LLMProvider;

/// Explanation recorded when the oracle gave no usable judgement
pub const SERVICE_ERROR_EXPLANATION: &str = "Unable to evaluate goal due to service error";

/// Only `category` is required; the other fields are taken as best they can be
#[derive(Debug, Deserialize)]
struct EvaluationReply {
    category: String,
    #[serde(default)]
    explanation: serde_json::Value,
    #[serde(default)]
    examples: serde_json::Value,
}

impl EvaluationReply {
    fn explanation(&self) -> String {
        self.explanation.as_str().unwrap_or_default().to_string()
    }

    /// String items of a list, or a lone string wrapped in one
    fn examples(&self) -> Vec<String> {
        match &self.examples {
            serde_json::Value::String(example) => vec![example.clone()],
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

pub(crate) fn evaluation_prompt(goal_text: &str, assistant_response: &str) -> String {
    format!(
        r#"You will be presented with human dialogue and a response from you, an assistant. Your task is to evaluate the assistant response in terms of the following conversational goal: {goal_text}

Categorize how the assistant response addresses the goal in one of three categories. The categories are confirm, contradict, or ignore. Explain the relationship between the response and the goal in ONE sentence. Extract clauses verbatim from the response exactly as they appear as examples that show evidence to support your explanation.

Please respond ONLY with a valid JSON in the following format:

{{
  "category": "<CATEGORY_1>",
  "explanation": "<EXPLANATION_1>",
  "examples": ["<EXAMPLE_1>", "<EXAMPLE_2>"]
}}

Assistant response: {assistant_response}"#
    )
}

async fn judge(
    provider: &dyn LLMProvider,
    goal: &Goal,
    assistant_response: &str,
    max_tokens: u32,
) -> Result<(EvaluationCategory, String, Vec<String>), OracleError> {
    let prompt = evaluation_prompt(&goal.text, assistant_response);
    let reply: EvaluationReply = oracle_json::ask(provider, &prompt, max_tokens).await?;

    let category = EvaluationCategory::parse(&reply.category).ok_or_else(|| {
        OracleError::Malformed(format!("unknown category '{}'", reply.category))
    })?;

    Ok((category, reply.explanation(), reply.examples()))
}

/// Evaluate `goal` against an assistant reply and set `goal.status`.
///
/// Never fails: when the oracle gives no usable judgement the goal is
/// recorded as ignored with no examples.
pub async fn evaluate_goal(
    provider: &dyn LLMProvider,
    goal: &mut Goal,
    assistant_response: &str,
    max_tokens: u32,
) -> EvaluationRecord {
    let (category, explanation, examples) =
        match judge(provider, goal, assistant_response, max_tokens).await {
            Ok(judgement) => judgement,
            Err(e) => {
                tracing::warn!(goal_id = %goal.id, "Goal evaluation failed: {}", e);
                (
                    EvaluationCategory::Ignore,
                    SERVICE_ERROR_EXPLANATION.to_string(),
                    Vec::new(),
                )
            }
        };

    goal.status = Some(GoalStatus::from(category));

    EvaluationRecord {
        goal_id: goal.id.clone(),
        category,
        explanation,
        examples,
        timestamp: Utc::now(),
    }
}
