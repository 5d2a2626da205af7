//! Goal merging
//!
//! Reconciles the live goal list with freshly inferred goals. The oracle
//! returns a list of Replace/Combine/Keep operations, each citing 1-based
//! goal numbers. Those references are untrusted: they may be non-numeric,
//! out of range, or use the wrong numbering scheme for the operation.
//!
//! Numbering follows the prompt:
//! - `keep` cites one number into the combined list `old ++ new`;
//! - `combine` and `replace` cite an old number, then a new number.
//!
//! A combine/replace that cites only one number is read like a keep.
//!
//! Each operation yields one goal whose `type` and `source_message_id` come
//! from a provenance goal. Provenance is resolved from the cited numbers
//! when they point somewhere valid and otherwise falls back to the first
//! old goal (or the first new goal if there are no old goals).
//!
//! If no operation is usable, or the oracle call fails, the result is the
//! plain concatenation `old ++ new`.

use serde::Deserialize;
use sdk::Goal;

use super::oracle_json::{self, OracleError};
use crate::llm::LLMProvider;

/// Edit kind named by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Keep,
    Combine,
    Replace,
}

impl OperationKind {
    /// Parse an oracle label; anything unrecognised is treated as a keep
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "combine" => Self::Combine,
            "replace" => Self::Replace,
            _ => Self::Keep,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Combine => "combine",
            Self::Replace => "replace",
        }
    }
}

/// Goal references of one operation, as 0-based indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOperation {
    /// Index into `old ++ new`
    Keep { index: usize },
    /// Index into `old`, then index into `new`
    Combine { old: usize, new: usize },
    /// Index into `old`, then index into `new`
    Replace { old: usize, new: usize },
}

impl MergeOperation {
    /// Decode the cited goal numbers for an operation of the given kind.
    ///
    /// Returns `None` when the first number (or, for a two-number
    /// combine/replace, either number) is missing, non-numeric or below 1.
    pub fn from_goal_numbers(kind: OperationKind, numbers: &[serde_json::Value]) -> Option<Self> {
        let first = parse_goal_number(numbers.first()?)?;

        match (kind, numbers.get(1)) {
            (OperationKind::Combine, Some(second)) => Some(Self::Combine {
                old: first,
                new: parse_goal_number(second)?,
            }),
            (OperationKind::Replace, Some(second)) => Some(Self::Replace {
                old: first,
                new: parse_goal_number(second)?,
            }),
            _ => Some(Self::Keep { index: first }),
        }
    }

    /// The goal that supplies type and attribution, if the references are valid
    pub fn provenance<'a>(&self, old: &'a [Goal], new: &'a [Goal]) -> Option<&'a Goal> {
        match *self {
            Self::Keep { index } => old.get(index).or_else(|| {
                index
                    .checked_sub(old.len())
                    .and_then(|offset| new.get(offset))
            }),
            Self::Combine { old: o, new: n } | Self::Replace { old: o, new: n } => {
                new.get(n).or_else(|| old.get(o))
            }
        }
    }
}

/// A 1-based goal number, as a JSON number or numeric string, to a 0-based index
fn parse_goal_number(value: &serde_json::Value) -> Option<usize> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_u64()?,
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    usize::try_from(number).ok()?.checked_sub(1)
}

#[derive(Debug, Deserialize)]
struct MergeReply {
    operations: Vec<serde_json::Value>,
}

/// Intermediate deserialization type for one oracle operation.
///
/// Only `updated_goal` has to be well-typed. A non-string `operation` reads
/// as keep, and `goal_numbers` may be null, a single value or a list.
#[derive(Debug, Deserialize)]
struct RawOperation {
    updated_goal: String,
    #[serde(default)]
    operation: Option<serde_json::Value>,
    #[serde(default)]
    goal_numbers: serde_json::Value,
}

impl RawOperation {
    /// Trimmed, lowercased operation label, `keep` when absent
    fn label(&self) -> String {
        self.operation
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .map(|label| label.trim().to_ascii_lowercase())
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| OperationKind::Keep.as_str().to_string())
    }

    fn goal_numbers(&self) -> Vec<serde_json::Value> {
        match &self.goal_numbers {
            serde_json::Value::Null => Vec::new(),
            serde_json::Value::Array(items) => items.clone(),
            single => vec![single.clone()],
        }
    }
}

fn numbered_list(goals: &[Goal]) -> String {
    goals
        .iter()
        .enumerate()
        .map(|(i, goal)| format!("{}. {}", i + 1, goal.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn merge_prompt(old: &[Goal], new: &[Goal]) -> String {
    format!(
        r#"You have one set of old numbered bullet point goals:
{old_list}

You have another set of new numbered bullet point goals:
{new_list}

Merge the two lists of bullet point goals into a single updated list of goals. Use the following three operations as rules to perform the merge:

* Replace: If a new goal contradicts an old goal (either directly or semantically), replace the old goal with the new goal. Consider semantic contradictions like "short simple story" vs "complex detailed elements". List the number of the old goal, then the number of the new goal.
* Combine: If a new goal is similar to an old goal and they can work together without contradiction, combine the old goal and the new goal into a new combined goal. List the number of the old goal, then the number of the new goal.
* Keep: If a goal is unique and does not conflict with the overall intent of new goals, keep that goal in the updated list. List the original number of the goal.

CRITICAL REQUIREMENTS:
1. EVERY goal from both lists must be handled by exactly one operation
2. Unique goals that don't contradict the new goals MUST be preserved via Keep or Combine operations
3. Consider the overall intent and semantic compatibility
4. If old goals conflict with the spirit/intent of new goals, favor the newer goals through Replace operations

EXAMPLE: If old goals contain "Include humor" and new goals don't mention humor, the humor goal should be kept or combined with a compatible new goal, not ignored.

Please respond ONLY with a valid JSON in the following format:

{{
  "operations": [
    {{
      "updated_goal": "<GOAL_1>",
      "operation": "<OPERATION_1>",
      "goal_numbers": ["<GOAL_NUMBER_1>", "<GOAL_NUMBER_2>"]
    }},
    {{
      "updated_goal": "<GOAL_2>",
      "operation": "<OPERATION_2>",
      "goal_numbers": ["<GOAL_NUMBER_1>", "<GOAL_NUMBER_2>"]
    }}
  ]
}}"#,
        old_list = numbered_list(old),
        new_list = numbered_list(new),
    )
}

/// Turn decoded oracle operations into the merged goal list.
///
/// Entries that are not objects with a string `updated_goal` are skipped.
/// Returns an empty list when nothing was usable.
pub fn resolve_operations(
    operations: Vec<serde_json::Value>,
    old: &[Goal],
    new: &[Goal],
) -> Vec<Goal> {
    let fallback = old.first().or_else(|| new.first());
    let mut merged: Vec<Goal> = Vec::with_capacity(operations.len());

    for value in operations {
        let raw: RawOperation = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Skipping unusable merge operation: {}", e);
                continue;
            }
        };

        let label = raw.label();
        let goal_numbers = raw.goal_numbers();
        let operation =
            MergeOperation::from_goal_numbers(OperationKind::parse(&label), &goal_numbers);
        let source = operation
            .and_then(|op| op.provenance(old, new))
            .or(fallback);

        let Some(source) = source else {
            continue;
        };

        if operation.is_none() {
            tracing::debug!(
                goal_numbers = ?goal_numbers,
                "Merge operation cites no valid goal numbers, using fallback provenance"
            );
        }

        merged.push(Goal::new(
            format!("G{}_{}", merged.len(), label),
            raw.updated_goal,
            source.goal_type.clone(),
            source.source_message_id.clone(),
        ));
    }

    merged
}

fn concatenate(old: &[Goal], new: &[Goal]) -> Vec<Goal> {
    old.iter().chain(new.iter()).cloned().collect()
}

/// Reconcile `old` with `new`. Never fails and never mutates its inputs.
pub async fn merge_goals(
    provider: &dyn LLMProvider,
    old: &[Goal],
    new: &[Goal],
    max_tokens: u32,
) -> Vec<Goal> {
    if new.is_empty() {
        return old.to_vec();
    }
    if old.is_empty() {
        return new.to_vec();
    }

    let prompt = merge_prompt(old, new);

    let reply: MergeReply = match oracle_json::ask(provider, &prompt, max_tokens).await {
        Ok(reply) => reply,
        Err(OracleError::Unavailable(e)) => {
            tracing::warn!("Goal merge skipped, oracle unavailable: {}", e);
            return concatenate(old, new);
        }
        Err(OracleError::Malformed(e)) => {
            tracing::warn!("Goal merge reply unusable, concatenating: {}", e);
            return concatenate(old, new);
        }
    };

    let merged = resolve_operations(reply.operations, old, new);
    if merged.is_empty() {
        tracing::warn!("Goal merge produced no usable operations, concatenating");
        return concatenate(old, new);
    }

    tracing::debug!(
        old = old.len(),
        new = new.len(),
        merged = merged.len(),
        "Goals merged"
    );
    merged
}
