//! Goal tracking data model
//!
//! Goals, chat messages and evaluation records as they are stored in a
//! conversation and exchanged with clients. Field names follow the JSON
//! shape clients consume (`type`, `source_message_id`, `created_at`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;

/// Kind of conversational goal
///
/// Labels come from the oracle and are kept verbatim: the four known
/// labels are recognised case-insensitively, anything else is carried as
/// `Other` so no goal is dropped over an unexpected label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GoalType {
    Question,
    Request,
    Offer,
    Suggestion,
    Other(String),
}

impl GoalType {
    pub fn as_str(&self) -> &str {
        match self {
            GoalType::Question => "question",
            GoalType::Request => "request",
            GoalType::Offer => "offer",
            GoalType::Suggestion => "suggestion",
            GoalType::Other(label) => label,
        }
    }
}

impl From<String> for GoalType {
    fn from(label: String) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "question" => GoalType::Question,
            "request" => GoalType::Request,
            "offer" => GoalType::Offer,
            "suggestion" => GoalType::Suggestion,
            _ => GoalType::Other(label),
        }
    }
}

impl From<&str> for GoalType {
    fn from(label: &str) -> Self {
        GoalType::from(label.to_string())
    }
}

impl From<GoalType> for String {
    fn from(goal_type: GoalType) -> Self {
        match goal_type {
            GoalType::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded on a goal after an assistant reply was judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Confirmed,
    Contradicted,
    Ignored,
}

/// How one assistant reply addresses one goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationCategory {
    Confirm,
    Contradict,
    Ignore,
}

impl EvaluationCategory {
    /// Parse an oracle label, ignoring case and surrounding whitespace.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "confirm" => Some(Self::Confirm),
            "contradict" => Some(Self::Contradict),
            "ignore" => Some(Self::Ignore),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Contradict => "contradict",
            Self::Ignore => "ignore",
        }
    }
}

impl From<EvaluationCategory> for GoalStatus {
    fn from(category: EvaluationCategory) -> Self {
        match category {
            EvaluationCategory::Confirm => GoalStatus::Confirmed,
            EvaluationCategory::Contradict => GoalStatus::Contradicted,
            EvaluationCategory::Ignore => GoalStatus::Ignored,
        }
    }
}

/// A tracked question, request, offer or suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Unique within the conversation's current goal list
    pub id: String,

    /// Verbatim clause, or merged text produced by the oracle
    pub text: String,

    #[serde(rename = "type")]
    pub goal_type: GoalType,

    /// Set only by goal evaluation (or a manual edit)
    #[serde(default)]
    pub status: Option<GoalStatus>,

    #[serde(default)]
    pub locked: bool,

    #[serde(default)]
    pub completed: bool,

    /// Id of the user message the goal was inferred from
    pub source_message_id: String,

    pub created_at: DateTime<Utc>,
}

impl Goal {
    /// Create a fresh, unevaluated goal stamped with the current time
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        goal_type: impl Into<GoalType>,
        source_message_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            goal_type: goal_type.into(),
            status: None,
            locked: false,
            completed: false,
            source_message_id: source_message_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Partial update applied by a manual goal edit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoalPatch {
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub goal_type: Option<GoalType>,
    pub locked: Option<bool>,
    pub completed: Option<bool>,
    pub status: Option<GoalStatus>,
}

impl GoalPatch {
    pub fn apply(self, goal: &mut Goal) {
        if let Some(text) = self.text {
            goal.text = text;
        }
        if let Some(goal_type) = self.goal_type {
            goal.goal_type = goal_type;
        }
        if let Some(locked) = self.locked {
            goal.locked = locked;
        }
        if let Some(completed) = self.completed {
            goal.completed = completed;
        }
        if let Some(status) = self.status {
            goal.status = Some(status);
        }
    }
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry of the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,

    /// Goals inferred from this message when it arrived. Never updated
    /// afterwards; the live goal set lives on the conversation.
    #[serde(default)]
    pub goals: Vec<Goal>,
}

impl Message {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            role: Role::User,
            timestamp: Utc::now(),
            goals: Vec::new(),
        }
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            role: Role::Assistant,
            timestamp: Utc::now(),
            goals: Vec::new(),
        }
    }
}

/// Toggleable stage of the goal pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Infer,
    Merge,
    Evaluate,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 3] = [Self::Infer, Self::Merge, Self::Evaluate];
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Infer => write!(f, "infer"),
            PipelineStage::Merge => write!(f, "merge"),
            PipelineStage::Evaluate => write!(f, "evaluate"),
        }
    }
}

impl FromStr for PipelineStage {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "infer" => Ok(Self::Infer),
            "merge" => Ok(Self::Merge),
            "evaluate" => Ok(Self::Evaluate),
            other => Err(EngineError::UnknownStage(other.to_string())),
        }
    }
}

/// Per-conversation stage toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_true")]
    pub infer: bool,
    #[serde(default = "default_true")]
    pub merge: bool,
    #[serde(default = "default_true")]
    pub evaluate: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            infer: true,
            merge: true,
            evaluate: true,
        }
    }
}

impl PipelineSettings {
    pub fn is_enabled(&self, stage: PipelineStage) -> bool {
        match stage {
            PipelineStage::Infer => self.infer,
            PipelineStage::Merge => self.merge,
            PipelineStage::Evaluate => self.evaluate,
        }
    }

    pub fn set(&mut self, stage: PipelineStage, enabled: bool) {
        match stage {
            PipelineStage::Infer => self.infer = enabled,
            PipelineStage::Merge => self.merge = enabled,
            PipelineStage::Evaluate => self.evaluate = enabled,
        }
    }
}

/// Result of judging one goal against one assistant reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub goal_id: String,
    pub category: EvaluationCategory,
    pub explanation: String,
    pub examples: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
