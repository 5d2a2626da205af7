//! Transport envelopes
//!
//! JSON objects exchanged with a connected client, tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::conversation::Conversation;
use crate::types::{EvaluationRecord, Goal, PipelineStage};

/// Message received from a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A new user turn
    UserMessage { message: String },
    /// Enable or disable one pipeline stage for later turns
    TogglePipeline { stage: PipelineStage, enabled: bool },
    /// Request a full conversation snapshot
    GetConversation,
}

/// Message sent to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    GoalsInferred {
        goals: Vec<Goal>,
        message_id: String,
    },
    GoalsUpdated {
        goals: Vec<Goal>,
        message_id: String,
    },
    LlmResponseChunk {
        text: String,
        message_id: String,
    },
    LlmResponseComplete {
        message_id: String,
        full_text: String,
    },
    GoalsEvaluated {
        evaluations: Vec<EvaluationRecord>,
        message_id: String,
    },
    PipelineToggled {
        stage: PipelineStage,
        enabled: bool,
    },
    ConversationState {
        conversation: Conversation,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}
