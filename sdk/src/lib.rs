//! OnGoal SDK
//!
//! Shared data model for OnGoal components: goals, messages, conversations,
//! the client/server envelopes and the engine error type.
//! This crate is used by the engine and by anything that talks to it.

/// Conversation state and manual goal editing
pub mod conversation;

/// Error types and handling
pub mod errors;

/// Client/server message envelopes
pub mod events;

/// Goal, message and evaluation types
pub mod types;

// Re-export commonly used types
pub use conversation::Conversation;
pub use errors::{EngineError, OnGoalErrorExt};
pub use events::{ClientEvent, ServerEvent};
pub use types::{
    EvaluationCategory, EvaluationRecord, Goal, GoalPatch, GoalStatus, GoalType, Message,
    PipelineSettings, PipelineStage, Role,
};
