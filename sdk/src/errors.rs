//! Error types and handling
//!
//! This module provides the error types used throughout the OnGoal engine.
//! All errors implement the `OnGoalErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! Goal pipeline stages never surface these errors to a conversation turn;
//! they degrade to their safe defaults instead. `EngineError` covers the
//! surfaces around the pipeline: configuration, the server, the CLI and
//! manual goal edits.
//!
//! # Security
//!
//! Error messages never include API keys. Provider errors carry the
//! provider's own message, which is safe to log but not shown to chat users.

use thiserror::Error;

/// Trait for OnGoal error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait OnGoalErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// secrets or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require a configuration change or restart.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **LLM Provider**: API failures, missing credentials
/// - **Conversation state**: Unknown conversations, goals or pipeline stages
/// - **Transport**: Socket and HTTP failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, OnGoalErrorExt};
///
/// let error = EngineError::GoalNotFound("G3".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::Config("bad log level".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("LLM service unavailable: {0}")]
    ServiceUnavailable(String),

    // Conversation state errors
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Goal not found: {0}")]
    GoalNotFound(String),

    #[error("Unknown pipeline stage: {0}")]
    UnknownStage(String),

    // Transport errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OnGoalErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::LLMProvider(_) => "LLM provider request failed. Check your network and try again",
            Self::ServiceUnavailable(_) => {
                "LLM service unavailable. Set your API key environment variable"
            }

            Self::ConversationNotFound(_) => "Conversation not found",
            Self::GoalNotFound(_) => "Goal not found in this conversation",
            Self::UnknownStage(_) => "Pipeline stage must be one of: infer, merge, evaluate",

            Self::Network(_) => "Network operation failed. Check your connection",
            Self::InvalidMessage(_) => "Message could not be understood",

            Self::Serialization(_) => "Data could not be encoded or decoded",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_) | Self::ServiceUnavailable(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
