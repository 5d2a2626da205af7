//! OnGoal Engine Library
//!
//! Goal inference, merging and evaluation around a streaming chat oracle,
//! served over HTTP and WebSocket. Used by the `ongoal` binary and the
//! integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// LLM provider abstraction layer
pub mod llm;

/// Goal pipeline stages and the per-turn orchestrator
pub mod pipeline;

/// In-memory conversation store
pub mod store;

/// HTTP and WebSocket server
pub mod server;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
