//! Goal pipeline
//!
//! Three oracle-backed stages and the orchestrator that sequences them per
//! conversation turn:
//!
//! - [`inference`]: user message -> candidate goals
//! - [`merge`]: old goals + new goals -> reconciled goal list
//! - [`evaluation`]: goal + assistant reply -> confirm / contradict / ignore
//!
//! No stage returns an error. Each decodes oracle output through
//! [`oracle_json`] and falls back to a documented safe default when the
//! oracle is unreachable or its reply is unusable.

pub mod evaluation;
pub mod inference;
pub mod merge;
pub mod oracle_json;
pub mod orchestrator;

pub use evaluation::evaluate_goal;
pub use inference::infer_goals;
pub use merge::{merge_goals, MergeOperation, OperationKind};
pub use oracle_json::OracleError;
pub use orchestrator::{Orchestrator, TurnSummary, STREAM_FAILURE_REPLY, UNAVAILABLE_REPLY};
