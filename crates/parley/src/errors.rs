use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::peer::PeerError;

/// Failures of a single tool invocation.
///
/// These are recoverable at the loop level: each one is wrapped into a failed
/// tool result and appended to the transcript so the model can retry,
/// apologize, or pick another tool. They derive serde so they can ride inside
/// transcript messages.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {violations:?}")]
    InvalidArguments {
        tool: String,
        /// One entry per violating field.
        violations: Vec<String>,
    },

    #[error("Tool {tool} timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
}

/// Failures of the model completion service, before the loop decides how to
/// react to them.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// Network, auth, or rate-limit trouble reaching the service.
    #[error("model service unavailable: {0}")]
    Unavailable(String),

    /// The response body does not parse into either completion outcome shape.
    #[error("malformed completion: {0}")]
    Malformed(String),
}

/// Turn-fatal failures surfaced to the caller of the conversation loop.
///
/// When one of these is returned the transcript is left without any record of
/// the failed attempt, so the user can retry the same query.
#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("tool catalog unavailable: {0}")]
    CatalogUnavailable(#[from] PeerError),

    #[error("model service unavailable: {0}")]
    ModelUnavailable(String),

    #[error("malformed completion: {0}")]
    MalformedCompletion(String),

    #[error("turn limit exceeded: {0} tool calls without a final answer")]
    TurnLimitExceeded(usize),
}

impl From<CompletionError> for ConversationError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Unavailable(msg) => ConversationError::ModelUnavailable(msg),
            CompletionError::Malformed(msg) => ConversationError::MalformedCompletion(msg),
        }
    }
}
