use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CompletionError;
use crate::models::message::Message;
use crate::models::tool::{ToolCatalog, ToolInvocationRequest};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// What the model decided to do with its turn.
///
/// A closed union matched exhaustively by the loop: new outcome kinds are a
/// compile-time-visible decision, not a silently ignored branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompletionOutcome {
    /// Plain assistant text, terminal for the turn.
    FinalAnswer(String),
    /// One or more structured tool calls, in emission order. The vec is never
    /// empty; how many calls are honored is the conversation's
    /// [`MultiToolPolicy`](crate::conversation::MultiToolPolicy).
    ToolRequested(Vec<ToolInvocationRequest>),
}

/// A client of a language-model completion service.
///
/// One call produces one [`CompletionOutcome`] over the full transcript and
/// the current tool catalog. The transcript must be non-empty; the catalog may
/// be empty, in which case the model cannot request tools. No retries happen
/// here — retry policy belongs to the caller.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        transcript: &[Message],
        catalog: &ToolCatalog,
    ) -> Result<(CompletionOutcome, Usage), CompletionError>;
}
