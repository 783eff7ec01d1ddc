use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::tool::{ToolInvocationRequest, ToolResult};

/// The speaker of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Content carried by a single transcript message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageContent {
    Text { text: String },
    /// The assistant's record of a tool call it asked for.
    ToolRequest(ToolInvocationRequest),
    /// A tool's answer, keyed to the request by correlation id.
    ToolResult(ToolResult),
}

/// A message to or from the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub created: i64,
    pub content: MessageContent,
}

impl Message {
    fn new(role: Role, content: MessageContent) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content,
        }
    }

    /// Create a user message with the current timestamp
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(Role::User, MessageContent::Text { text: text.into() })
    }

    /// Create an assistant text message with the current timestamp
    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self::new(Role::Assistant, MessageContent::Text { text: text.into() })
    }

    /// Create the assistant-role record of a requested tool call
    pub fn tool_request(request: ToolInvocationRequest) -> Self {
        Self::new(Role::Assistant, MessageContent::ToolRequest(request))
    }

    /// Create the tool-role message carrying an invocation's result
    pub fn tool_result(result: ToolResult) -> Self {
        Self::new(Role::Tool, MessageContent::ToolResult(result))
    }

    /// Get the text if this message carries plain text
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }

    /// The correlation id, if this message records a tool request or result
    pub fn correlation_id(&self) -> Option<&str> {
        match &self.content {
            MessageContent::ToolRequest(request) => Some(&request.id),
            MessageContent::ToolResult(result) => Some(&result.id),
            MessageContent::Text { .. } => None,
        }
    }
}
