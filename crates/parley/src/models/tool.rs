use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::ToolError;

/// A tool advertised by the execution peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    /// The name of the tool, unique within a catalog
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// JSON schema for the arguments the tool accepts
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolDescriptor {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A snapshot of the tools the peer advertises.
///
/// Fetched fresh at the top of every model call; never cached across calls,
/// since the peer may be reconfigured between turns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    /// Build a catalog, keeping the first descriptor for any duplicated name.
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut unique = Vec::with_capacity(tools.len());
        for tool in tools {
            if seen.insert(tool.name.clone()) {
                unique.push(tool);
            } else {
                warn!(tool = %tool.name, "peer advertised duplicate tool name, keeping first");
            }
        }
        ToolCatalog { tools: unique }
    }

    pub fn empty() -> Self {
        ToolCatalog::default()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

/// A single structured tool call produced by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocationRequest {
    /// Opaque correlation id supplied by the model service
    pub id: String,
    /// The name of the tool to execute
    pub name: String,
    /// The arguments for the execution
    pub arguments: Value,
}

impl ToolInvocationRequest {
    pub fn new<I, N>(id: I, name: N, arguments: Value) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        ToolInvocationRequest {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The outcome of one tool invocation, failures included.
///
/// Appended to the transcript as a tool-role message and never mutated
/// afterward. A failed outcome is still data the model is allowed to see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    /// Correlation id of the request this result answers
    pub id: String,
    pub outcome: Result<Value, ToolError>,
}

impl ToolResult {
    pub fn success<I: Into<String>>(id: I, payload: Value) -> Self {
        ToolResult {
            id: id.into(),
            outcome: Ok(payload),
        }
    }

    pub fn failure<I: Into<String>>(id: I, error: ToolError) -> Self {
        ToolResult {
            id: id.into(),
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Stringify the outcome for model consumption.
    ///
    /// A string payload is passed through unquoted; anything else is rendered
    /// as JSON. Errors are phrased so the model can interpret and react.
    pub fn as_model_text(&self) -> String {
        match &self.outcome {
            Ok(Value::String(text)) => text.clone(),
            Ok(other) => other.to_string(),
            Err(error) => format!("The tool call returned the following error:\n{error}"),
        }
    }
}
