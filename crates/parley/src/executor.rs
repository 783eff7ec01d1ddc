use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::ToolError;
use crate::models::tool::{ToolCatalog, ToolInvocationRequest, ToolResult};
use crate::peer::ToolPeer;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Invokes one named tool against the peer, surfacing every failure mode as a
/// failed [`ToolResult`] rather than an error.
///
/// Requests that fail validation (unknown name, arguments violating the
/// descriptor's schema) are never forwarded to the peer. Dispatched calls
/// block until the peer answers or the timeout elapses.
pub struct ToolExecutor {
    peer: Arc<dyn ToolPeer>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(peer: Arc<dyn ToolPeer>, timeout: Duration) -> Self {
        ToolExecutor { peer, timeout }
    }

    pub async fn invoke(
        &self,
        catalog: &ToolCatalog,
        request: &ToolInvocationRequest,
    ) -> ToolResult {
        let Some(descriptor) = catalog.get(&request.name) else {
            warn!(tool = %request.name, "model requested a tool missing from the catalog");
            return ToolResult::failure(
                request.id.clone(),
                ToolError::UnknownTool(request.name.clone()),
            );
        };

        if let Err(violations) = validate_arguments(&descriptor.input_schema, &request.arguments) {
            warn!(tool = %request.name, ?violations, "rejecting tool call with invalid arguments");
            return ToolResult::failure(
                request.id.clone(),
                ToolError::InvalidArguments {
                    tool: request.name.clone(),
                    violations,
                },
            );
        }

        debug!(tool = %request.name, id = %request.id, "dispatching tool call to peer");
        let call = self.peer.call_tool(&request.name, request.arguments.clone());
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(payload)) => ToolResult::success(request.id.clone(), payload),
            Ok(Err(err)) => ToolResult::failure(
                request.id.clone(),
                ToolError::ExecutionFailed(err.to_string()),
            ),
            Err(_) => ToolResult::failure(
                request.id.clone(),
                ToolError::Timeout {
                    tool: request.name.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                },
            ),
        }
    }
}

/// Check arguments against an object schema, returning one entry per
/// violating field.
///
/// This covers the subset of JSON schema the peers actually advertise:
/// `required` membership and primitive `type` tags under `properties`.
fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), Vec<String>> {
    let empty = Value::Object(Default::default());
    let arguments = if arguments.is_null() { &empty } else { arguments };
    let Some(arguments) = arguments.as_object() else {
        return Err(vec!["arguments must be a JSON object".to_string()]);
    };

    let mut violations = Vec::new();

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !arguments.contains_key(field) {
                violations.push(format!("missing required field `{field}`"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, value) in arguments {
            let Some(expected) = properties
                .get(field)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if !matches_type(value, expected) {
                violations.push(format!("field `{field}` must be of type {expected}"));
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
