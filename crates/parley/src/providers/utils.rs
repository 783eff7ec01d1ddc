use regex::Regex;
use serde_json::{json, Value};

use crate::errors::CompletionError;
use crate::models::message::{Message, MessageContent};
use crate::models::tool::{ToolCatalog, ToolInvocationRequest};
use crate::providers::base::CompletionOutcome;

/// Convert the internal transcript to OpenAI's chat message specification.
pub fn transcript_to_openai_spec(transcript: &[Message]) -> Vec<Value> {
    let mut spec = Vec::with_capacity(transcript.len());

    for message in transcript {
        match &message.content {
            MessageContent::Text { text } => {
                spec.push(json!({
                    "role": message.role,
                    "content": text,
                }));
            }
            MessageContent::ToolRequest(request) => {
                spec.push(json!({
                    "role": "assistant",
                    "content": Value::Null,
                    "tool_calls": [{
                        "id": request.id,
                        "type": "function",
                        "function": {
                            "name": sanitize_function_name(&request.name),
                            "arguments": request.arguments.to_string(),
                        }
                    }]
                }));
            }
            MessageContent::ToolResult(result) => {
                spec.push(json!({
                    "role": "tool",
                    "tool_call_id": result.id,
                    "content": result.as_model_text(),
                }));
            }
        }
    }

    spec
}

/// Convert the catalog to OpenAI's function-calling tool specification.
pub fn tools_to_openai_spec(catalog: &ToolCatalog) -> Vec<Value> {
    catalog
        .tools()
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                }
            })
        })
        .collect()
}

/// Parse a chat completion response body into a [`CompletionOutcome`].
///
/// Anything that fits neither outcome shape — no choices, tool calls with
/// unparseable arguments or invalid names, a message with neither text nor
/// tool calls — is a malformed completion.
pub fn response_to_completion(response: &Value) -> Result<CompletionOutcome, CompletionError> {
    let message = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| CompletionError::Malformed("response carried no choices".into()))?;

    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        if !tool_calls.is_empty() {
            let mut requests = Vec::with_capacity(tool_calls.len());
            for tool_call in tool_calls {
                requests.push(parse_tool_call(tool_call)?);
            }
            return Ok(CompletionOutcome::ToolRequested(requests));
        }
    }

    match message.get("content").and_then(Value::as_str) {
        Some(text) => Ok(CompletionOutcome::FinalAnswer(text.to_string())),
        None => Err(CompletionError::Malformed(
            "completion carried neither text nor tool calls".into(),
        )),
    }
}

fn parse_tool_call(tool_call: &Value) -> Result<ToolInvocationRequest, CompletionError> {
    let id = tool_call
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let name = tool_call["function"]["name"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let raw_arguments = tool_call["function"]["arguments"]
        .as_str()
        .unwrap_or_default();

    if !is_valid_function_name(&name) {
        return Err(CompletionError::Malformed(format!(
            "tool call {id} named '{name}', which does not match [a-zA-Z0-9_-]+"
        )));
    }

    let arguments = serde_json::from_str::<Value>(raw_arguments).map_err(|err| {
        CompletionError::Malformed(format!(
            "could not interpret arguments for tool call {id}: {err}"
        ))
    })?;

    Ok(ToolInvocationRequest::new(id, name, arguments))
}

pub fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    re.replace_all(name, "_").to_string()
}

fn is_valid_function_name(name: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
    re.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::{ToolDescriptor, ToolResult};
    use serde_json::json;

    const TOOL_CALL_RESPONSE: &str = r#"{
        "choices": [{
            "message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "echo",
                        "arguments": "{\"text\": \"hi\"}"
                    }
                }]
            },
            "finish_reason": "tool_calls"
        }]
    }"#;

    #[test]
    fn test_transcript_to_openai_spec_roles() {
        let transcript = vec![
            Message::user("How are you?"),
            Message::assistant("Fine!"),
        ];
        let spec = transcript_to_openai_spec(&transcript);

        assert_eq!(spec.len(), 2);
        assert_eq!(spec[0]["role"], "user");
        assert_eq!(spec[0]["content"], "How are you?");
        assert_eq!(spec[1]["role"], "assistant");
        assert_eq!(spec[1]["content"], "Fine!");
    }

    #[test]
    fn test_transcript_round_trips_tool_exchange() {
        let request = ToolInvocationRequest::new("call_1", "echo", json!({"text": "hi"}));
        let transcript = vec![
            Message::user("echo hi"),
            Message::tool_request(request),
            Message::tool_result(ToolResult::success("call_1", json!("hi"))),
        ];
        let spec = transcript_to_openai_spec(&transcript);

        assert_eq!(spec.len(), 3);
        assert_eq!(spec[1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(spec[1]["tool_calls"][0]["function"]["name"], "echo");
        assert_eq!(spec[2]["role"], "tool");
        assert_eq!(spec[2]["tool_call_id"], "call_1");
        assert_eq!(spec[2]["content"], "hi");
    }

    #[test]
    fn test_tools_to_openai_spec() {
        let catalog = ToolCatalog::new(vec![ToolDescriptor::new(
            "echo",
            "Echoes back the input",
            json!({"type": "object", "properties": {"text": {"type": "string"}}}),
        )]);
        let spec = tools_to_openai_spec(&catalog);

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "echo");
        assert_eq!(spec[0]["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn test_response_with_text_is_final_answer() -> anyhow::Result<()> {
        let response = json!({
            "choices": [{"message": {"content": "Hello!"}, "finish_reason": "stop"}]
        });
        let outcome = response_to_completion(&response)?;
        assert_eq!(outcome, CompletionOutcome::FinalAnswer("Hello!".into()));
        Ok(())
    }

    #[test]
    fn test_response_with_tool_calls() -> anyhow::Result<()> {
        let response: Value = serde_json::from_str(TOOL_CALL_RESPONSE)?;
        let outcome = response_to_completion(&response)?;
        match outcome {
            CompletionOutcome::ToolRequested(requests) => {
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].id, "call_1");
                assert_eq!(requests[0].name, "echo");
                assert_eq!(requests[0].arguments, json!({"text": "hi"}));
            }
            other => panic!("expected tool request, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_response_preserves_tool_call_order() -> anyhow::Result<()> {
        let mut response: Value = serde_json::from_str(TOOL_CALL_RESPONSE)?;
        let second = json!({
            "id": "call_2",
            "type": "function",
            "function": {"name": "echo", "arguments": "{\"text\": \"again\"}"}
        });
        response["choices"][0]["message"]["tool_calls"]
            .as_array_mut()
            .unwrap()
            .push(second);

        match response_to_completion(&response)? {
            CompletionOutcome::ToolRequested(requests) => {
                assert_eq!(requests[0].id, "call_1");
                assert_eq!(requests[1].id, "call_2");
            }
            other => panic!("expected tool request, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_response_without_choices_is_malformed() {
        let err = response_to_completion(&json!({"object": "chat.completion"})).unwrap_err();
        assert!(matches!(err, CompletionError::Malformed(_)));
    }

    #[test]
    fn test_response_with_null_content_is_malformed() {
        let response = json!({"choices": [{"message": {"content": null}}]});
        let err = response_to_completion(&response).unwrap_err();
        assert!(err.to_string().contains("neither text nor tool calls"));
    }

    #[test]
    fn test_unparseable_arguments_are_malformed() {
        let mut response: Value = serde_json::from_str(TOOL_CALL_RESPONSE).unwrap();
        response["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"] =
            json!("invalid json {");
        let err = response_to_completion(&response).unwrap_err();
        assert!(err.to_string().contains("could not interpret arguments"));
    }

    #[test]
    fn test_invalid_function_name_is_malformed() {
        let mut response: Value = serde_json::from_str(TOOL_CALL_RESPONSE).unwrap();
        response["choices"][0]["message"]["tool_calls"][0]["function"]["name"] =
            json!("invalid fn");
        let err = response_to_completion(&response).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_sanitize_function_name() {
        assert_eq!(sanitize_function_name("hello-world"), "hello-world");
        assert_eq!(sanitize_function_name("hello world"), "hello_world");
        assert_eq!(sanitize_function_name("hello@world"), "hello_world");
    }

    #[test]
    fn test_is_valid_function_name() {
        assert!(is_valid_function_name("hello_world"));
        assert!(!is_valid_function_name("hello world"));
        assert!(!is_valid_function_name(""));
    }
}
