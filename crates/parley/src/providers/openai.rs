use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use super::base::{CompletionOutcome, ModelClient, Usage};
use super::utils::{response_to_completion, tools_to_openai_spec, transcript_to_openai_spec};
use crate::errors::CompletionError;
use crate::models::message::Message;
use crate::models::tool::ToolCatalog;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        OpenAiConfig {
            host: host.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// [`ModelClient`] backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiModelClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiModelClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| CompletionError::Unavailable(err.to_string()))?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = match data.get("usage") {
            Some(usage) => usage,
            None => return Usage::default(),
        };

        let input_tokens = usage
            .get("prompt_tokens")
            .and_then(Value::as_i64)
            .map(|v| v as i32);
        let output_tokens = usage
            .get("completion_tokens")
            .and_then(Value::as_i64)
            .map(|v| v as i32);
        let total_tokens = usage
            .get("total_tokens")
            .and_then(Value::as_i64)
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    async fn post(&self, payload: Value) -> Result<Value, CompletionError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|err| CompletionError::Unavailable(err.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .map_err(|err| CompletionError::Malformed(err.to_string())),
            status => Err(CompletionError::Unavailable(format!(
                "server returned {status}"
            ))),
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiModelClient {
    async fn complete(
        &self,
        system: &str,
        transcript: &[Message],
        catalog: &ToolCatalog,
    ) -> Result<(CompletionOutcome, Usage), CompletionError> {
        let mut messages = vec![json!({
            "role": "system",
            "content": system,
        })];
        messages.extend(transcript_to_openai_spec(transcript));

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
        });
        let body = payload.as_object_mut().expect("payload is an object");
        if !catalog.is_empty() {
            body.insert("tools".to_string(), json!(tools_to_openai_spec(catalog)));
        }
        if let Some(temperature) = self.config.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = self.config.max_tokens {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }

        debug!(model = %self.config.model, messages = transcript.len(), tools = catalog.len(), "requesting completion");
        let response = self.post(payload).await?;

        if let Some(error) = response.get("error") {
            return Err(CompletionError::Unavailable(format!(
                "service error: {error}"
            )));
        }

        let outcome = response_to_completion(&response)?;
        let usage = Self::get_usage(&response);
        Ok((outcome, usage))
    }
}
