use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::base::{CompletionOutcome, ModelClient, Usage};
use crate::errors::CompletionError;
use crate::models::message::Message;
use crate::models::tool::ToolCatalog;

/// A mock model client that plays back a scripted sequence of completions.
pub struct MockModelClient {
    script: Mutex<VecDeque<Result<CompletionOutcome, CompletionError>>>,
}

impl MockModelClient {
    pub fn new(script: Vec<Result<CompletionOutcome, CompletionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn complete(
        &self,
        _system: &str,
        _transcript: &[Message],
        _catalog: &ToolCatalog,
    ) -> Result<(CompletionOutcome, Usage), CompletionError> {
        let mut script = self.script.lock().unwrap();
        match script.pop_front() {
            Some(entry) => entry.map(|outcome| (outcome, Usage::default())),
            // Script exhausted; keep answering with empty text
            None => Ok((CompletionOutcome::FinalAnswer(String::new()), Usage::default())),
        }
    }
}
