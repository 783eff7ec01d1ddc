use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::ConversationError;
use crate::executor::{ToolExecutor, DEFAULT_TOOL_TIMEOUT};
use crate::models::message::Message;
use crate::models::tool::{ToolCatalog, ToolInvocationRequest, ToolResult};
use crate::peer::ToolPeer;
use crate::providers::base::{CompletionOutcome, ModelClient};

pub const DEFAULT_MAX_TOOL_CALLS: usize = 16;

/// How to treat a completion carrying more than one tool call.
///
/// An explicit policy instead of implicit truncation, so the behavior is
/// visible and testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultiToolPolicy {
    /// Honor the first call; log and discard the rest.
    #[default]
    FirstOnly,
    /// Honor every call in emission order, still one at a time.
    Sequential,
    /// Abort the turn as a malformed completion.
    RejectMultiple,
}

/// Tunables for one conversation.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub system_prompt: String,
    /// Ceiling on tool executions within a single turn, bounding worst-case
    /// cost against a model that never finalizes.
    pub max_tool_calls: usize,
    pub multi_tool_policy: MultiToolPolicy,
    pub tool_timeout: Duration,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        ConversationConfig {
            system_prompt: "You are a helpful assistant.".to_string(),
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            multi_tool_policy: MultiToolPolicy::default(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Between turns, ready for the next user query.
    Idle,
    /// A completion request is (about to be) in flight.
    AwaitingModel,
    /// A tool invocation is in flight.
    ExecutingTool,
    /// The last turn ended in a turn-fatal error.
    Aborted,
}

/// One tool request/result pair, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolExchange {
    pub request: ToolInvocationRequest,
    pub result: ToolResult,
}

/// A completed turn: the final answer plus the ordered tool activity that
/// led to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub answer: String,
    pub activity: Vec<ToolExchange>,
}

/// The conversation loop.
///
/// Owns the transcript for the lifetime of the value; no external actor may
/// append to it. Each [`send`](Conversation::send) drives the state machine
/// `AwaitingModel -> ExecutingTool -> AwaitingModel -> ...` until the model
/// produces a final answer or a turn-fatal error aborts. The transcript is
/// intentionally NOT reset between queries — cross-turn memory is the point —
/// and only cleared by an explicit [`reset`](Conversation::reset).
///
/// At most one model or tool call is in flight at any time; a call always
/// runs to completion (success or failure) before the next transition, so a
/// caller dropping interest mid-turn never leaves a dangling unanswered tool
/// request in the transcript.
pub struct Conversation {
    model: Box<dyn ModelClient>,
    peer: Arc<dyn ToolPeer>,
    executor: ToolExecutor,
    config: ConversationConfig,
    transcript: Vec<Message>,
    state: State,
}

impl Conversation {
    pub fn new(
        model: Box<dyn ModelClient>,
        peer: Arc<dyn ToolPeer>,
        config: ConversationConfig,
    ) -> Self {
        let executor = ToolExecutor::new(Arc::clone(&peer), config.tool_timeout);
        Conversation {
            model,
            peer,
            executor,
            config,
            transcript: Vec::new(),
            state: State::Idle,
        }
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Drop all history and return to `Idle`.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.state = State::Idle;
    }

    /// Run one full turn for a user query.
    ///
    /// On success the final answer is in the transcript and returned together
    /// with the turn's tool activity. On a turn-fatal error the transcript is
    /// left exactly as it was after the user message (plus any completed tool
    /// exchanges from earlier steps of this turn), so the query can be
    /// retried.
    pub async fn send(&mut self, query: impl Into<String>) -> Result<Reply, ConversationError> {
        self.transcript.push(Message::user(query));
        self.state = State::AwaitingModel;

        let mut activity: Vec<ToolExchange> = Vec::new();
        let mut executed = 0usize;

        loop {
            // The catalog is fetched fresh for every model call; a stale one
            // could offer tools the peer no longer has.
            let catalog = match self.fetch_catalog().await {
                Ok(catalog) => catalog,
                Err(err) => return self.abort(err),
            };

            let completion = self
                .model
                .complete(&self.config.system_prompt, &self.transcript, &catalog)
                .await;
            let (outcome, usage) = match completion {
                Ok(completion) => completion,
                // The failed call produced no content, so nothing is recorded.
                Err(err) => return self.abort(err.into()),
            };
            debug!(
                input_tokens = ?usage.input_tokens,
                output_tokens = ?usage.output_tokens,
                "model completion received"
            );

            match outcome {
                CompletionOutcome::FinalAnswer(text) => {
                    self.transcript.push(Message::assistant(text.as_str()));
                    self.state = State::Idle;
                    info!(tool_calls = executed, "turn completed");
                    return Ok(Reply {
                        answer: text,
                        activity,
                    });
                }
                CompletionOutcome::ToolRequested(requests) => {
                    let honored = match self.apply_policy(requests) {
                        Ok(honored) => honored,
                        Err(err) => return self.abort(err),
                    };

                    for request in honored {
                        if executed == self.config.max_tool_calls {
                            warn!(
                                limit = self.config.max_tool_calls,
                                "turn exceeded its tool call ceiling"
                            );
                            return self.abort(ConversationError::TurnLimitExceeded(executed));
                        }

                        // Causal order: the assistant's request always lands
                        // in the transcript before the tool's answer.
                        self.transcript.push(Message::tool_request(request.clone()));
                        self.state = State::ExecutingTool;
                        info!(tool = %request.name, id = %request.id, "executing tool");

                        let result = self.executor.invoke(&catalog, &request).await;
                        self.transcript.push(Message::tool_result(result.clone()));
                        executed += 1;
                        activity.push(ToolExchange { request, result });
                        self.state = State::AwaitingModel;
                    }
                }
            }
        }
    }

    async fn fetch_catalog(&self) -> Result<ToolCatalog, ConversationError> {
        let tools = self.peer.list_tools().await?;
        Ok(ToolCatalog::new(tools))
    }

    fn apply_policy(
        &self,
        requests: Vec<ToolInvocationRequest>,
    ) -> Result<Vec<ToolInvocationRequest>, ConversationError> {
        if requests.is_empty() {
            return Err(ConversationError::MalformedCompletion(
                "tool-call completion carried no calls".into(),
            ));
        }
        match self.config.multi_tool_policy {
            MultiToolPolicy::Sequential => Ok(requests),
            MultiToolPolicy::FirstOnly => {
                if requests.len() > 1 {
                    for discarded in &requests[1..] {
                        warn!(
                            tool = %discarded.name,
                            id = %discarded.id,
                            "discarding extra tool call under FirstOnly policy"
                        );
                    }
                }
                Ok(requests.into_iter().take(1).collect())
            }
            MultiToolPolicy::RejectMultiple => {
                if requests.len() > 1 {
                    Err(ConversationError::MalformedCompletion(format!(
                        "completion carried {} tool calls, policy allows one",
                        requests.len()
                    )))
                } else {
                    Ok(requests)
                }
            }
        }
    }

    fn abort(&mut self, err: ConversationError) -> Result<Reply, ConversationError> {
        self.state = State::Aborted;
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{CompletionError, ToolError};
    use crate::models::message::{MessageContent, Role};
    use crate::models::tool::ToolDescriptor;
    use crate::peer::PeerError;
    use crate::providers::mock::MockModelClient;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoPeer;

    #[async_trait]
    impl ToolPeer for EchoPeer {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, PeerError> {
            Ok(vec![ToolDescriptor::new(
                "echo",
                "Echoes back the input",
                json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]}),
            )])
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, PeerError> {
            match name {
                "echo" => Ok(arguments["text"].clone()),
                other => Err(PeerError::Rpc {
                    code: -32601,
                    message: format!("unknown tool '{other}'"),
                }),
            }
        }
    }

    struct DownPeer;

    #[async_trait]
    impl ToolPeer for DownPeer {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, PeerError> {
            Err(PeerError::Transport("connection refused".into()))
        }

        async fn call_tool(&self, _name: &str, _arguments: Value) -> Result<Value, PeerError> {
            Err(PeerError::Transport("connection refused".into()))
        }
    }

    fn conversation(
        script: Vec<Result<CompletionOutcome, CompletionError>>,
        config: ConversationConfig,
    ) -> Conversation {
        Conversation::new(
            Box::new(MockModelClient::new(script)),
            Arc::new(EchoPeer),
            config,
        )
    }

    fn echo_request(id: &str, text: &str) -> ToolInvocationRequest {
        ToolInvocationRequest::new(id, "echo", json!({"text": text}))
    }

    /// Every tool-role message must answer a preceding assistant-role request
    /// with the same correlation id.
    fn assert_causal(transcript: &[Message]) {
        for (index, message) in transcript.iter().enumerate() {
            if let MessageContent::ToolResult(result) = &message.content {
                assert_eq!(message.role, Role::Tool);
                let answered = transcript[..index].iter().any(|earlier| {
                    earlier.role == Role::Assistant
                        && matches!(
                            &earlier.content,
                            MessageContent::ToolRequest(request) if request.id == result.id
                        )
                });
                assert!(answered, "tool result {} has no preceding request", result.id);
            }
        }
    }

    fn tool_results(transcript: &[Message]) -> Vec<&ToolResult> {
        transcript
            .iter()
            .filter_map(|message| match &message.content {
                MessageContent::ToolResult(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_final_answer_on_first_call() -> anyhow::Result<()> {
        let script = vec![Ok(CompletionOutcome::FinalAnswer("Hello!".into()))];
        let mut conversation = conversation(script, ConversationConfig::default());

        let reply = conversation.send("Hi").await?;

        assert_eq!(reply.answer, "Hello!");
        assert!(reply.activity.is_empty());
        assert_eq!(conversation.state(), State::Idle);

        let transcript = conversation.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[0].as_text(), Some("Hi"));
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(transcript[1].as_text(), Some("Hello!"));
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_round_trip_orders_transcript() -> anyhow::Result<()> {
        let script = vec![
            Ok(CompletionOutcome::ToolRequested(vec![echo_request("call_1", "hi")])),
            Ok(CompletionOutcome::FinalAnswer("The tool said hi".into())),
        ];
        let mut conversation = conversation(script, ConversationConfig::default());

        let reply = conversation.send("Echo hi for me").await?;

        assert_eq!(reply.answer, "The tool said hi");
        assert_eq!(reply.activity.len(), 1);
        assert_eq!(reply.activity[0].result.outcome, Ok(json!("hi")));

        let transcript = conversation.transcript();
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(transcript[1].correlation_id(), Some("call_1"));
        assert_eq!(transcript[2].role, Role::Tool);
        assert_eq!(transcript[2].correlation_id(), Some("call_1"));
        assert_eq!(transcript[3].role, Role::Assistant);
        assert_eq!(transcript[3].as_text(), Some("The tool said hi"));
        assert_causal(transcript);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_recoverable() -> anyhow::Result<()> {
        let bad_request = ToolInvocationRequest::new("call_1", "echo", json!({}));
        let script = vec![
            Ok(CompletionOutcome::ToolRequested(vec![bad_request])),
            Ok(CompletionOutcome::FinalAnswer("Sorry, that failed".into())),
        ];
        let mut conversation = conversation(script, ConversationConfig::default());

        let reply = conversation.send("Echo nothing").await?;

        assert_eq!(reply.answer, "Sorry, that failed");
        let results = tool_results(conversation.transcript());
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].outcome,
            Err(ToolError::InvalidArguments { .. })
        ));
        assert_causal(conversation.transcript());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_tool_is_recoverable() -> anyhow::Result<()> {
        let request = ToolInvocationRequest::new("call_1", "teleport", json!({}));
        let script = vec![
            Ok(CompletionOutcome::ToolRequested(vec![request])),
            Ok(CompletionOutcome::FinalAnswer("No such tool, sorry".into())),
        ];
        let mut conversation = conversation(script, ConversationConfig::default());

        let reply = conversation.send("Teleport me").await?;

        assert_eq!(reply.answer, "No such tool, sorry");
        let results = tool_results(conversation.transcript());
        assert_eq!(
            results[0].outcome,
            Err(ToolError::UnknownTool("teleport".into()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_model_unavailable_aborts_cleanly() {
        let script = vec![Err(CompletionError::Unavailable("rate limited".into()))];
        let mut conversation = conversation(script, ConversationConfig::default());

        let err = conversation.send("Hi").await.unwrap_err();

        assert!(matches!(err, ConversationError::ModelUnavailable(_)));
        assert_eq!(conversation.state(), State::Aborted);
        // Only the user's message; the failed call produced no content.
        assert_eq!(conversation.transcript().len(), 1);
        assert_eq!(conversation.transcript()[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_catalog_unavailable_aborts_cleanly() {
        let script = vec![Ok(CompletionOutcome::FinalAnswer("never reached".into()))];
        let mut conversation = Conversation::new(
            Box::new(MockModelClient::new(script)),
            Arc::new(DownPeer),
            ConversationConfig::default(),
        );

        let err = conversation.send("Hi").await.unwrap_err();

        assert!(matches!(err, ConversationError::CatalogUnavailable(_)));
        assert_eq!(conversation.state(), State::Aborted);
        assert_eq!(conversation.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_turn_limit_aborts_after_exactly_n_executions() {
        let script = vec![
            Ok(CompletionOutcome::ToolRequested(vec![echo_request("call_1", "a")])),
            Ok(CompletionOutcome::ToolRequested(vec![echo_request("call_2", "b")])),
            Ok(CompletionOutcome::ToolRequested(vec![echo_request("call_3", "c")])),
        ];
        let config = ConversationConfig {
            max_tool_calls: 2,
            ..ConversationConfig::default()
        };
        let mut conversation = conversation(script, config);

        let err = conversation.send("Loop forever").await.unwrap_err();

        assert!(matches!(err, ConversationError::TurnLimitExceeded(2)));
        assert_eq!(conversation.state(), State::Aborted);
        // Exactly two executions, and no dangling unanswered third request.
        assert_eq!(tool_results(conversation.transcript()).len(), 2);
        assert_causal(conversation.transcript());
    }

    #[tokio::test]
    async fn test_first_only_policy_discards_extras() -> anyhow::Result<()> {
        let script = vec![
            Ok(CompletionOutcome::ToolRequested(vec![
                echo_request("call_1", "first"),
                echo_request("call_2", "second"),
            ])),
            Ok(CompletionOutcome::FinalAnswer("Done".into())),
        ];
        let mut conversation = conversation(script, ConversationConfig::default());

        let reply = conversation.send("Do two things").await?;

        assert_eq!(reply.activity.len(), 1);
        assert_eq!(reply.activity[0].request.id, "call_1");
        assert_eq!(tool_results(conversation.transcript()).len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_sequential_policy_executes_all_in_order() -> anyhow::Result<()> {
        let script = vec![
            Ok(CompletionOutcome::ToolRequested(vec![
                echo_request("call_1", "first"),
                echo_request("call_2", "second"),
            ])),
            Ok(CompletionOutcome::FinalAnswer("Both done".into())),
        ];
        let config = ConversationConfig {
            multi_tool_policy: MultiToolPolicy::Sequential,
            ..ConversationConfig::default()
        };
        let mut conversation = conversation(script, config);

        let reply = conversation.send("Do two things").await?;

        assert_eq!(reply.activity.len(), 2);
        assert_eq!(reply.activity[0].result.outcome, Ok(json!("first")));
        assert_eq!(reply.activity[1].result.outcome, Ok(json!("second")));
        assert_causal(conversation.transcript());
        Ok(())
    }

    #[tokio::test]
    async fn test_reject_multiple_policy_aborts() {
        let script = vec![Ok(CompletionOutcome::ToolRequested(vec![
            echo_request("call_1", "first"),
            echo_request("call_2", "second"),
        ]))];
        let config = ConversationConfig {
            multi_tool_policy: MultiToolPolicy::RejectMultiple,
            ..ConversationConfig::default()
        };
        let mut conversation = conversation(script, config);

        let err = conversation.send("Do two things").await.unwrap_err();

        assert!(matches!(err, ConversationError::MalformedCompletion(_)));
        assert_eq!(conversation.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_tool_request_is_malformed() {
        let script = vec![Ok(CompletionOutcome::ToolRequested(vec![]))];
        let mut conversation = conversation(script, ConversationConfig::default());

        let err = conversation.send("Hi").await.unwrap_err();
        assert!(matches!(err, ConversationError::MalformedCompletion(_)));
    }

    #[tokio::test]
    async fn test_transcript_accumulates_across_turns() -> anyhow::Result<()> {
        let script = vec![
            Ok(CompletionOutcome::FinalAnswer("First answer".into())),
            Ok(CompletionOutcome::FinalAnswer("Second answer".into())),
        ];
        let mut conversation = conversation(script, ConversationConfig::default());

        conversation.send("First question").await?;
        conversation.send("Second question").await?;

        let transcript = conversation.transcript();
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[2].as_text(), Some("Second question"));

        conversation.reset();
        assert!(conversation.transcript().is_empty());
        assert_eq!(conversation.state(), State::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn test_send_recovers_after_abort() -> anyhow::Result<()> {
        let script = vec![
            Err(CompletionError::Unavailable("blip".into())),
            Ok(CompletionOutcome::FinalAnswer("Back online".into())),
        ];
        let mut conversation = conversation(script, ConversationConfig::default());

        assert!(conversation.send("Hi").await.is_err());
        assert_eq!(conversation.state(), State::Aborted);

        let reply = conversation.send("Hi").await?;
        assert_eq!(reply.answer, "Back online");
        assert_eq!(conversation.state(), State::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn test_catalog_refresh_is_idempotent() -> anyhow::Result<()> {
        let peer = EchoPeer;
        let first = ToolCatalog::new(peer.list_tools().await?);
        let second = ToolCatalog::new(peer.list_tools().await?);
        assert_eq!(first, second);
        Ok(())
    }
}
