//! The turn loop implementation.

use std::sync::Arc;
use std::time::Instant;
use mcplink_config::AppConfig;
use mcplink_core::error::Error;
use mcplink_core::event::{DomainEvent, EventBus};
use mcplink_core::message::{Conversation, Message, MessageToolCall};
use mcplink_core::provider::{Provider, ProviderRequest, ReasoningEffort};
use mcplink_core::tool::{ToolCatalog, ToolInvocationResult};
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};
use crate::dispatcher::ToolDispatcher;

const OUTPUT_PREVIEW_CHARS: usize = 200;

/// Where the engine is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingModel,
    HasFinalAnswer,
    HasPendingToolCalls,
    DispatchingTools,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TurnState::Idle => "idle",
            TurnState::AwaitingModel => "awaiting_model",
            TurnState::HasFinalAnswer => "has_final_answer",
            TurnState::HasPendingToolCalls => "has_pending_tool_calls",
            TurnState::DispatchingTools => "dispatching_tools",
        };
        write!(f, "{s}")
    }
}

/// The result of a completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The model's final text (empty if it sent none)
    pub answer: String,

    /// Model round trips this turn
    pub rounds: u32,

    /// Tool calls dispatched this turn
    pub tool_dispatches: usize,
}

/// The engine that drives a conversation through model rounds and tool
/// dispatch until the model answers in plain text.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Optional reasoning-effort hint
    reasoning_effort: Option<ReasoningEffort>,

    /// Temperature setting; provider default when unset
    temperature: Option<f32>,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Maximum model rounds per turn
    max_rounds: u32,

    /// Run a round's tool calls concurrently
    parallel_tool_calls: bool,

    dispatcher: ToolDispatcher,

    conversation: Conversation,

    state: TurnState,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    /// Create a new agent loop with a fresh conversation.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        dispatcher: ToolDispatcher,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            reasoning_effort: None,
            temperature: None,
            max_tokens: None,
            max_rounds: 25,
            parallel_tool_calls: false,
            dispatcher,
            conversation: Conversation::new(system_prompt),
            state: TurnState::Idle,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Create an agent loop with the model and loop settings from `config`.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        dispatcher: ToolDispatcher,
        config: &AppConfig,
    ) -> Self {
        let mut agent = Self::new(provider, &config.model, dispatcher, &config.system_prompt)
            .with_max_rounds(config.agent.max_rounds)
            .with_parallel_tool_calls(config.agent.parallel_tool_calls);
        agent.reasoning_effort = config.reasoning_effort;
        agent.temperature = config.temperature;
        agent.max_tokens = config.max_tokens;
        agent
    }

    /// Set the maximum number of model rounds per turn (at least one).
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max.max(1);
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Publish events on a shared bus instead of a private one.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn catalog(&self) -> &ToolCatalog {
        self.dispatcher.catalog()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub(crate) fn dispatcher_mut(&mut self) -> &mut ToolDispatcher {
        &mut self.dispatcher
    }

    /// Run one user turn to completion.
    ///
    /// Appends the user message, then alternates model rounds and tool
    /// dispatch until the model replies without tool calls. Model errors,
    /// a lost tool server connection, and exceeding `max_rounds` end the turn
    /// with an error; the conversation keeps everything appended so far.
    pub async fn process_turn(&mut self, user_text: &str) -> Result<TurnOutcome, Error> {
        info!(
            conversation_id = %self.conversation.id,
            messages = self.conversation.len(),
            "Processing turn"
        );

        self.conversation.append(Message::user(user_text));

        let mut round = 0;
        let result = self.run_rounds(&mut round).await;
        self.state = TurnState::Idle;

        match &result {
            Ok(outcome) => {
                self.event_bus.publish(DomainEvent::TurnCompleted {
                    conversation_id: self.conversation.id.to_string(),
                    rounds: outcome.rounds,
                    tool_dispatches: outcome.tool_dispatches,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                warn!(conversation_id = %self.conversation.id, round, error = %e, "Turn failed");
                self.event_bus.publish(DomainEvent::TurnFailed {
                    conversation_id: self.conversation.id.to_string(),
                    round,
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        result
    }

    async fn run_rounds(&mut self, round: &mut u32) -> Result<TurnOutcome, Error> {
        let mut tool_dispatches = 0;

        loop {
            if *round >= self.max_rounds {
                warn!(
                    conversation_id = %self.conversation.id,
                    max_rounds = self.max_rounds,
                    "Round cap reached without a final answer"
                );
                return Err(Error::ToolLoopExceeded {
                    max_rounds: self.max_rounds,
                });
            }
            *round += 1;

            let pending = self.conversation.pending_tool_calls();
            if !pending.is_empty() {
                return Err(Error::Internal(format!(
                    "unanswered tool calls before model submission: {}",
                    pending.join(", ")
                )));
            }

            debug!(
                conversation_id = %self.conversation.id,
                round = *round,
                "Agent loop round"
            );

            self.state = TurnState::AwaitingModel;
            let request = ProviderRequest {
                model: self.model.clone(),
                messages: self.conversation.snapshot().to_vec(),
                tools: self.dispatcher.catalog().declarations().to_vec(),
                reasoning_effort: self.reasoning_effort,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            let response = self.provider.complete(request).await?;

            self.event_bus.publish(DomainEvent::ModelResponded {
                conversation_id: self.conversation.id.to_string(),
                round: *round,
                model: response.model.clone(),
                tool_calls: response.tool_calls.len(),
                tokens_used: response.usage.as_ref().map(|u| u.total_tokens),
                timestamp: Utc::now(),
            });

            let message = response.into_message();
            let tool_calls = message.tool_calls().to_vec();
            self.conversation.append(message);

            if tool_calls.is_empty() {
                self.state = TurnState::HasFinalAnswer;
                let answer = self
                    .conversation
                    .last()
                    .and_then(Message::content)
                    .unwrap_or_default()
                    .to_string();

                info!(rounds = *round, tool_dispatches, "Turn complete");
                return Ok(TurnOutcome {
                    answer,
                    rounds: *round,
                    tool_dispatches,
                });
            }

            self.state = TurnState::HasPendingToolCalls;
            debug!(tool_count = tool_calls.len(), "Executing tool calls");

            if self.parallel_tool_calls {
                self.dispatch_concurrently(&tool_calls).await?;
            } else {
                self.dispatch_in_order(&tool_calls).await?;
            }
            tool_dispatches += tool_calls.len();

            // Loop back so the model sees the results
        }
    }

    async fn dispatch_in_order(&mut self, calls: &[MessageToolCall]) -> Result<(), Error> {
        self.state = TurnState::DispatchingTools;
        for (i, call) in calls.iter().enumerate() {
            match self.dispatch_one(call).await {
                Ok(result) => self.conversation.append(result.into_message()),
                Err(e) => {
                    self.answer_abandoned(&calls[i..], &e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn dispatch_concurrently(&mut self, calls: &[MessageToolCall]) -> Result<(), Error> {
        self.state = TurnState::DispatchingTools;
        let results = join_all(calls.iter().map(|call| self.dispatch_one(call))).await;

        let mut fatal = None;
        for (call, result) in calls.iter().zip(results) {
            match result {
                Ok(result) => self.conversation.append(result.into_message()),
                Err(e) => {
                    self.answer_abandoned(std::slice::from_ref(call), &e);
                    fatal.get_or_insert(e);
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Keep every tool call answered even when the turn is aborted mid-round.
    fn answer_abandoned(&mut self, calls: &[MessageToolCall], cause: &Error) {
        for call in calls {
            self.conversation
                .append(ToolInvocationResult::failure(&call.id, cause).into_message());
        }
    }

    async fn dispatch_one(&self, call: &MessageToolCall) -> Result<ToolInvocationResult, Error> {
        let start = Instant::now();
        let result = self.dispatcher.dispatch(call).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(
            tool = %call.name,
            success = result.success,
            duration_ms,
            "Tool call finished"
        );

        self.event_bus.publish(DomainEvent::ToolDispatched {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            success: result.success,
            output_preview: preview(&result.content),
            duration_ms,
            timestamp: Utc::now(),
        });

        Ok(result)
    }
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(OUTPUT_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}…", &content[..cut]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcplink_core::error::{ProviderError, ToolError};
    use mcplink_core::provider::{ProviderResponse, Usage};
    use std::sync::Mutex;

    /// A mock provider that returns a fixed response and records requests.
    struct MockProvider {
        response: String,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    #[async_trait::async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str { "mock" }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            Ok(ProviderResponse {
                content: Some(self.response.clone()),
                tool_calls: vec![],
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: "mock-model".into(),
            })
        }
    }

    /// Always asks for the same tool.
    struct LoopingProvider;

    #[async_trait::async_trait]
    impl Provider for LoopingProvider {
        fn name(&self) -> &str { "looping" }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                content: None,
                tool_calls: vec![MessageToolCall {
                    id: format!("call_{}", request.messages.len()),
                    name: "anything".into(),
                    arguments: "{}".into(),
                }],
                usage: None,
                model: "mock-model".into(),
            })
        }
    }

    fn mock(response: &str) -> Arc<MockProvider> {
        Arc::new(MockProvider {
            response: response.into(),
            requests: Mutex::new(vec![]),
        })
    }

    fn offline() -> ToolDispatcher {
        ToolDispatcher::disconnected(ToolCatalog::default())
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = mock("Hello! How can I help?");
        let mut agent = AgentLoop::new(provider.clone(), "mock-model", offline(), "Be brief.");

        let outcome = agent.process_turn("Hello!").await.unwrap();
        assert_eq!(outcome.answer, "Hello! How can I help?");
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.tool_dispatches, 0);
        // System + User + Assistant = 3 messages
        assert_eq!(agent.conversation().len(), 3);
        assert_eq!(agent.state(), TurnState::Idle);
        assert_eq!(provider.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn request_carries_model_settings() {
        let provider = mock("ok");
        let mut agent = AgentLoop::new(provider.clone(), "o4-mini", offline(), "sys")
            .with_reasoning_effort(ReasoningEffort::High)
            .with_temperature(0.2)
            .with_max_tokens(512);

        agent.process_turn("hi").await.unwrap();

        let requests = provider.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.model, "o4-mini");
        assert_eq!(request.reasoning_effort, Some(ReasoningEffort::High));
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content(), Some("sys"));
    }

    #[tokio::test]
    async fn from_config_applies_settings() {
        let mut config = AppConfig::default();
        config.model = "gpt-4.1".into();
        config.agent.max_rounds = 3;
        config.reasoning_effort = Some(ReasoningEffort::Low);

        let agent = AgentLoop::from_config(mock("ok"), offline(), &config);
        assert_eq!(agent.model(), "gpt-4.1");
        assert_eq!(agent.max_rounds(), 3);
        assert_eq!(agent.reasoning_effort, Some(ReasoningEffort::Low));
        assert_eq!(agent.conversation().system_prompt(), config.system_prompt);
    }

    #[tokio::test]
    async fn zero_max_rounds_is_clamped() {
        let agent = AgentLoop::new(mock("ok"), "m", offline(), "s").with_max_rounds(0);
        assert_eq!(agent.max_rounds(), 1);
    }

    #[tokio::test]
    async fn lost_connection_aborts_turn_but_answers_calls() {
        let mut agent = AgentLoop::new(Arc::new(LoopingProvider), "m", offline(), "s");

        let err = agent.process_turn("go").await.unwrap_err();
        assert!(matches!(err, Error::Tool(ToolError::NotConnected)));
        assert_eq!(agent.state(), TurnState::Idle);
        assert!(agent.conversation().pending_tool_calls().is_empty());
    }

    #[tokio::test]
    async fn dispatch_moves_pending_calls_to_dispatching() {
        let calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "anything".into(),
            arguments: "{}".into(),
        }];

        for parallel in [false, true] {
            let mut agent = AgentLoop::new(mock("ok"), "m", offline(), "s");
            agent.state = TurnState::HasPendingToolCalls;

            let result = if parallel {
                agent.dispatch_concurrently(&calls).await
            } else {
                agent.dispatch_in_order(&calls).await
            };
            assert!(result.is_err());
            assert_eq!(agent.state(), TurnState::DispatchingTools, "parallel={parallel}");
        }
    }

    #[tokio::test]
    async fn events_are_published() {
        let mut agent = AgentLoop::new(mock("done"), "m", offline(), "s");
        let mut rx = agent.event_bus().subscribe();

        agent.process_turn("hi").await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.as_ref(),
            DomainEvent::ModelResponded { round: 1, tool_calls: 0, tokens_used: Some(15), .. }
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second.as_ref(),
            DomainEvent::TurnCompleted { rounds: 1, tool_dispatches: 0, .. }
        ));
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(OUTPUT_PREVIEW_CHARS + 10);
        let short = preview(&long);
        assert_eq!(short.chars().count(), OUTPUT_PREVIEW_CHARS + 1);
        assert_eq!(preview("short"), "short");
    }
}
