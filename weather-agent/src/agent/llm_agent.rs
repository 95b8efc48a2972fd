use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info};

use agentkit::chat_provider::{ChatProviderError, ChatProviderErrorKind};
use agentkit::message::{ContentPart, Message, StreamedMessagePart};
use agentkit::tooling::{ToolResult, Toolset};
use agentkit::tooling::simple::SimpleToolset;
use agentkit::{StepResult, step as agentkit_step};

use crate::agent::context::{Context, Session};
use crate::agent::message::tool_result_to_message;
use crate::agent::{Agent, AgentEvent, EventSender, LLMNotSet, MaxStepsReached, emit};
use crate::chat::UNREADABLE_REPLY;
use crate::config::{AgentMode, LoopControl};
use crate::llm::LLM;

pub const INSTRUCTION: &str =
    "You are a helpful agent who can answer user questions about the time and weather in a city.";

type StepStopReason = &'static str;

pub struct StepOutcome {
    pub stop_reason: StepStopReason,
    pub assistant_message: Message,
}

pub struct TurnOutcome {
    pub stop_reason: StepStopReason,
    pub final_message: Option<Message>,
    pub step_count: i64,
}

/// Function-calling agent: loops model steps, running the requested tools,
/// until the model answers without tool calls.
pub struct LlmAgent {
    instruction: String,
    llm: Option<Arc<LLM>>,
    toolset: SimpleToolset,
    loop_control: LoopControl,
    session: Session,
    context: tokio::sync::Mutex<Context>,
}

impl LlmAgent {
    pub fn new(
        llm: Option<Arc<LLM>>,
        toolset: SimpleToolset,
        loop_control: LoopControl,
        session: Session,
    ) -> Self {
        Self {
            instruction: INSTRUCTION.to_string(),
            llm,
            toolset,
            loop_control,
            session,
            context: tokio::sync::Mutex::new(Context::new()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn context(&self) -> &tokio::sync::Mutex<Context> {
        &self.context
    }

    pub async fn turn(
        &self,
        user_message: Message,
        events: Option<&EventSender>,
    ) -> Result<TurnOutcome, anyhow::Error> {
        if self.llm.is_none() {
            return Err(anyhow::Error::new(LLMNotSet));
        }
        {
            let mut context = self.context.lock().await;
            context.append_messages([user_message]);
        }
        debug!("Appended user message to context");
        self.agent_loop(events).await
    }

    async fn agent_loop(&self, events: Option<&EventSender>) -> Result<TurnOutcome, anyhow::Error> {
        let mut step_no = 0;
        loop {
            step_no += 1;
            if step_no > self.loop_control.max_steps_per_turn {
                return Err(anyhow::Error::new(MaxStepsReached::new(
                    self.loop_control.max_steps_per_turn,
                )));
            }

            emit(events, AgentEvent::StepBegin { n: step_no });
            debug!("Beginning step {}", step_no);
            if let Some(outcome) = self.step(events).await? {
                let final_message = if outcome.stop_reason == "no_tool_calls" {
                    Some(outcome.assistant_message)
                } else {
                    None
                };
                return Ok(TurnOutcome {
                    stop_reason: outcome.stop_reason,
                    final_message,
                    step_count: step_no,
                });
            }
        }
    }

    async fn step(&self, events: Option<&EventSender>) -> Result<Option<StepOutcome>, anyhow::Error> {
        let llm = self.llm.as_ref().ok_or(LLMNotSet)?;

        let mut attempts = 0usize;
        let (result, forward_task) = loop {
            attempts += 1;
            let (message_tx, message_rx) = mpsc::unbounded_channel();
            let (tool_tx, tool_rx) = mpsc::unbounded_channel();
            let handle = tokio::spawn(forward_events(message_rx, tool_rx, events.cloned()));

            let history = { self.context.lock().await.history().to_vec() };
            let step_result = agentkit_step(
                llm.chat_provider.as_ref(),
                &self.instruction,
                &self.toolset,
                &history,
                Some(message_tx),
                Some(tool_tx),
            )
            .await;

            match step_result {
                Ok(res) => break (res, handle),
                Err(err) => {
                    let _ = handle.await;
                    if attempts >= self.loop_control.max_retries_per_step as usize
                        || !is_retryable_error(&err)
                    {
                        return Err(anyhow::Error::new(err));
                    }
                    let delay = retry_delay(attempts);
                    info!(
                        "Retrying step for the {} time. Waiting {} seconds.",
                        attempts,
                        delay.as_secs_f64()
                    );
                    emit(events, AgentEvent::Retry { attempt: attempts, delay });
                    tokio::time::sleep(delay).await;
                }
            }
        };

        let outcome = self.handle_step_result(result).await;
        let _ = forward_task.await;
        outcome
    }

    async fn handle_step_result(
        &self,
        mut result: StepResult,
    ) -> Result<Option<StepOutcome>, anyhow::Error> {
        debug!(
            "Got step result: id={}, tool_calls={}",
            result.id.as_deref().unwrap_or(""),
            result.tool_calls.len()
        );
        if let Some(usage) = &result.usage {
            self.context.lock().await.update_token_count(usage.input());
        }

        let tool_results = result.tool_results().await?;
        debug!("Got tool results: {}", tool_results.len());
        self.grow_context(&result, &tool_results).await;

        if !result.tool_calls.is_empty() {
            return Ok(None);
        }
        Ok(Some(StepOutcome {
            stop_reason: "no_tool_calls",
            assistant_message: result.message,
        }))
    }

    async fn grow_context(&self, result: &StepResult, tool_results: &[ToolResult]) {
        let tool_messages: Vec<Message> = tool_results.iter().map(tool_result_to_message).collect();
        let mut context = self.context.lock().await;
        context.append_messages([result.message.clone()]);
        if let Some(usage) = &result.usage {
            context.update_token_count(usage.total());
        }
        debug!("Appending tool messages to context: {}", tool_messages.len());
        context.append_messages(tool_messages);
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.session.app_name
    }

    fn mode(&self) -> AgentMode {
        AgentMode::Llm
    }

    fn model_name(&self) -> Option<&str> {
        self.llm.as_ref().map(|llm| llm.model_name())
    }

    fn available_tools(&self) -> String {
        let mut lines = vec!["Available tools:".to_string()];
        for tool in self.toolset.tools() {
            let summary = tool.description.lines().next().unwrap_or_default().trim().to_string();
            lines.push(format!("- {}: {}", tool.name, summary));
        }
        lines.join("\n")
    }

    async fn respond(&self, query: &str, events: Option<&EventSender>) -> anyhow::Result<String> {
        info!("Processing query in session {}: {}", self.session.id, query);
        let outcome = self.turn(Message::user(query), events).await?;
        debug!(
            "Turn finished after {} step(s): {}",
            outcome.step_count, outcome.stop_reason
        );
        let text = outcome
            .final_message
            .map(|message| message.extract_text(""))
            .unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            return Ok(UNREADABLE_REPLY.to_string());
        }
        Ok(text.to_string())
    }
}

async fn forward_events(
    mut message_rx: mpsc::UnboundedReceiver<StreamedMessagePart>,
    mut tool_rx: mpsc::UnboundedReceiver<ToolResult>,
    events: Option<EventSender>,
) {
    let mut names: HashMap<String, String> = HashMap::new();
    let mut message_done = false;
    let mut tool_done = false;
    loop {
        tokio::select! {
            part = message_rx.recv(), if !message_done => {
                match part {
                    Some(StreamedMessagePart::Content(ContentPart::Text(text))) => {
                        emit(events.as_ref(), AgentEvent::Text(text.text));
                    }
                    Some(StreamedMessagePart::ToolCall(call)) => {
                        names.insert(call.id.clone(), call.function.name.clone());
                        emit(events.as_ref(), AgentEvent::ToolCall {
                            id: call.id,
                            name: call.function.name,
                        });
                    }
                    Some(_) => {}
                    None => message_done = true,
                }
            }
            result = tool_rx.recv(), if !tool_done => {
                match result {
                    Some(tool_result) => {
                        let name = names.get(&tool_result.tool_call_id).cloned().unwrap_or_default();
                        emit(events.as_ref(), AgentEvent::ToolResult {
                            brief: tool_result.return_value.brief(),
                            is_error: tool_result.return_value.is_error,
                            tool_call_id: tool_result.tool_call_id,
                            name,
                        });
                    }
                    None => tool_done = true,
                }
            }
        }
        if message_done && tool_done {
            break;
        }
    }
}

fn retry_delay(attempt: usize) -> Duration {
    let base = 0.3 * 2f64.powi((attempt as i32).saturating_sub(1));
    let capped = base.min(5.0);
    let jitter: f64 = rand::rng().random_range(0.0..0.5);
    Duration::from_secs_f64(capped + jitter)
}

fn is_retryable_error(err: &ChatProviderError) -> bool {
    match err.kind {
        ChatProviderErrorKind::Connection
        | ChatProviderErrorKind::Timeout
        | ChatProviderErrorKind::EmptyResponse => true,
        ChatProviderErrorKind::Status(code) => matches!(code, 429 | 500 | 502 | 503),
        ChatProviderErrorKind::Other => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_backs_off_and_caps() {
        for (attempt, base) in [(1, 0.3), (2, 0.6), (3, 1.2), (10, 5.0)] {
            let delay = retry_delay(attempt).as_secs_f64();
            assert!(delay >= base && delay < base + 0.5, "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn only_transient_errors_are_retried() {
        let kinds = [
            (ChatProviderErrorKind::Connection, true),
            (ChatProviderErrorKind::Timeout, true),
            (ChatProviderErrorKind::EmptyResponse, true),
            (ChatProviderErrorKind::Status(429), true),
            (ChatProviderErrorKind::Status(503), true),
            (ChatProviderErrorKind::Status(400), false),
            (ChatProviderErrorKind::Other, false),
        ];
        for (kind, expected) in kinds {
            let err = ChatProviderError::new(kind, "x");
            assert_eq!(is_retryable_error(&err), expected, "{kind:?}");
        }
    }
}
