//! Agentkit: chat providers, messages and tool dispatch for tool-using agents.

pub mod chat_provider;
pub mod message;
pub mod tooling;
pub mod utils;

mod generate;

pub use generate::{GenerateResult, generate};

use std::collections::HashMap;

use chat_provider::{ChatProvider, ChatProviderError, TokenUsage};
use message::{Message, StreamedMessagePart, ToolCall};
use tokio::sync::{mpsc, oneshot};
use tooling::error::tool_runtime_error;
use tooling::{ToolResult, ToolResultFuture, Toolset};

type ToolResultReceiver = oneshot::Receiver<ToolResult>;

/// Run one step: generate an assistant message and dispatch every tool call
/// it contains to `toolset` as soon as the call is complete.
pub async fn step(
    chat_provider: &dyn ChatProvider,
    system_prompt: &str,
    toolset: &dyn Toolset,
    history: &[Message],
    message_part_tx: Option<mpsc::UnboundedSender<StreamedMessagePart>>,
    tool_result_tx: Option<mpsc::UnboundedSender<ToolResult>>,
) -> Result<StepResult, ChatProviderError> {
    let mut tool_calls = Vec::new();
    let mut receivers: HashMap<String, ToolResultReceiver> = HashMap::new();

    let result = {
        let calls = &mut tool_calls;
        let pending = &mut receivers;
        let mut on_tool_call = |tool_call: ToolCall| {
            let rx = dispatch_tool_call(toolset, tool_call.clone(), tool_result_tx.clone());
            pending.insert(tool_call.id.clone(), rx);
            calls.push(tool_call);
        };

        generate::generate(
            chat_provider,
            system_prompt,
            toolset.tools(),
            history,
            message_part_tx,
            Some(&mut on_tool_call),
        )
        .await?
    };

    Ok(StepResult {
        id: result.id,
        message: result.message,
        usage: result.usage,
        tool_calls,
        receivers,
    })
}

fn dispatch_tool_call(
    toolset: &dyn Toolset,
    tool_call: ToolCall,
    tool_result_tx: Option<mpsc::UnboundedSender<ToolResult>>,
) -> ToolResultReceiver {
    let (result_tx, result_rx) = oneshot::channel();
    match toolset.handle(tool_call.clone()) {
        ToolResultFuture::Immediate(result) => {
            if let Some(tx) = tool_result_tx.as_ref() {
                let _ = tx.send(result.clone());
            }
            let _ = result_tx.send(result);
        }
        ToolResultFuture::Pending(task) => {
            tokio::spawn(async move {
                let result = match task.await {
                    Ok(result) => result,
                    Err(err) => ToolResult {
                        tool_call_id: tool_call.id,
                        return_value: tool_runtime_error(&err.to_string()),
                    },
                };
                if let Some(tx) = tool_result_tx {
                    let _ = tx.send(result.clone());
                }
                let _ = result_tx.send(result);
            });
        }
    }
    result_rx
}

/// Outcome of [`step`]. Tool results are collected with [`StepResult::tool_results`].
pub struct StepResult {
    pub id: Option<String>,
    pub message: Message,
    pub usage: Option<TokenUsage>,
    pub tool_calls: Vec<ToolCall>,
    receivers: HashMap<String, ToolResultReceiver>,
}

impl StepResult {
    /// Wait for all tool results, in tool call order.
    pub async fn tool_results(&mut self) -> anyhow::Result<Vec<ToolResult>> {
        let mut results = Vec::with_capacity(self.tool_calls.len());
        for tool_call in &self.tool_calls {
            if let Some(rx) = self.receivers.remove(&tool_call.id) {
                let result = rx
                    .await
                    .map_err(|_| anyhow::anyhow!("Tool result channel closed"))?;
                results.push(result);
            }
        }
        Ok(results)
    }
}
