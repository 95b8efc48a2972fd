use tokio::sync::mpsc;
use tracing::trace;

use crate::chat_provider::{ChatProvider, ChatProviderError, ChatProviderErrorKind, TokenUsage};
use crate::message::{Message, Role, StreamedMessagePart, ToolCall};
use crate::tooling::Tool;

pub struct GenerateResult {
    pub id: Option<String>,
    pub message: Message,
    pub usage: Option<TokenUsage>,
}

/// Stream one assistant message from `chat_provider`, merging adjacent parts.
///
/// Every raw part is forwarded to `message_part_tx`; `on_tool_call` fires once
/// per tool call after its argument fragments have been merged.
pub async fn generate(
    chat_provider: &dyn ChatProvider,
    system_prompt: &str,
    tools: Vec<Tool>,
    history: &[Message],
    message_part_tx: Option<mpsc::UnboundedSender<StreamedMessagePart>>,
    mut on_tool_call: Option<&mut (dyn FnMut(ToolCall) + Send)>,
) -> Result<GenerateResult, ChatProviderError> {
    let mut message = Message::new(Role::Assistant, Vec::new());
    let mut pending: Option<StreamedMessagePart> = None;

    trace!("Generating with {} history messages", history.len());
    let mut stream = chat_provider
        .generate(system_prompt, &tools, history)
        .await?;

    while let Some(part) = stream.next_part().await? {
        trace!("Received part: {:?}", part);
        if let Some(tx) = message_part_tx.as_ref() {
            let _ = tx.send(part.clone());
        }

        pending = match pending.take() {
            None => Some(part),
            Some(mut current) => {
                if current.merge_in_place(&part) {
                    Some(current)
                } else {
                    append_part(&mut message, current, &mut on_tool_call);
                    Some(part)
                }
            }
        };
    }

    if let Some(last) = pending {
        append_part(&mut message, last, &mut on_tool_call);
    }

    let no_tool_calls = message.tool_calls.as_ref().is_none_or(|v| v.is_empty());
    if message.content.is_empty() && no_tool_calls {
        return Err(ChatProviderError::new(
            ChatProviderErrorKind::EmptyResponse,
            "The API returned an empty response.",
        ));
    }

    Ok(GenerateResult {
        id: stream.id(),
        message,
        usage: stream.usage(),
    })
}

fn append_part(
    message: &mut Message,
    part: StreamedMessagePart,
    on_tool_call: &mut Option<&mut (dyn FnMut(ToolCall) + Send)>,
) {
    match part {
        StreamedMessagePart::Content(content) => message.content.push(content),
        StreamedMessagePart::ToolCall(tool_call) => {
            message
                .tool_calls
                .get_or_insert_with(Vec::new)
                .push(tool_call.clone());
            if let Some(cb) = on_tool_call.as_deref_mut() {
                cb(tool_call);
            }
        }
        // orphaned argument fragment
        StreamedMessagePart::ToolCallPart(_) => {}
    }
}
