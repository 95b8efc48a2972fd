//! Offline providers that replay a tiny line-based script instead of calling
//! a model. Used by tests and for scripted demos.
//!
//! ```text
//! id: msg-1
//! usage: input_other=10 output=2
//! text: Checking the weather.
//! tool_call: {"id": "call-1", "name": "get_weather", "arguments": "{\"city\": \"Oslo\"}"}
//! ```

use async_trait::async_trait;

use crate::chat_provider::{
    ChatProvider, ChatProviderError, PartsStreamedMessage, StreamedMessage,
};
use crate::message::{Message, Role};
use crate::tooling::Tool;

pub mod dsl;
pub mod scripted;

pub use dsl::parse_echo_script;
pub use scripted::ScriptedEchoChatProvider;

/// Treats the last user message as the script.
pub struct EchoChatProvider;

#[async_trait]
impl ChatProvider for EchoChatProvider {
    fn name(&self) -> &str {
        "echo"
    }

    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate(
        &self,
        _system_prompt: &str,
        _tools: &[Tool],
        history: &[Message],
    ) -> Result<Box<dyn StreamedMessage>, ChatProviderError> {
        let last = history.last().ok_or_else(|| {
            ChatProviderError::other("EchoChatProvider requires at least one message in history.")
        })?;
        if last.role != Role::User {
            return Err(ChatProviderError::other(
                "EchoChatProvider expects last history message to be user.",
            ));
        }
        let (parts, message_id, usage) = parse_echo_script(&last.extract_text(""))?;
        if parts.is_empty() {
            return Err(ChatProviderError::other(
                "EchoChatProvider DSL produced no streamable parts.",
            ));
        }
        Ok(Box::new(PartsStreamedMessage::new(parts, message_id, usage)))
    }
}
