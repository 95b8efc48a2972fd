use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::chat_provider::{
    ChatProvider, ChatProviderError, PartsStreamedMessage, StreamedMessage,
};
use crate::message::Message;
use crate::tooling::Tool;

use super::dsl::parse_echo_script;

/// Pops one script per `generate` call, ignoring the history.
pub struct ScriptedEchoChatProvider {
    scripts: Mutex<VecDeque<String>>,
    turn: AtomicUsize,
}

impl ScriptedEchoChatProvider {
    pub fn new<I, S>(scripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scripts: Mutex::new(scripts.into_iter().map(Into::into).collect()),
            turn: AtomicUsize::new(0),
        }
    }

    pub fn remaining(&self) -> usize {
        self.scripts.lock().map(|scripts| scripts.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatProvider for ScriptedEchoChatProvider {
    fn name(&self) -> &str {
        "scripted_echo"
    }

    fn model_name(&self) -> &str {
        "scripted_echo"
    }

    async fn generate(
        &self,
        _system_prompt: &str,
        _tools: &[Tool],
        _history: &[Message],
    ) -> Result<Box<dyn StreamedMessage>, ChatProviderError> {
        let script = self
            .scripts
            .lock()
            .map_err(|_| ChatProviderError::other("scripted echo scripts lock poisoned"))?
            .pop_front();
        let turn = self.turn.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(script) = script else {
            return Err(ChatProviderError::other(format!(
                "ScriptedEchoChatProvider exhausted at turn {turn}."
            )));
        };
        debug!(turn, "Scripted echo turn");
        let (parts, message_id, usage) = parse_echo_script(&script)?;
        if parts.is_empty() {
            return Err(ChatProviderError::other(
                "ScriptedEchoChatProvider DSL produced no streamable parts.",
            ));
        }
        Ok(Box::new(PartsStreamedMessage::new(parts, message_id, usage)))
    }
}
