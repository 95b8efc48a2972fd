use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::{Message, StreamedMessagePart};
use crate::tooling::Tool;

pub mod echo;
pub mod gemini;

#[async_trait]
pub trait StreamedMessage: Send {
    async fn next_part(&mut self) -> Result<Option<StreamedMessagePart>, ChatProviderError>;
    fn id(&self) -> Option<String>;
    fn usage(&self) -> Option<TokenUsage>;
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model_name(&self) -> &str;
    async fn generate(
        &self,
        system_prompt: &str,
        tools: &[Tool],
        history: &[Message],
    ) -> Result<Box<dyn StreamedMessage>, ChatProviderError>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_other: i64,
    pub output: i64,
    #[serde(default)]
    pub input_cache_read: i64,
    #[serde(default)]
    pub input_cache_creation: i64,
}

impl TokenUsage {
    pub fn total(&self) -> i64 {
        self.input() + self.output
    }

    pub fn input(&self) -> i64 {
        self.input_other + self.input_cache_read + self.input_cache_creation
    }
}

#[derive(Debug)]
pub struct ChatProviderError {
    pub message: String,
    pub kind: ChatProviderErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatProviderErrorKind {
    Connection,
    Timeout,
    Status(u16),
    EmptyResponse,
    Other,
}

impl ChatProviderError {
    pub fn new(kind: ChatProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ChatProviderErrorKind::Other, message)
    }
}

impl fmt::Display for ChatProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ChatProviderError {}

/// Replays a fixed list of parts. Shared by the scripted providers.
pub struct PartsStreamedMessage {
    parts: std::collections::VecDeque<StreamedMessagePart>,
    id: Option<String>,
    usage: Option<TokenUsage>,
}

impl PartsStreamedMessage {
    pub fn new(parts: Vec<StreamedMessagePart>, id: Option<String>, usage: Option<TokenUsage>) -> Self {
        Self {
            parts: parts.into(),
            id,
            usage,
        }
    }
}

#[async_trait]
impl StreamedMessage for PartsStreamedMessage {
    async fn next_part(&mut self) -> Result<Option<StreamedMessagePart>, ChatProviderError> {
        Ok(self.parts.pop_front())
    }

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn usage(&self) -> Option<TokenUsage> {
        self.usage.clone()
    }
}
