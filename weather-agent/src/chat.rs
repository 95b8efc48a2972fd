use std::sync::Arc;

use tracing::{info, warn};

use agentkit::chat_provider::ChatProviderErrorKind;
use agentkit::generate;
use agentkit::message::Message;

use crate::llm::LLM;

pub const UNREADABLE_REPLY: &str =
    "Sorry, I couldn't understand the response from the AI service.";

/// Free-form replies for queries no tool handles. Uses the model when one is
/// configured and falls back to canned replies otherwise or on failure.
#[derive(Clone, Default)]
pub struct ChatFallback {
    llm: Option<Arc<LLM>>,
}

impl ChatFallback {
    pub fn new(llm: Option<Arc<LLM>>) -> Self {
        Self { llm }
    }

    pub fn offline() -> Self {
        Self { llm: None }
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn send_message(&self, message: &str) -> String {
        info!("Sending message to AI: {message}");
        let Some(llm) = self.llm.as_ref() else {
            warn!("No model configured, returning canned reply");
            return canned_reply(message).to_string();
        };
        if message.trim().is_empty() {
            return canned_reply(message).to_string();
        }

        let history = [Message::user(message)];
        match generate(llm.chat_provider.as_ref(), "", Vec::new(), &history, None, None).await {
            Ok(result) => {
                let text = result.message.extract_text("");
                if text.trim().is_empty() {
                    UNREADABLE_REPLY.to_string()
                } else {
                    text
                }
            }
            Err(err) if err.kind == ChatProviderErrorKind::EmptyResponse => {
                warn!("Model returned no text: {err}");
                UNREADABLE_REPLY.to_string()
            }
            Err(err) => {
                warn!("Model call failed, falling back to canned reply: {err}");
                canned_reply(message).to_string()
            }
        }
    }
}

pub fn canned_reply(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    let has = |word: &str| lower.contains(word);

    if has("weather") && has("temperature") {
        "I can help you check the weather and temperature for any location. What city would you like to know about?"
    } else if has("weather") {
        "I can provide weather information for any location. Please specify which city you'd like to know about."
    } else if has("temperature") {
        "I can check the current temperature for you. Which location are you interested in?"
    } else if has("rain") {
        "I can check if it's raining in a specific location. Where would you like me to check?"
    } else if has("hello") || has("hi") {
        "Hello! I'm a weather assistant. I can help you check the weather, temperature, and rain status for any location."
    } else {
        "I'm a weather assistant. I can help you with weather information, temperature checks, and rain status for any location. How can I assist you today?"
    }
}
