use thiserror::Error;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Raised when `--mode llm` is requested without a usable model.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiKeyMissing {
    message: String,
}

impl ApiKeyMissing {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
