use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use agentkit::chat_provider::ChatProvider;
use agentkit::chat_provider::echo::{EchoChatProvider, ScriptedEchoChatProvider};
use agentkit::chat_provider::gemini::Gemini;

use crate::config::{LLMModel, LLMProvider, ProviderType, expand_user};
use crate::constant::{DEFAULT_MODEL, user_agent};

/// Environment variables checked for a Google AI Studio key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["GOOGLE_API_KEY", "GOOGLE_AISTUDIO_API_KEY"];
pub const SCRIPTED_ECHO_SCRIPTS_ENV: &str = "WEATHER_AGENT_SCRIPTED_ECHO_SCRIPTS";

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("chat provider error: {0}")]
    ChatProvider(String),
    #[error("scripted echo error: {0}")]
    ScriptedEcho(String),
    #[error("{0}")]
    EnvVar(String),
}

pub struct LLM {
    pub chat_provider: Box<dyn ChatProvider>,
    pub max_context_size: i64,
    pub model_config: Option<LLMModel>,
    pub provider_config: Option<LLMProvider>,
}

impl LLM {
    pub fn model_name(&self) -> &str {
        self.chat_provider.model_name()
    }

    pub fn provider_name(&self) -> &str {
        self.chat_provider.name()
    }
}

/// First non-empty Google API key found in the environment.
pub fn env_api_key() -> Option<String> {
    API_KEY_ENV_VARS.iter().find_map(|name| {
        env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

/// Provider and model used when the config names none.
pub fn fallback_gemini() -> (LLMProvider, LLMModel) {
    (
        LLMProvider {
            provider_type: ProviderType::Gemini,
            base_url: String::new(),
            api_key: String::new(),
            env: None,
            custom_headers: None,
        },
        LLMModel {
            provider: String::new(),
            model: DEFAULT_MODEL.to_string(),
            max_context_size: 1_048_576,
        },
    )
}

/// Apply environment overrides to a provider/model pair. Returns what was
/// applied, with secrets masked.
pub fn augment_provider_with_env_vars(
    provider: &mut LLMProvider,
    model: &mut LLMModel,
) -> Result<HashMap<String, String>, LLMError> {
    let mut applied = HashMap::new();

    if provider.provider_type == ProviderType::Gemini {
        if let Some(base_url) = non_empty_env("GEMINI_BASE_URL") {
            provider.base_url = base_url.clone();
            applied.insert("GEMINI_BASE_URL".to_string(), base_url);
        }
        for name in API_KEY_ENV_VARS {
            if let Some(api_key) = non_empty_env(name) {
                provider.api_key = api_key;
                applied.insert(name.to_string(), "******".to_string());
                break;
            }
        }
        if let Some(model_name) = non_empty_env("GEMINI_MODEL_NAME") {
            model.model = model_name.clone();
            applied.insert("GEMINI_MODEL_NAME".to_string(), model_name);
        }
        if let Some(max_context_size) = non_empty_env("GEMINI_MODEL_MAX_CONTEXT_SIZE") {
            model.max_context_size = parse_env_i64(&max_context_size)?;
            applied.insert("GEMINI_MODEL_MAX_CONTEXT_SIZE".to_string(), max_context_size);
        }
    }

    Ok(applied)
}

/// Build the chat provider for `provider`/`model`. `Ok(None)` means the pair
/// is not usable (no key or no model name).
pub async fn create_llm(provider: &LLMProvider, model: &LLMModel) -> Result<Option<LLM>, LLMError> {
    let chat_provider: Box<dyn ChatProvider> = match provider.provider_type {
        ProviderType::Gemini => {
            if provider.api_key.trim().is_empty() || model.model.trim().is_empty() {
                return Ok(None);
            }
            let headers = build_headers(provider.custom_headers.as_ref())?;
            let base_url = Some(provider.base_url.clone()).filter(|url| !url.is_empty());
            let mut gemini = Gemini::new(
                model.model.clone(),
                Some(provider.api_key.clone()),
                base_url,
                Some(headers),
            )
            .map_err(|err| LLMError::ChatProvider(err.to_string()))?;

            let generation_config = generation_config_from_env()?;
            if !generation_config.is_empty() {
                gemini = gemini.with_generation_config(generation_config);
            }
            Box::new(gemini)
        }
        ProviderType::Echo => Box::new(EchoChatProvider),
        ProviderType::ScriptedEcho => {
            let scripts = load_scripted_echo_scripts(provider.env.as_ref()).await?;
            Box::new(ScriptedEchoChatProvider::new(scripts))
        }
    };

    Ok(Some(LLM {
        chat_provider,
        max_context_size: model.max_context_size,
        model_config: Some(model.clone()),
        provider_config: Some(provider.clone()),
    }))
}

fn build_headers(custom: Option<&HashMap<String, String>>) -> Result<HeaderMap, LLMError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&user_agent()).map_err(|err| LLMError::ChatProvider(err.to_string()))?,
    );
    for (key, value) in custom.into_iter().flatten() {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Skipping invalid custom header: {key}"),
        }
    }
    Ok(headers)
}

fn generation_config_from_env() -> Result<Map<String, Value>, LLMError> {
    let mut config = Map::new();
    if let Some(value) = non_empty_env("GEMINI_MODEL_TEMPERATURE") {
        config.insert("temperature".to_string(), Value::from(parse_env_f64(&value)?));
    }
    if let Some(value) = non_empty_env("GEMINI_MODEL_TOP_P") {
        config.insert("topP".to_string(), Value::from(parse_env_f64(&value)?));
    }
    if let Some(value) = non_empty_env("GEMINI_MODEL_MAX_TOKENS") {
        config.insert("maxOutputTokens".to_string(), Value::from(parse_env_i64(&value)?));
    }
    Ok(config)
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse_env_i64(value: &str) -> Result<i64, LLMError> {
    value
        .parse::<i64>()
        .map_err(|_| LLMError::EnvVar(format!("invalid integer value: '{value}'")))
}

fn parse_env_f64(value: &str) -> Result<f64, LLMError> {
    value
        .parse::<f64>()
        .map_err(|_| LLMError::EnvVar(format!("invalid float value: '{value}'")))
}

/// Scripts come from a JSON array of strings or a text file split by `\n---\n`.
/// The path is taken from the provider's `env` table, then the process env.
async fn load_scripted_echo_scripts(
    provider_env: Option<&HashMap<String, String>>,
) -> Result<Vec<String>, LLMError> {
    let script_path = provider_env
        .and_then(|envs| envs.get(SCRIPTED_ECHO_SCRIPTS_ENV).cloned())
        .or_else(|| env::var(SCRIPTED_ECHO_SCRIPTS_ENV).ok())
        .ok_or_else(|| {
            LLMError::ScriptedEcho(format!(
                "{SCRIPTED_ECHO_SCRIPTS_ENV} is required for _scripted_echo."
            ))
        })?;
    let path = expand_user(&PathBuf::from(script_path));
    let text = tokio::fs::read_to_string(&path).await.map_err(|err| {
        LLMError::ScriptedEcho(format!(
            "Scripted echo file not readable: {}: {err}",
            path.display()
        ))
    })?;

    if let Ok(value) = serde_json::from_str::<Value>(&text) {
        return match value {
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()),
            _ => Err(LLMError::ScriptedEcho(
                "Scripted echo JSON must be an array of strings.".to_string(),
            )),
        };
    }

    let scripts: Vec<String> = text
        .split("\n---\n")
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(str::to_string)
        .collect();
    if scripts.is_empty() {
        return Err(LLMError::ScriptedEcho(
            "Scripted echo file must be a JSON array of strings or a text file split by '\\n---\\n'."
                .to_string(),
        ));
    }
    Ok(scripts)
}
