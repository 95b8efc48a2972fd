use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::{Agent, AgentEvent, KeywordRouter, LlmAgent, Session, run_agent};
use crate::chat::ChatFallback;
use crate::config::{AgentMode, Config, load_config};
use crate::exception::{ApiKeyMissing, ConfigError};
use crate::llm::{LLM, augment_provider_with_env_vars, create_llm, fallback_gemini};
use crate::tools::{ToolDeps, weather_toolset};

pub enum ConfigInput {
    Path(PathBuf),
    Inline(Config),
}

impl ConfigInput {
    async fn load(self) -> Result<Config, ConfigError> {
        match self {
            ConfigInput::Path(path) => load_config(Some(path.as_path())).await,
            ConfigInput::Inline(config) => Ok(config),
        }
    }
}

/// Options the CLI can override on top of the configuration.
#[derive(Clone, Debug, Default)]
pub struct AppOptions {
    pub model_name: Option<String>,
    pub mode: Option<AgentMode>,
    pub max_steps_per_turn: Option<i64>,
    pub max_retries_per_step: Option<i64>,
}

pub struct WeatherApp {
    agent: Arc<dyn Agent>,
    config: Config,
    llm: Option<Arc<LLM>>,
    env_overrides: HashMap<String, String>,
}

impl WeatherApp {
    pub async fn create(config: Option<ConfigInput>, options: AppOptions) -> anyhow::Result<Self> {
        let mut config = match config {
            Some(config) => config.load().await?,
            None => load_config(None).await?,
        };
        if let Some(max_steps) = options.max_steps_per_turn {
            config.loop_control.max_steps_per_turn = max_steps;
        }
        if let Some(max_retries) = options.max_retries_per_step {
            config.loop_control.max_retries_per_step = max_retries;
        }
        if let Some(mode) = options.mode {
            config.mode = mode;
        }
        info!(
            default_model = %config.default_model,
            mode = config.mode.as_str(),
            models = config.models.len(),
            providers = config.providers.len(),
            "Loaded config"
        );

        let model_name = options
            .model_name
            .as_deref()
            .or(Some(config.default_model.as_str()).filter(|name| !name.is_empty()));
        let configured = match model_name {
            Some(name) => {
                let model = config
                    .models
                    .get(name)
                    .ok_or_else(|| ConfigError::new(format!("Model {name} not found in config")))?;
                let provider = config.providers.get(&model.provider).ok_or_else(|| {
                    ConfigError::new(format!("Provider {} not found in config", model.provider))
                })?;
                Some((provider.clone(), model.clone()))
            }
            None => None,
        };
        let (mut provider, mut model) = configured.unwrap_or_else(fallback_gemini);

        info!(
            provider_type = ?provider.provider_type,
            base_url = %provider.base_url,
            "Using LLM provider"
        );
        let env_overrides = augment_provider_with_env_vars(&mut provider, &mut model)?;
        if !env_overrides.is_empty() {
            let mut applied: Vec<_> = env_overrides.keys().map(String::as_str).collect();
            applied.sort_unstable();
            info!("Applied environment overrides: {}", applied.join(", "));
        }
        info!(
            model = %model.model,
            max_context_size = model.max_context_size,
            "Using LLM model"
        );
        let llm = create_llm(&provider, &model).await?.map(Arc::new);

        let agent: Arc<dyn Agent> = match config.mode {
            AgentMode::Router => {
                let chat = ChatFallback::new(llm.clone());
                Arc::new(KeywordRouter::new(Default::default(), chat))
            }
            AgentMode::Llm => {
                if llm.is_none() {
                    return Err(anyhow::Error::new(ApiKeyMissing::new(
                        "llm mode needs a model: set GOOGLE_API_KEY or configure a provider.",
                    )));
                }
                let session = Session::create(&config.session.app_name, &config.session.user_id);
                let toolset = weather_toolset(&ToolDeps::default());
                Arc::new(LlmAgent::new(
                    llm.clone(),
                    toolset,
                    config.loop_control.clone(),
                    session,
                ))
            }
        };

        Ok(Self {
            agent,
            config,
            llm,
            env_overrides,
        })
    }

    pub fn agent(&self) -> Arc<dyn Agent> {
        Arc::clone(&self.agent)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Environment variables that overrode the provider, secrets masked.
    pub fn env_overrides(&self) -> &HashMap<String, String> {
        &self.env_overrides
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn run<F>(
        &self,
        query: &str,
        on_event: F,
        cancel_token: CancellationToken,
    ) -> anyhow::Result<String>
    where
        F: FnMut(AgentEvent) + Send + 'static,
    {
        run_agent(self.agent.as_ref(), query, on_event, cancel_token).await
    }
}
