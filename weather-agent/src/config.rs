use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constant::{DEFAULT_APP_NAME, DEFAULT_USER_ID};
use crate::exception::ConfigError;
use crate::share::{ensure_share_dir, get_share_dir};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Gemini,
    #[serde(rename = "_echo")]
    Echo,
    #[serde(rename = "_scripted_echo")]
    ScriptedEcho,
}

/// How queries are answered: keyword routing to local tools, or a
/// function-calling model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    #[default]
    Router,
    Llm,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Router => "router",
            AgentMode::Llm => "llm",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LLMProvider {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_headers: Option<HashMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LLMModel {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_max_context_size")]
    pub max_context_size: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopControl {
    #[serde(default = "default_max_steps_per_turn", alias = "max_steps_per_run")]
    pub max_steps_per_turn: i64,
    #[serde(default = "default_max_retries_per_step")]
    pub max_retries_per_step: i64,
}

impl Default for LoopControl {
    fn default() -> Self {
        Self {
            max_steps_per_turn: default_max_steps_per_turn(),
            max_retries_per_step: default_max_retries_per_step(),
        }
    }
}

impl LoopControl {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps_per_turn < 1 {
            return Err(ConfigError::new("max_steps_per_turn must be >= 1"));
        }
        if self.max_retries_per_step < 1 {
            return Err(ConfigError::new("max_retries_per_step must be >= 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            user_id: default_user_id(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub is_from_default_location: bool,
    #[serde(default)]
    pub default_model: String,
    #[serde(default)]
    pub mode: AgentMode,
    #[serde(default)]
    pub models: HashMap<String, LLMModel>,
    #[serde(default)]
    pub providers: HashMap<String, LLMProvider>,
    #[serde(default)]
    pub loop_control: LoopControl,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.loop_control.validate()?;
        if !self.default_model.is_empty() && !self.models.contains_key(&self.default_model) {
            return Err(ConfigError::new(format!(
                "Default model {} not found in models",
                self.default_model
            )));
        }
        for model in self.models.values() {
            if !self.providers.contains_key(&model.provider) {
                return Err(ConfigError::new(format!(
                    "Provider {} not found in providers",
                    model.provider
                )));
            }
        }
        if self.session.user_id.trim().is_empty() {
            return Err(ConfigError::new("session.user_id cannot be empty"));
        }
        Ok(())
    }
}

pub fn get_config_file() -> PathBuf {
    get_share_dir().join("config.toml")
}

pub fn get_default_config() -> Config {
    Config {
        is_from_default_location: false,
        default_model: String::new(),
        mode: AgentMode::default(),
        models: HashMap::new(),
        providers: HashMap::new(),
        loop_control: LoopControl::default(),
        session: SessionConfig::default(),
    }
}

/// Load `config_file`, or `<share dir>/config.toml` when `None`. A missing file
/// is created with the defaults.
pub async fn load_config(config_file: Option<&Path>) -> Result<Config, ConfigError> {
    ensure_share_dir()
        .await
        .map_err(|err| ConfigError::new(format!("Failed to create share dir: {err}")))?;
    let default_config_file = get_config_file();
    let config_file = config_file.unwrap_or(default_config_file.as_path());
    let is_default_config_file =
        normalize_path(config_file).await == normalize_path(&default_config_file).await;
    debug!("Loading config from file: {}", config_file.display());

    if !path_exists(config_file).await {
        let mut config = get_default_config();
        debug!("No config file found, creating default config: {:?}", config);
        save_config(&config, Some(config_file)).await?;
        config.is_from_default_location = is_default_config_file;
        return Ok(config);
    }

    let config_text = tokio::fs::read_to_string(config_file)
        .await
        .map_err(|err| ConfigError::new(format!("Failed to read config file: {err}")))?;

    let mut config: Config = if is_json_file(config_file) {
        serde_json::from_str::<Config>(&config_text)
            .map_err(|err| ConfigError::new(format!("Invalid JSON in configuration file: {err}")))?
    } else {
        toml::from_str::<Config>(&config_text)
            .map_err(|err| ConfigError::new(format!("Invalid TOML in configuration file: {err}")))?
    };

    config.is_from_default_location = is_default_config_file;
    config
        .validate()
        .map_err(|err| ConfigError::new(format!("Invalid configuration file: {err}")))?;
    Ok(config)
}

/// Parse inline configuration text, trying JSON first and then TOML.
pub fn load_config_from_string(config_string: &str) -> Result<Config, ConfigError> {
    if config_string.trim().is_empty() {
        return Err(ConfigError::new("Configuration text cannot be empty"));
    }

    let json_error = match serde_json::from_str::<serde_json::Value>(config_string) {
        Ok(value) => {
            let config: Config = serde_json::from_value(value)
                .map_err(|err| ConfigError::new(format!("Invalid configuration text: {err}")))?;
            return finish_inline(config);
        }
        Err(err) => err.to_string(),
    };

    match toml::from_str::<Config>(config_string) {
        Ok(config) => finish_inline(config),
        Err(toml_error) => Err(ConfigError::new(format!(
            "Invalid configuration text: {json_error}; {toml_error}"
        ))),
    }
}

fn finish_inline(mut config: Config) -> Result<Config, ConfigError> {
    config.is_from_default_location = false;
    config
        .validate()
        .map_err(|err| ConfigError::new(format!("Invalid configuration text: {err}")))?;
    Ok(config)
}

pub async fn save_config(config: &Config, config_file: Option<&Path>) -> Result<(), ConfigError> {
    let config_file = config_file
        .map(PathBuf::from)
        .unwrap_or_else(get_config_file);
    debug!("Saving config to file: {}", config_file.display());
    if let Some(parent) = config_file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| ConfigError::new(format!("Failed to create config dir: {err}")))?;
    }

    let contents = if is_json_file(&config_file) {
        serde_json::to_string_pretty(config)
            .map_err(|err| ConfigError::new(format!("Failed to serialize config: {err}")))?
    } else {
        toml::to_string_pretty(config)
            .map_err(|err| ConfigError::new(format!("Failed to serialize config: {err}")))?
    };

    tokio::fs::write(&config_file, contents)
        .await
        .map_err(|err| ConfigError::new(format!("Failed to write config file: {err}")))?;
    Ok(())
}

fn is_json_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.eq_ignore_ascii_case("json"))
}

async fn normalize_path(path: &Path) -> PathBuf {
    let expanded = expand_user(path);
    tokio::fs::canonicalize(&expanded).await.unwrap_or(expanded)
}

pub(crate) fn expand_user(path: &Path) -> PathBuf {
    let Some(home) = dirs::home_dir() else {
        return path.to_path_buf();
    };
    let path_str = path.to_string_lossy();
    if path_str == "~" {
        return home;
    }
    if let Some(stripped) = path_str.strip_prefix("~/") {
        return home.join(stripped);
    }
    path.to_path_buf()
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

fn default_max_steps_per_turn() -> i64 {
    100
}

fn default_max_retries_per_step() -> i64 {
    3
}

fn default_max_context_size() -> i64 {
    1_048_576
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}
