use std::collections::HashMap;
use std::sync::Mutex;

use agentkit::generate;
use agentkit::message::Message;
use weather_agent::config::{LLMModel, LLMProvider, ProviderType};
use weather_agent::llm::{
    SCRIPTED_ECHO_SCRIPTS_ENV, augment_provider_with_env_vars, create_llm, env_api_key,
    fallback_gemini,
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

struct EnvGuard {
    key: &'static str,
    prev: Option<String>,
}

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> Self {
        let prev = std::env::var(key).ok();
        // SAFETY: tests serialize env access via ENV_LOCK to avoid races.
        unsafe {
            std::env::set_var(key, value);
        }
        Self { key, prev }
    }

    fn unset(key: &'static str) -> Self {
        let prev = std::env::var(key).ok();
        // SAFETY: tests serialize env access via ENV_LOCK to avoid races.
        unsafe {
            std::env::remove_var(key);
        }
        Self { key, prev }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        if let Some(prev) = &self.prev {
            // SAFETY: tests serialize env access via ENV_LOCK to avoid races.
            unsafe {
                std::env::set_var(self.key, prev);
            }
        } else {
            // SAFETY: tests serialize env access via ENV_LOCK to avoid races.
            unsafe {
                std::env::remove_var(self.key);
            }
        }
    }
}

fn gemini_provider(api_key: &str) -> LLMProvider {
    LLMProvider {
        provider_type: ProviderType::Gemini,
        base_url: "https://original.test/v1beta".to_string(),
        api_key: api_key.to_string(),
        env: None,
        custom_headers: None,
    }
}

fn model(provider: &str, name: &str) -> LLMModel {
    LLMModel {
        provider: provider.to_string(),
        model: name.to_string(),
        max_context_size: 4096,
    }
}

#[test]
fn test_augment_provider_with_env_vars_gemini() {
    let _lock = ENV_LOCK.lock().unwrap();
    let _guards = vec![
        EnvGuard::set("GEMINI_BASE_URL", "https://env.test/v1beta"),
        EnvGuard::unset("GOOGLE_API_KEY"),
        EnvGuard::set("GOOGLE_AISTUDIO_API_KEY", "studio-key"),
        EnvGuard::set("GEMINI_MODEL_NAME", "gemini-env-model"),
        EnvGuard::set("GEMINI_MODEL_MAX_CONTEXT_SIZE", "8192"),
    ];

    let mut provider = gemini_provider("orig-key");
    let mut model = model("google", "gemini-base");
    let applied = augment_provider_with_env_vars(&mut provider, &mut model).expect("env overrides");

    assert_eq!(provider.base_url, "https://env.test/v1beta");
    assert_eq!(provider.api_key, "studio-key");
    assert_eq!(model.model, "gemini-env-model");
    assert_eq!(model.max_context_size, 8192);
    assert_eq!(
        applied.get("GOOGLE_AISTUDIO_API_KEY").map(String::as_str),
        Some("******")
    );
    assert_eq!(
        applied.get("GEMINI_MODEL_NAME").map(String::as_str),
        Some("gemini-env-model")
    );
}

#[test]
fn test_google_api_key_takes_precedence() {
    let _lock = ENV_LOCK.lock().unwrap();
    let _guards = vec![
        EnvGuard::set("GOOGLE_API_KEY", "primary"),
        EnvGuard::set("GOOGLE_AISTUDIO_API_KEY", "secondary"),
    ];
    assert_eq!(env_api_key().as_deref(), Some("primary"));

    let mut provider = gemini_provider("");
    let mut model = model("google", "gemini-base");
    augment_provider_with_env_vars(&mut provider, &mut model).expect("env overrides");
    assert_eq!(provider.api_key, "primary");
}

#[test]
fn test_blank_api_key_is_ignored() {
    let _lock = ENV_LOCK.lock().unwrap();
    let _guards = vec![
        EnvGuard::set("GOOGLE_API_KEY", "   "),
        EnvGuard::unset("GOOGLE_AISTUDIO_API_KEY"),
    ];
    assert_eq!(env_api_key(), None);
}

#[test]
fn test_echo_provider_ignores_gemini_env() {
    let _lock = ENV_LOCK.lock().unwrap();
    let _guard = EnvGuard::set("GEMINI_MODEL_NAME", "gemini-env-model");

    let mut provider = LLMProvider {
        provider_type: ProviderType::Echo,
        base_url: String::new(),
        api_key: String::new(),
        env: None,
        custom_headers: None,
    };
    let mut model = model("_echo", "echo");
    let applied = augment_provider_with_env_vars(&mut provider, &mut model).expect("env overrides");
    assert!(applied.is_empty());
    assert_eq!(model.model, "echo");
}

#[test]
fn test_augment_provider_with_env_vars_invalid_max_context_size() {
    let _lock = ENV_LOCK.lock().unwrap();
    let _guard = EnvGuard::set("GEMINI_MODEL_MAX_CONTEXT_SIZE", "not-a-number");

    let mut provider = gemini_provider("orig-key");
    let mut model = model("google", "gemini-base");
    let err = augment_provider_with_env_vars(&mut provider, &mut model)
        .expect_err("invalid max context size");
    assert!(err.to_string().contains("invalid integer value: 'not-a-number'"));
}

#[tokio::test]
async fn test_create_llm_gemini() {
    let _lock = ENV_LOCK.lock().unwrap();
    let _guards = vec![
        EnvGuard::set("GEMINI_MODEL_TEMPERATURE", "0.2"),
        EnvGuard::set("GEMINI_MODEL_TOP_P", "0.8"),
        EnvGuard::set("GEMINI_MODEL_MAX_TOKENS", "1234"),
    ];

    let llm = create_llm(&gemini_provider("test-key"), &model("google", "models/gemini-2.0-flash"))
        .await
        .expect("create llm")
        .expect("llm");
    assert_eq!(llm.provider_name(), "gemini");
    assert_eq!(llm.model_name(), "gemini-2.0-flash");
    assert_eq!(llm.max_context_size, 4096);
}

#[tokio::test]
async fn test_create_llm_invalid_temperature_env() {
    let _lock = ENV_LOCK.lock().unwrap();
    let _guard = EnvGuard::set("GEMINI_MODEL_TEMPERATURE", "warm");

    let err = match create_llm(&gemini_provider("test-key"), &model("google", "gemini-base")).await
    {
        Ok(_) => panic!("expected temperature parsing error"),
        Err(err) => err,
    };
    assert!(err.to_string().contains("invalid float value: 'warm'"));
}

#[tokio::test]
async fn test_create_llm_requires_api_key_for_gemini() {
    let llm = create_llm(&gemini_provider(""), &model("google", "gemini-base"))
        .await
        .expect("create llm");
    assert!(llm.is_none());

    let llm = create_llm(&gemini_provider("key"), &model("google", "  "))
        .await
        .expect("create llm");
    assert!(llm.is_none());
}

#[test]
fn test_fallback_gemini_defaults() {
    let (provider, model) = fallback_gemini();
    assert_eq!(provider.provider_type, ProviderType::Gemini);
    assert!(provider.api_key.is_empty());
    assert_eq!(model.model, "gemini-2.0-flash");
}

#[tokio::test]
async fn test_create_llm_echo_provider() {
    let provider = LLMProvider {
        provider_type: ProviderType::Echo,
        base_url: String::new(),
        api_key: String::new(),
        env: None,
        custom_headers: None,
    };
    let llm = create_llm(&provider, &model("_echo", "echo"))
        .await
        .expect("create llm")
        .expect("llm");

    assert_eq!(llm.provider_name(), "echo");
    assert_eq!(llm.max_context_size, 4096);
}

#[tokio::test]
async fn test_create_llm_scripted_echo_from_text_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scripts.txt");
    std::fs::write(&path, "text: first\n---\ntext: second\n").expect("write scripts");

    let provider = LLMProvider {
        provider_type: ProviderType::ScriptedEcho,
        base_url: String::new(),
        api_key: String::new(),
        env: Some(HashMap::from([(
            SCRIPTED_ECHO_SCRIPTS_ENV.to_string(),
            path.to_string_lossy().to_string(),
        )])),
        custom_headers: None,
    };
    let llm = create_llm(&provider, &model("_scripted_echo", "scripted"))
        .await
        .expect("create llm")
        .expect("llm");
    assert_eq!(llm.provider_name(), "scripted_echo");

    let history = [Message::user("ignored")];
    for expected in ["first", "second"] {
        let result = generate(llm.chat_provider.as_ref(), "", Vec::new(), &history, None, None)
            .await
            .expect("scripted turn");
        assert_eq!(result.message.extract_text(""), expected);
    }
}

#[tokio::test]
async fn test_create_llm_scripted_echo_rejects_non_string_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scripts.json");
    std::fs::write(&path, "[1, 2]").expect("write scripts");

    let provider = LLMProvider {
        provider_type: ProviderType::ScriptedEcho,
        base_url: String::new(),
        api_key: String::new(),
        env: Some(HashMap::from([(
            SCRIPTED_ECHO_SCRIPTS_ENV.to_string(),
            path.to_string_lossy().to_string(),
        )])),
        custom_headers: None,
    };
    let err = match create_llm(&provider, &model("_scripted_echo", "scripted")).await {
        Ok(_) => panic!("expected scripted echo error"),
        Err(err) => err,
    };
    assert!(err.to_string().contains("array of strings"));
}
