use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use agentkit::chat_provider::echo::ScriptedEchoChatProvider;
use agentkit::chat_provider::{
    ChatProvider, ChatProviderError, ChatProviderErrorKind, PartsStreamedMessage, StreamedMessage,
};
use agentkit::message::{ContentPart, Message, Role, TextPart};
use agentkit::tooling::Tool;
use weather_agent::agent::{
    Agent, AgentEvent, LlmAgent, MaxStepsReached, RunCancelled, Session, run_agent,
};
use weather_agent::config::{AgentMode, LoopControl};
use weather_agent::llm::LLM;
use weather_agent::tools::{ToolDeps, WeatherStation, WorldClock, weather_toolset};

fn llm(chat_provider: Box<dyn ChatProvider>) -> Arc<LLM> {
    Arc::new(LLM {
        chat_provider,
        max_context_size: 1_048_576,
        model_config: None,
        provider_config: None,
    })
}

fn agent_with(chat_provider: Box<dyn ChatProvider>, loop_control: LoopControl) -> LlmAgent {
    let clock = WorldClock::fixed(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap());
    let toolset = weather_toolset(&ToolDeps::new(WeatherStation::new(), clock));
    LlmAgent::new(
        Some(llm(chat_provider)),
        toolset,
        loop_control,
        Session::create("weather_time_agent", "student"),
    )
}

fn scripted(scripts: &[&str]) -> Box<dyn ChatProvider> {
    Box::new(ScriptedEchoChatProvider::new(
        scripts.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
    ))
}

#[tokio::test]
async fn test_tool_call_then_answer() {
    let agent = agent_with(
        scripted(&[
            concat!(
                "usage: input_other=12 output=3\n",
                "tool_call: {\"id\": \"c1\", \"name\": \"get_weather\", \"arguments\": {\"city\": \"London\"}}\n",
                "tool_call: {\"id\": \"c2\", \"name\": \"get_current_time\", \"arguments\": {\"city\": \"Tokyo\"}}\n",
            ),
            "text: It is sunny in London and 21:00 in Tokyo.",
        ]),
        LoopControl::default(),
    );

    let response = agent
        .respond("Weather in London and time in Tokyo?", None)
        .await
        .expect("agent answers");
    assert_eq!(response, "It is sunny in London and 21:00 in Tokyo.");

    let context = agent.context().lock().await;
    let history = context.history();
    let roles: Vec<Role> = history.iter().map(|m| m.role.clone()).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
    );
    assert_eq!(history[2].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(
        history[2].extract_text(""),
        r#"{"status":"success","report":"Weather in London: 23°C, Sunny, Humidity: 40%, Not raining"}"#
    );
    assert_eq!(
        history[3].extract_text(""),
        r#"{"status":"success","report":"The current time in Tokyo is 21:00."}"#
    );
    assert_eq!(context.token_count(), 15);
}

#[tokio::test]
async fn test_history_carries_across_turns() {
    let agent = agent_with(
        scripted(&["text: Hello!", "text: Still here."]),
        LoopControl::default(),
    );
    assert_eq!(agent.respond("hi", None).await.expect("first"), "Hello!");
    assert_eq!(agent.respond("again", None).await.expect("second"), "Still here.");
    assert_eq!(agent.context().lock().await.history().len(), 4);
}

#[tokio::test]
async fn test_unknown_tool_is_reported_to_model() {
    let agent = agent_with(
        scripted(&[
            "tool_call: {\"id\": \"c1\", \"name\": \"get_forecast\", \"arguments\": \"{}\"}",
            "text: Sorry, I cannot forecast.",
        ]),
        LoopControl::default(),
    );
    let response = agent.respond("forecast?", None).await.expect("answer");
    assert_eq!(response, "Sorry, I cannot forecast.");

    let context = agent.context().lock().await;
    assert_eq!(
        context.history()[2].extract_text(""),
        "<system>ERROR: Tool `get_forecast` not found</system>"
    );
}

#[tokio::test]
async fn test_max_steps_reached() {
    let call = "tool_call: {\"id\": \"c1\", \"name\": \"get_weather\", \"arguments\": {\"city\": \"Oslo\"}}";
    let agent = agent_with(
        scripted(&[call, call, call]),
        LoopControl {
            max_steps_per_turn: 2,
            max_retries_per_step: 1,
        },
    );
    let err = agent.respond("loop", None).await.expect_err("too many steps");
    let max_steps = err.downcast_ref::<MaxStepsReached>().expect("max steps error");
    assert_eq!(max_steps.n_steps, 2);
}

/// Fails with `kind` for the first `failures` calls, then answers.
struct Flaky {
    failures: usize,
    kind: ChatProviderErrorKind,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ChatProvider for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn model_name(&self) -> &str {
        "flaky"
    }

    async fn generate(
        &self,
        _system_prompt: &str,
        _tools: &[Tool],
        _history: &[Message],
    ) -> Result<Box<dyn StreamedMessage>, ChatProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ChatProviderError::new(self.kind, "temporarily unavailable"));
        }
        let part = ContentPart::Text(TextPart::new("Recovered."));
        Ok(Box::new(PartsStreamedMessage::new(vec![part.into()], None, None)))
    }
}

#[tokio::test]
async fn test_retryable_errors_are_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = Flaky {
        failures: 1,
        kind: ChatProviderErrorKind::Status(503),
        calls: Arc::clone(&calls),
    };
    let agent = agent_with(Box::new(provider), LoopControl::default());

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let response = run_agent(
        &agent,
        "hello",
        move |event| sink.lock().unwrap().push(event),
        CancellationToken::new(),
    )
    .await
    .expect("recovers after retry");

    assert_eq!(response, "Recovered.");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let events = events.lock().unwrap();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, AgentEvent::Retry { attempt: 1, .. }))
    );
    assert!(events.contains(&AgentEvent::Text("Recovered.".to_string())));
}

#[tokio::test]
async fn test_non_retryable_errors_fail_fast() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = Flaky {
        failures: 5,
        kind: ChatProviderErrorKind::Status(400),
        calls: Arc::clone(&calls),
    };
    let agent = agent_with(Box::new(provider), LoopControl::default());

    let err = agent.respond("hello", None).await.expect_err("fails");
    let provider_err = err.downcast_ref::<ChatProviderError>().expect("provider error");
    assert_eq!(provider_err.kind, ChatProviderErrorKind::Status(400));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = Flaky {
        failures: 10,
        kind: ChatProviderErrorKind::Connection,
        calls: Arc::clone(&calls),
    };
    let agent = agent_with(
        Box::new(provider),
        LoopControl {
            max_steps_per_turn: 10,
            max_retries_per_step: 2,
        },
    );
    assert!(agent.respond("hello", None).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Never finishes generating.
struct Stalled;

#[async_trait]
impl ChatProvider for Stalled {
    fn name(&self) -> &str {
        "stalled"
    }

    fn model_name(&self) -> &str {
        "stalled"
    }

    async fn generate(
        &self,
        _system_prompt: &str,
        _tools: &[Tool],
        _history: &[Message],
    ) -> Result<Box<dyn StreamedMessage>, ChatProviderError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_cancel_in_flight_turn() {
    let agent = agent_with(Box::new(Stalled), LoopControl::default());
    let cancel_token = CancellationToken::new();
    let trigger = cancel_token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = run_agent(&agent, "hello", |_| {}, cancel_token)
        .await
        .expect_err("cancelled");
    assert!(err.is::<RunCancelled>());
}

#[tokio::test]
async fn test_agent_metadata() {
    let agent = agent_with(scripted(&[]), LoopControl::default());
    assert_eq!(agent.name(), "weather_time_agent");
    assert_eq!(agent.mode(), AgentMode::Llm);
    assert_eq!(agent.model_name(), Some("scripted_echo"));
    assert_eq!(agent.session().user_id, "student");

    let help = agent.available_tools();
    for name in ["get_current_time", "get_weather", "get_temperature", "check_rain"] {
        assert!(help.contains(&format!("- {name}: ")), "{help}");
    }
}

#[tokio::test]
async fn test_missing_llm_is_an_error() {
    let agent = LlmAgent::new(
        None,
        weather_toolset(&ToolDeps::default()),
        LoopControl::default(),
        Session::create("weather_time_agent", "student"),
    );
    let err = agent.respond("hi", None).await.expect_err("no llm");
    assert_eq!(err.to_string(), "LLM not set");
}
