use tokio::sync::mpsc;

use weather_agent::agent::router::{RouterTool, available_tools, extract_location, route};
use weather_agent::agent::{Agent, AgentEvent, KeywordRouter};
use weather_agent::config::AgentMode;

fn router() -> KeywordRouter {
    KeywordRouter::offline()
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    let lower = text.to_lowercase();
    needles.iter().any(|needle| lower.contains(needle))
}

#[tokio::test]
async fn test_weather_query_uses_weather_tool() {
    let response = router().process_query("What's the weather in London?").await;
    assert_eq!(
        response,
        "Weather in London: 23°C, Sunny, Humidity: 40%, Not raining"
    );
}

#[tokio::test]
async fn test_temperature_query_uses_temperature_tool() {
    let response = router().process_query("What's the temperature in Berlin?").await;
    assert_eq!(response, "The current temperature in Berlin is 17°C");
}

#[tokio::test]
async fn test_rain_query_uses_rain_tool() {
    let response = router().process_query("Is it raining in Sydney?").await;
    assert_eq!(response, "It is not raining in Sydney");
}

#[tokio::test]
async fn test_missing_location_asks_for_clarification() {
    let router = router();
    assert_eq!(
        router.process_query("What's the weather?").await,
        "I'd be happy to check the weather for you! Please specify which location you're interested in."
    );
    assert_eq!(
        router.process_query("What's the temperature?").await,
        "I can check the temperature for you! Please let me know which location you're interested in."
    );
    assert_eq!(
        router.process_query("Is it raining?").await,
        "I can check if it's raining for you! Please specify which location you'd like me to check."
    );
}

#[tokio::test]
async fn test_extracts_location_from_various_formats() {
    let router = router();
    let cases = [
        ("Weather in Madrid", "Madrid"),
        ("What's the weather for Rome?", "Rome"),
        ("Tell me the weather at Barcelona", "Barcelona"),
        ("Temperature in Vienna", "Vienna"),
        ("Is it raining in Dublin?", "Dublin"),
        (
            "Can you tell me about the current weather conditions in Berlin?",
            "Berlin",
        ),
    ];
    for (query, location) in cases {
        let response = router.process_query(query).await;
        assert!(response.contains(location), "{query} -> {response}");
    }
    assert!(!router.process_query("Weather Madrid please").await.is_empty());
}

#[tokio::test]
async fn test_complex_sentences() {
    let router = router();
    let cases = [
        (
            "Can you please tell me what the weather is like in Stockholm today?",
            "Stockholm",
        ),
        ("I would like to know the current temperature for Oslo", "Oslo"),
        (
            "Could you check if it's currently raining in Copenhagen?",
            "Copenhagen",
        ),
    ];
    for (query, location) in cases {
        let response = router.process_query(query).await;
        assert!(response.contains(location), "{query} -> {response}");
    }
}

#[tokio::test]
async fn test_common_words_are_not_locations() {
    let router = router();
    for query in ["What is the weather today?", "Does it rain now?"] {
        let response = router.process_query(query).await;
        assert!(
            contains_any(&response, &["specify", "location", "which", "where"]),
            "{query} -> {response}"
        );
    }
}

#[tokio::test]
async fn test_case_insensitive_queries() {
    let router = router();
    for query in ["WEATHER IN LONDON", "weather in london", "Weather In London"] {
        let response = router.process_query(query).await;
        assert!(response.to_lowercase().contains("london"), "{query}");
        assert!(response.contains("Humidity"), "{query}");
    }
}

#[tokio::test]
async fn test_weather_and_temperature_prefers_weather() {
    let router = router();
    let response = router
        .process_query("What's the weather and temperature in London?")
        .await;
    assert!(response.starts_with("Weather in London:"), "{response}");

    let weather = router.process_query("What's the weather in Paris?").await;
    let temperature = router.process_query("What's the temperature in Paris?").await;
    assert!(weather.contains("Humidity"));
    assert!(temperature.contains("temperature in Paris") && temperature.contains("°C"));
    assert_eq!(weather, router.process_query("What's the weather in Paris?").await);
}

#[tokio::test]
async fn test_chat_fallback_without_model() {
    let router = router();
    assert!(!router.chat().has_llm());

    let hello = router.process_query("Hello, how are you?").await;
    assert!(contains_any(&hello, &["hello", "weather", "assistant", "help"]));

    let help = router.process_query("How can you help me?").await;
    assert!(help.to_lowercase().contains("weather"));
    assert!(contains_any(&help, &["assistant", "help", "temperature", "rain"]));

    for query in ["", "   "] {
        assert!(!router.process_query(query).await.is_empty());
    }
}

#[test]
fn test_available_tools_text() {
    let text = available_tools();
    assert!(text.starts_with("Available tools:\n- get_weather: "));
    for tool in RouterTool::ALL {
        assert!(text.contains(tool.name()));
    }
    assert!(text.contains("Example queries:"));
    assert!(text.ends_with("- 'Is it raining in Tokyo?'"));
}

#[test]
fn test_route_and_extract() {
    assert_eq!(route("rain in Spain"), Some(RouterTool::CheckRain));
    assert_eq!(route("hi"), None);
    assert_eq!(extract_location("rain in Spain").as_deref(), Some("Spain"));
    assert_eq!(extract_location("How is it in it?"), None);
    assert_eq!(extract_location("weather for São Paulo").as_deref(), Some("São Paulo"));
}

#[tokio::test]
async fn test_router_agent_reports_tool_events() {
    let router = router();
    assert_eq!(router.mode(), AgentMode::Router);
    assert_eq!(router.model_name(), None);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let response = router
        .respond("Is it raining in Tokyo?", Some(&tx))
        .await
        .expect("router answers");
    assert_eq!(response, "It is currently raining in Tokyo");
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    let AgentEvent::ToolCall { id, name } = &events[0] else {
        panic!("expected tool call, got {:?}", events[0]);
    };
    assert_eq!(name, "check_rain");
    assert_eq!(
        events[1],
        AgentEvent::ToolResult {
            tool_call_id: id.clone(),
            name: "check_rain".to_string(),
            brief: "It is currently raining in Tokyo".to_string(),
            is_error: false,
        }
    );
}

#[tokio::test]
async fn test_unknown_location_placeholder_asks_for_clarification() {
    let router = router();
    for query in [
        "What's the weather in unknown location?",
        "What's the weather in Unknown Location?",
    ] {
        assert_eq!(
            router.process_query(query).await,
            "I'd be happy to check the weather for you! Please specify which location you're interested in.",
            "{query}"
        );
    }
    assert_eq!(
        RouterTool::CheckRain.run(&Default::default(), Some("unknown location")),
        RouterTool::CheckRain.clarification()
    );
}
