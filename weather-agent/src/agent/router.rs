use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::agent::{Agent, AgentEvent, EventSender, emit};
use crate::chat::ChatFallback;
use crate::config::AgentMode;
use crate::tools::WeatherStation;
use crate::tools::weather::UNKNOWN_LOCATION;
use crate::utils::shorten_middle;

pub const APOLOGY: &str =
    "I apologize, but I encountered an error while processing your request. Please try again.";

const ROUTER_NAME: &str = "weather_agent";

const COMMON_WORDS: &[&str] = &[
    "the", "is", "it", "today", "now", "current", "like", "does", "will", "are", "and", "or",
];

static LOCATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)weather\s+in\s+(\w+(?:\s+\w+)?)",
        r"(?i)temperature\s+in\s+(\w+(?:\s+\w+)?)",
        r"(?i)raining\s+in\s+(\w+(?:\s+\w+)?)",
        r"(?i)rain\s+in\s+(\w+(?:\s+\w+)?)",
        r"(?i)\b(?:weather|temperature|rain)\s+(?:for|at)\s+(\w+(?:\s+\w+)?)",
        r"(?i)\bin\s+(\w+(?:\s+\w+)?)\s*\?*$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid location pattern"))
    .collect()
});

/// The tools the keyword router can dispatch to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouterTool {
    GetWeather,
    GetTemperature,
    CheckRain,
}

impl RouterTool {
    pub const ALL: [RouterTool; 3] = [
        RouterTool::GetWeather,
        RouterTool::GetTemperature,
        RouterTool::CheckRain,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RouterTool::GetWeather => "get_weather",
            RouterTool::GetTemperature => "get_temperature",
            RouterTool::CheckRain => "check_rain",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RouterTool::GetWeather => "Get comprehensive weather information for a location",
            RouterTool::GetTemperature => "Get current temperature for a location",
            RouterTool::CheckRain => "Check if it's currently raining in a location",
        }
    }

    pub fn clarification(&self) -> &'static str {
        match self {
            RouterTool::GetWeather => {
                "I'd be happy to check the weather for you! Please specify which location you're interested in."
            }
            RouterTool::GetTemperature => {
                "I can check the temperature for you! Please let me know which location you're interested in."
            }
            RouterTool::CheckRain => {
                "I can check if it's raining for you! Please specify which location you'd like me to check."
            }
        }
    }

    /// Run the tool, asking for a location when none was found. The
    /// placeholder `unknown location` counts as none.
    pub fn run(&self, station: &WeatherStation, location: Option<&str>) -> String {
        let location = location.filter(|loc| !loc.trim().eq_ignore_ascii_case(UNKNOWN_LOCATION));
        let Some(location) = location else {
            return self.clarification().to_string();
        };
        match self {
            RouterTool::GetWeather => station.weather(Some(location)),
            RouterTool::GetTemperature => station.temperature(Some(location)),
            RouterTool::CheckRain => station.rain(Some(location)),
        }
    }
}

/// Pick a tool from keywords in `query`. `None` means free-form chat.
pub fn route(query: &str) -> Option<RouterTool> {
    let lower = query.to_lowercase();
    let weather = lower.contains("weather");
    let temperature = lower.contains("temperature");
    let rain = lower.contains("rain");

    if weather && temperature {
        Some(RouterTool::GetWeather)
    } else if weather && !rain {
        Some(RouterTool::GetWeather)
    } else if temperature && !weather {
        Some(RouterTool::GetTemperature)
    } else if rain {
        Some(RouterTool::CheckRain)
    } else {
        None
    }
}

/// First plausible one- or two-word location in `query`.
pub fn extract_location(query: &str) -> Option<String> {
    for pattern in LOCATION_PATTERNS.iter() {
        let Some(captures) = pattern.captures(query) else {
            continue;
        };
        let Some(candidate) = captures.get(1) else {
            continue;
        };
        let location = candidate.as_str().trim();
        if is_plausible_location(location) {
            return Some(location.to_string());
        }
    }
    None
}

fn is_plausible_location(candidate: &str) -> bool {
    let lower = candidate.to_lowercase();
    !COMMON_WORDS.contains(&lower.as_str()) && candidate.chars().count() > 2
}

/// Answers queries by keyword routing to the local weather tools. Anything
/// no tool handles goes to the chat fallback.
#[derive(Clone, Default)]
pub struct KeywordRouter {
    station: WeatherStation,
    chat: ChatFallback,
}

impl KeywordRouter {
    pub fn new(station: WeatherStation, chat: ChatFallback) -> Self {
        Self { station, chat }
    }

    pub fn offline() -> Self {
        Self::new(WeatherStation::new(), ChatFallback::offline())
    }

    pub fn chat(&self) -> &ChatFallback {
        &self.chat
    }

    pub async fn process_query(&self, query: &str) -> String {
        self.process(query, None).await
    }

    async fn process(&self, query: &str, events: Option<&EventSender>) -> String {
        info!("Processing query: {query}");
        let Some(tool) = route(query) else {
            debug!("No tool matched, using chat fallback");
            return self.chat.send_message(query).await;
        };

        let location = extract_location(query);
        debug!(tool = tool.name(), location = ?location, "Routing query");
        let call_id = format!("call_{}", Uuid::new_v4().simple());
        emit(
            events,
            AgentEvent::ToolCall {
                id: call_id.clone(),
                name: tool.name().to_string(),
            },
        );

        let station = self.station;
        let outcome = catch_unwind(AssertUnwindSafe(|| tool.run(&station, location.as_deref())));
        let (reply, is_error) = match outcome {
            Ok(reply) => (reply, false),
            Err(_) => {
                error!("Tool {} failed while processing: {query}", tool.name());
                (APOLOGY.to_string(), true)
            }
        };
        emit(
            events,
            AgentEvent::ToolResult {
                tool_call_id: call_id,
                name: tool.name().to_string(),
                brief: shorten_middle(&reply, 80, true),
                is_error,
            },
        );
        reply
    }
}

/// Help text for the keyword router.
pub fn available_tools() -> String {
    let mut text = String::from("Available tools:\n");
    for tool in RouterTool::ALL {
        text.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
    }
    text.push_str("\nExample queries:\n");
    text.push_str("- 'What's the weather in London?'\n");
    text.push_str("- 'What's the temperature in New York?'\n");
    text.push_str("- 'Is it raining in Tokyo?'");
    text
}

#[async_trait]
impl Agent for KeywordRouter {
    fn name(&self) -> &str {
        ROUTER_NAME
    }

    fn mode(&self) -> AgentMode {
        AgentMode::Router
    }

    fn model_name(&self) -> Option<&str> {
        None
    }

    fn available_tools(&self) -> String {
        available_tools()
    }

    async fn respond(&self, query: &str, events: Option<&EventSender>) -> anyhow::Result<String> {
        Ok(self.process(query, events).await)
    }
}
