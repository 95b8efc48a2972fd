use std::sync::Arc;

use serde::{Deserialize, Serialize};

use agentkit::tooling::simple::SimpleToolset;
use agentkit::tooling::{CallableTool, ToolReturnValue, tool_ok};

use crate::utils::shorten_middle;

pub mod time;
pub mod weather;

pub use time::WorldClock;
pub use weather::WeatherStation;

/// Tools offered to the model in `llm` mode. The toolset lists them sorted
/// by name, whatever the order here.
pub const LLM_TOOL_NAMES: &[&str] = &[
    "get_current_time",
    "get_weather",
    "get_temperature",
    "check_rain",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

/// `{"status": ..., "report": ...}` payload every weather/time tool returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReport {
    pub status: ReportStatus,
    pub report: String,
}

impl ToolReport {
    pub fn success(report: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Success,
            report: report.into(),
        }
    }

    pub fn error(report: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Error,
            report: report.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }

    /// Error reports are still ordinary results: the model reads the status.
    pub fn into_return_value(self) -> ToolReturnValue {
        let brief = shorten_middle(&self.report, 80, true);
        let output = serde_json::to_string(&self).unwrap_or_else(|_| self.report.clone());
        tool_ok(output, "", &brief)
    }
}

pub struct ToolDeps {
    pub station: WeatherStation,
    pub clock: WorldClock,
}

impl ToolDeps {
    pub fn new(station: WeatherStation, clock: WorldClock) -> Self {
        Self { station, clock }
    }
}

impl Default for ToolDeps {
    fn default() -> Self {
        Self::new(WeatherStation::new(), WorldClock::new())
    }
}

pub fn load_tool(name: &str, deps: &ToolDeps) -> Option<Arc<dyn CallableTool>> {
    match name {
        "get_current_time" => Some(Arc::new(time::GetCurrentTime::new(deps.clock.clone()))),
        "get_weather" => Some(Arc::new(weather::GetWeather::new(deps.station))),
        "get_temperature" => Some(Arc::new(weather::GetTemperature::new(deps.station))),
        "check_rain" => Some(Arc::new(weather::CheckRain::new(deps.station))),
        _ => None,
    }
}

pub fn weather_toolset(deps: &ToolDeps) -> SimpleToolset {
    LLM_TOOL_NAMES
        .iter()
        .filter_map(|name| load_tool(name, deps))
        .fold(SimpleToolset::new(), |toolset, tool| toolset.with(tool))
}
