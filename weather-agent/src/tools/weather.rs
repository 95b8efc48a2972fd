use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use agentkit::tooling::{CallableTool2, ToolReturnValue};

use crate::tools::ToolReport;

pub const UNKNOWN_LOCATION: &str = "Unknown Location";

const DEFAULT_TEMPERATURE: i32 = 20;
const DEFAULT_HUMIDITY: i32 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    Sunny,
    Cloudy,
    #[serde(rename = "Partly Cloudy")]
    PartlyCloudy,
    Overcast,
}

impl Condition {
    const ALL: [Condition; 4] = [
        Condition::Sunny,
        Condition::Cloudy,
        Condition::PartlyCloudy,
        Condition::Overcast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Sunny => "Sunny",
            Condition::Cloudy => "Cloudy",
            Condition::PartlyCloudy => "Partly Cloudy",
            Condition::Overcast => "Overcast",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    pub temperature: i32,
    pub condition: Condition,
    pub humidity: i32,
    pub raining: bool,
}

/// Simulated weather source. Readings are derived from a hash of the location
/// name, so the same name always yields the same weather.
#[derive(Clone, Copy, Debug, Default)]
pub struct WeatherStation;

impl WeatherStation {
    pub fn new() -> Self {
        Self
    }

    pub fn report(&self, location: Option<&str>) -> WeatherReport {
        let location = location.filter(|loc| !loc.trim().is_empty());
        let Some(name) = location else {
            return WeatherReport {
                location: UNKNOWN_LOCATION.to_string(),
                temperature: DEFAULT_TEMPERATURE,
                condition: Condition::Cloudy,
                humidity: DEFAULT_HUMIDITY,
                raining: false,
            };
        };
        let hash = location_hash(name);
        WeatherReport {
            location: name.to_string(),
            temperature: 15 + (hash % 16).abs(),
            condition: Condition::ALL[(hash % 4).unsigned_abs() as usize],
            humidity: 40 + (hash % 41).abs(),
            raining: hash % 3 == 0,
        }
    }

    pub fn weather(&self, location: Option<&str>) -> String {
        info!("Getting weather for location: {:?}", location);
        let report = self.report(location);
        format!(
            "Weather in {}: {}°C, {}, Humidity: {}%, {}",
            report.location,
            report.temperature,
            report.condition,
            report.humidity,
            if report.raining { "Raining" } else { "Not raining" }
        )
    }

    pub fn temperature(&self, location: Option<&str>) -> String {
        info!("Getting temperature for location: {:?}", location);
        let report = self.report(location);
        format!(
            "The current temperature in {} is {}°C",
            report.location, report.temperature
        )
    }

    pub fn rain(&self, location: Option<&str>) -> String {
        info!("Checking rain status for location: {:?}", location);
        let report = self.report(location);
        format!(
            "It is {} raining in {}",
            if report.raining { "currently" } else { "not" },
            report.location
        )
    }
}

/// 32-bit polynomial string hash over UTF-16 code units (`h = 31 * h + unit`),
/// wrapping on overflow.
pub fn location_hash(location: &str) -> i32 {
    location
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CityParams {
    /// The name of the city for which to retrieve the report.
    pub city: String,
}

fn blank_city() -> ToolReturnValue {
    ToolReport::error("Please specify a city.").into_return_value()
}

pub struct GetWeather {
    station: WeatherStation,
}

impl GetWeather {
    pub fn new(station: WeatherStation) -> Self {
        Self { station }
    }
}

#[async_trait::async_trait]
impl CallableTool2 for GetWeather {
    type Params = CityParams;

    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        include_str!("desc/get_weather.md")
    }

    async fn call_typed(&self, params: Self::Params) -> ToolReturnValue {
        if params.city.trim().is_empty() {
            return blank_city();
        }
        ToolReport::success(self.station.weather(Some(params.city.trim()))).into_return_value()
    }
}

pub struct GetTemperature {
    station: WeatherStation,
}

impl GetTemperature {
    pub fn new(station: WeatherStation) -> Self {
        Self { station }
    }
}

#[async_trait::async_trait]
impl CallableTool2 for GetTemperature {
    type Params = CityParams;

    fn name(&self) -> &str {
        "get_temperature"
    }

    fn description(&self) -> &str {
        include_str!("desc/get_temperature.md")
    }

    async fn call_typed(&self, params: Self::Params) -> ToolReturnValue {
        if params.city.trim().is_empty() {
            return blank_city();
        }
        ToolReport::success(self.station.temperature(Some(params.city.trim())))
            .into_return_value()
    }
}

pub struct CheckRain {
    station: WeatherStation,
}

impl CheckRain {
    pub fn new(station: WeatherStation) -> Self {
        Self { station }
    }
}

#[async_trait::async_trait]
impl CallableTool2 for CheckRain {
    type Params = CityParams;

    fn name(&self) -> &str {
        "check_rain"
    }

    fn description(&self) -> &str {
        include_str!("desc/check_rain.md")
    }

    async fn call_typed(&self, params: Self::Params) -> ToolReturnValue {
        if params.city.trim().is_empty() {
            return blank_city();
        }
        ToolReport::success(self.station.rain(Some(params.city.trim()))).into_return_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_reference_values() {
        assert_eq!(location_hash(""), 0);
        assert_eq!(location_hash("London"), -2013264328);
        assert_eq!(location_hash("Tokyo"), 80989254);
        assert_eq!(location_hash("Zürich"), -1482116162);
    }

    #[test]
    fn negative_hashes_stay_in_range() {
        let report = WeatherStation::new().report(Some("London"));
        assert_eq!(report.temperature, 23);
        assert_eq!(report.condition, Condition::Sunny);
        assert_eq!(report.humidity, 40);
        assert!(!report.raining);
    }
}
