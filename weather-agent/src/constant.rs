pub const NAME: &str = "Weather Agent";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_APP_NAME: &str = "weather_time_agent";
pub const DEFAULT_USER_ID: &str = "student";

pub fn user_agent() -> String {
    format!("WeatherAgent/{}", VERSION)
}
