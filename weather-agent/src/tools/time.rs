use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use chrono_tz::{TZ_VARIANTS, Tz};
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use agentkit::tooling::{CallableTool2, ToolReturnValue};

use crate::tools::ToolReport;

static MARKS_AND_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{M}+|\p{P}+").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

type Now = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Resolves city names to IANA time zones and reads the local time there.
#[derive(Clone)]
pub struct WorldClock {
    now: Now,
}

impl Default for WorldClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Utc::now),
        }
    }

    /// A clock frozen at `instant`.
    pub fn fixed(instant: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(move || instant),
        }
    }

    pub fn zone_for(&self, city: &str) -> Option<Tz> {
        let normalized = normalize_city(city);
        if normalized.is_empty() {
            return None;
        }
        let suffix = format!("/{normalized}");
        TZ_VARIANTS
            .iter()
            .find(|tz| tz.name().to_lowercase().ends_with(&suffix))
            .copied()
    }

    pub fn current_time(&self, city: &str) -> ToolReport {
        match self.zone_for(city) {
            Some(tz) => {
                debug!(city, zone = tz.name(), "Resolved time zone");
                let local = (self.now)().with_timezone(&tz);
                ToolReport::success(format!(
                    "The current time in {city} is {}.",
                    local.format("%H:%M")
                ))
            }
            None => ToolReport::error(format!(
                "Sorry, I don't have timezone information for {city}."
            )),
        }
    }
}

/// Decompose, trim, lowercase, drop combining marks and punctuation, then
/// join words with `_` the way zone ids do.
pub fn normalize_city(city: &str) -> String {
    let decomposed: String = city.nfd().collect();
    let lowered = decomposed.trim().to_lowercase();
    let stripped = MARKS_AND_PUNCTUATION.replace_all(&lowered, "");
    WHITESPACE.replace_all(&stripped, "_").into_owned()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TimeParams {
    /// The name of the city for which to retrieve the current time.
    pub city: String,
}

pub struct GetCurrentTime {
    clock: WorldClock,
}

impl GetCurrentTime {
    pub fn new(clock: WorldClock) -> Self {
        Self { clock }
    }
}

#[async_trait::async_trait]
impl CallableTool2 for GetCurrentTime {
    type Params = TimeParams;

    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        include_str!("desc/get_current_time.md")
    }

    async fn call_typed(&self, params: Self::Params) -> ToolReturnValue {
        self.clock.current_time(&params.city).into_return_value()
    }
}
