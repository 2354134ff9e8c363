use crate::analyzer::sessions::Heartbeat;
use crate::config::Config;
use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum WakaError {
    #[error("WakaTime API key is missing. Set `wakareport config set wakatime.api_key <KEY>` or `WAKATIME_API_KEY`.")]
    MissingApiKey,
    #[error("failed to build WakaTime HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {endpoint} failed: {source}")]
    Fetch {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("WakaTime API error {status} at {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("malformed {what}: {detail}")]
    Parse { what: String, detail: String },
}

impl WakaError {
    pub fn parse(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StatsRange {
    #[value(name = "last-7-days")]
    Last7Days,
    #[value(name = "last-30-days")]
    Last30Days,
    #[value(name = "last-6-months")]
    Last6Months,
    LastYear,
    AllTime,
}

impl StatsRange {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Last7Days => "last_7_days",
            Self::Last30Days => "last_30_days",
            Self::Last6Months => "last_6_months",
            Self::LastYear => "last_year",
            Self::AllTime => "all_time",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Last7Days => "Last 7 Days",
            Self::Last30Days => "Last 30 Days",
            Self::Last6Months => "Last 6 Months",
            Self::LastYear => "Last Year",
            Self::AllTime => "All Time",
        }
    }
}

/// Read side of the tracking API. Aggregates are handed back as raw JSON and
/// parsed by whichever report section consumes them.
pub trait ActivitySource {
    fn heartbeats(&self, date: NaiveDate) -> Result<Vec<Heartbeat>, WakaError>;
    fn today_status(&self) -> Result<Value, WakaError>;
    fn summaries(&self, start: NaiveDate, end: NaiveDate) -> Result<Value, WakaError>;
    fn stats(&self, range: StatsRange) -> Result<Value, WakaError>;
    fn all_time_since_today(&self) -> Result<Value, WakaError>;
}

#[derive(Debug, Deserialize)]
struct HeartbeatsResponse {
    #[serde(default)]
    data: Vec<Heartbeat>,
}

pub struct WakaTimeClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl WakaTimeClient {
    pub fn from_config(config: &Config) -> Result<Self, WakaError> {
        let api_key = config
            .wakatime_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(WakaError::MissingApiKey)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .default_headers(headers)
            .build()
            .map_err(WakaError::Client)?;

        Ok(Self {
            client,
            base_url: config.wakatime_base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, WakaError> {
        let endpoint = format!("{}/{}", self.base_url, path);

        // Basic auth with the key as user is what WakaTime expects
        let response = self
            .client
            .get(&endpoint)
            .basic_auth(&self.api_key, None::<&str>)
            .query(query)
            .send()
            .map_err(|source| WakaError::Fetch {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(WakaError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        response.json::<Value>().map_err(|source| WakaError::Fetch {
            endpoint: endpoint.clone(),
            source,
        })
    }
}

impl ActivitySource for WakaTimeClient {
    fn heartbeats(&self, date: NaiveDate) -> Result<Vec<Heartbeat>, WakaError> {
        let body = self.get(
            "users/current/heartbeats",
            &[("date", date.format("%Y-%m-%d").to_string())],
        )?;

        let parsed: HeartbeatsResponse = serde_json::from_value(body)
            .map_err(|error| WakaError::parse("heartbeats response", error.to_string()))?;
        info!(date = %date, count = parsed.data.len(), "heartbeats fetched");

        Ok(parsed.data)
    }

    fn today_status(&self) -> Result<Value, WakaError> {
        self.get("users/current/status_bar/today", &[])
    }

    fn summaries(&self, start: NaiveDate, end: NaiveDate) -> Result<Value, WakaError> {
        self.get(
            "users/current/summaries",
            &[
                ("start", start.format("%Y-%m-%d").to_string()),
                ("end", end.format("%Y-%m-%d").to_string()),
            ],
        )
    }

    fn stats(&self, range: StatsRange) -> Result<Value, WakaError> {
        self.get(&format!("users/current/stats/{}", range.as_str()), &[])
    }

    fn all_time_since_today(&self) -> Result<Value, WakaError> {
        self.get("users/current/all_time_since_today", &[])
    }
}

/// Reads an hours value that the API may send either as a JSON number or as a
/// numeric string (`grand_total.decimal` is `"2.50"`).
pub fn decimal_hours(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|hours| hours.is_finite())
}

/// Hours from a WakaTime duration text such as `"1 hr 30 mins"` or `"45 secs"`.
pub fn text_hours(text: &str) -> Option<f64> {
    let words = text.split_whitespace().collect::<Vec<_>>();
    if words.is_empty() {
        return None;
    }

    words.chunks(2).try_fold(0.0, |total, pair| {
        let [amount, unit] = pair else {
            return None;
        };
        let amount = amount.parse::<f64>().ok()?;
        let per_hour = if unit.starts_with("hr") {
            1.0
        } else if unit.starts_with("min") {
            60.0
        } else if unit.starts_with("sec") {
            3600.0
        } else {
            return None;
        };

        Some(total + amount / per_hour)
    })
}

/// `grand_total.decimal` of an aggregate object.
pub fn grand_total_hours(value: &Value) -> Option<f64> {
    value
        .get("grand_total")
        .and_then(|total| total.get("decimal"))
        .and_then(decimal_hours)
}

#[cfg(test)]
mod tests {
    use super::{StatsRange, decimal_hours, grand_total_hours, text_hours};
    use serde_json::json;

    #[test]
    fn decimal_accepts_numbers_and_strings() {
        assert_eq!(decimal_hours(&json!(2.5)), Some(2.5));
        assert_eq!(decimal_hours(&json!("3.25")), Some(3.25));
        assert_eq!(decimal_hours(&json!("n/a")), None);
        assert_eq!(decimal_hours(&json!(null)), None);
    }

    #[test]
    fn grand_total_reads_nested_decimal() {
        let day = json!({"grand_total": {"decimal": "1.75", "text": "1 hr 45 mins"}});

        assert_eq!(grand_total_hours(&day), Some(1.75));
        assert_eq!(grand_total_hours(&json!({"grand_total": {}})), None);
    }

    #[test]
    fn duration_text_converts_to_hours() {
        assert_eq!(text_hours("5 hrs"), Some(5.0));
        assert_eq!(text_hours("1 hr 30 mins"), Some(1.5));
        assert_eq!(text_hours("0 secs"), Some(0.0));
        assert_eq!(text_hours("5 hrs 30"), None);
        assert_eq!(text_hours("lots"), None);
        assert_eq!(text_hours(""), None);
    }

    #[test]
    fn stats_range_path_segments() {
        assert_eq!(StatsRange::Last7Days.as_str(), "last_7_days");
        assert_eq!(StatsRange::AllTime.as_str(), "all_time");
    }
}
