//! AMap live-weather source and renderer.
//!
//! AMap has no "since" filter: every poll returns the latest observation for
//! the city. The observation's report time doubles as its id, so the
//! notifier's cursor suppresses repeats until AMap publishes a new report.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use relay_core::config::{required, WeatherConfig};
use relay_core::{ConfigError, Cursor, Item, Renderer, Source, UpstreamError};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::http::HttpClient;
use crate::mastodon::parse_base_url;

/// AMap report times are China Standard Time.
const CST_OFFSET_SECS: i32 = 8 * 3600;
const REPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MISSING: &str = "?";

#[derive(Debug, Deserialize)]
struct LiveResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    infocode: String,
    #[serde(default)]
    lives: Vec<LiveObservation>,
}

/// One entry of `lives`. AMap sends every field as a string and uses `[]`
/// for fields it has no value for, so all of them are decoded leniently.
#[derive(Debug, Clone, Default, Deserialize)]
struct LiveObservation {
    #[serde(default, deserialize_with = "lenient_string")]
    city: String,
    #[serde(default, deserialize_with = "lenient_string")]
    weather: String,
    #[serde(default, deserialize_with = "lenient_string")]
    temperature: String,
    #[serde(default, deserialize_with = "lenient_string")]
    winddirection: String,
    #[serde(default, deserialize_with = "lenient_string")]
    windpower: String,
    #[serde(default, deserialize_with = "lenient_string")]
    humidity: String,
    #[serde(default, deserialize_with = "lenient_string")]
    reporttime: String,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// A single live observation for one city.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherReport {
    /// `reporttime` compacted to digits, e.g. `20240115180000`.
    pub id: String,
    pub reported_at: DateTime<Utc>,
    /// The report time as AMap printed it, in local time.
    pub report_time: String,
    pub city: String,
    pub weather: String,
    pub temperature: String,
    pub humidity: String,
    pub wind_direction: String,
    pub wind_power: String,
}

impl WeatherReport {
    fn from_observation(obs: LiveObservation) -> Result<Self, UpstreamError> {
        let reported_at = parse_report_time(&obs.reporttime)?;
        Ok(Self {
            id: obs.reporttime.chars().filter(char::is_ascii_digit).collect(),
            reported_at,
            report_time: obs.reporttime,
            city: obs.city,
            weather: obs.weather,
            temperature: obs.temperature,
            humidity: obs.humidity,
            wind_direction: obs.winddirection,
            wind_power: obs.windpower,
        })
    }
}

impl Item for WeatherReport {
    fn id(&self) -> &str {
        &self.id
    }

    fn recency(&self) -> DateTime<Utc> {
        self.reported_at
    }

    fn kind(&self) -> &str {
        "live"
    }
}

fn parse_report_time(raw: &str) -> Result<DateTime<Utc>, UpstreamError> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), REPORT_TIME_FORMAT)
        .map_err(|e| UpstreamError::Decode(format!("reporttime `{raw}`: {e}")))?;
    let cst = FixedOffset::east_opt(CST_OFFSET_SECS)
        .ok_or_else(|| UpstreamError::Decode("invalid CST offset".into()))?;
    cst.from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| UpstreamError::Decode(format!("reporttime `{raw}` is ambiguous")))
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct WeatherSource {
    client: HttpClient,
    endpoint: Url,
    api_key: String,
    city_code: String,
}

impl WeatherSource {
    pub fn new(
        client: HttpClient,
        api_base: &str,
        api_key: impl Into<String>,
        city_code: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let base = parse_base_url(api_base, "weather.api_base")?;
        let endpoint = base
            .join("v3/weather/weatherInfo")
            .map_err(|e| ConfigError::Invalid {
                key: "weather.api_base",
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            city_code: city_code.into(),
        })
    }

    pub fn from_config(client: HttpClient, config: &WeatherConfig) -> Result<Self, ConfigError> {
        let api_key = required(&config.api_key, "weather.api_key")?;
        let city = required(&config.city_code, "weather.city_code")?;
        Self::new(client, &config.api_base, api_key, city)
    }

    fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("city", &self.city_code)
            .append_pair("key", &self.api_key)
            .append_pair("extensions", "base");
        url
    }
}

#[async_trait]
impl Source for WeatherSource {
    type Item = WeatherReport;

    async fn fetch(&self, since: &Cursor) -> Result<Vec<WeatherReport>, UpstreamError> {
        let response = self
            .client
            .get(&self.request_url(), &[])
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        if !response.status.is_success() {
            return Err(UpstreamError::Status {
                status: response.status.as_u16(),
                body: response.snippet(),
            });
        }

        let live: LiveResponse = serde_json::from_slice(&response.body)
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        if live.status != "1" || live.infocode != "10000" {
            return Err(UpstreamError::Api(format!(
                "{} (infocode {})",
                live.info, live.infocode
            )));
        }
        if live.lives.is_empty() {
            return Err(UpstreamError::Api(format!(
                "no live observation for city {}",
                self.city_code
            )));
        }

        let mut reports = Vec::with_capacity(live.lives.len());
        for obs in live.lives {
            let report = WeatherReport::from_observation(obs)?;
            if since.precedes(&report.id) {
                reports.push(report);
            } else {
                debug!(id = %report.id, cursor = %since, "observation already delivered");
            }
        }
        Ok(reports)
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct WeatherRenderer;

fn or_missing(value: &str) -> &str {
    let value = value.trim();
    if value.is_empty() {
        MISSING
    } else {
        value
    }
}

impl Renderer<WeatherReport> for WeatherRenderer {
    fn render(&self, r: &WeatherReport) -> String {
        format!(
            "{}: {}, {}°C, humidity {}%, wind {} {} (reported {})",
            or_missing(&r.city),
            or_missing(&r.weather),
            or_missing(&r.temperature),
            or_missing(&r.humidity),
            or_missing(&r.wind_direction),
            or_missing(&r.wind_power),
            or_missing(&r.report_time),
        )
    }
}
