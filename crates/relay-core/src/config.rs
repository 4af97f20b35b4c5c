//! Configuration types for relay.
//!
//! [`Config::load`] layers, lowest priority first: the embedded defaults
//! below, an optional TOML file (`--config`, else
//! `$XDG_CONFIG_HOME/relay/config.toml` when present), the legacy variable
//! names of the old scripts (`MASTODON_TOKEN`, `QQ_ID`, ...), and finally
//! `RELAY_<SECTION>__<KEY>` environment variables.
//!
//! Numeric settings that do not parse fall back to their default with a
//! warning. Missing required settings are reported by [`required`] when a
//! mode starts, never papered over with a built-in identity.

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::render::BatchFormat;
use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_ATTEMPTS: u64 = 3;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;
pub const DEFAULT_CERT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_WHOIS_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PAGE_LIMIT: u64 = 40;
pub const DEFAULT_MAX_PAGES: u64 = 10;

const DEFAULT_CONFIG: &str = r#"
[notifier]
interval_secs = 300
state_file    = "state.json"

[http]
timeout_secs    = 10
max_attempts    = 3
backoff_base_ms = 500
backoff_max_ms  = 30000
retry_statuses  = [500, 502, 503, 504]
user_agent      = "relay/0.1"

[mastodon]
instance      = ""
token         = ""
exclude_types = ["follow", "follow_request"]
page_limit    = 40
max_pages     = 10
header        = "You have {count} new Mastodon notifications:"
footer        = "See all notifications: {instance}/notifications"

[weather]
api_base  = "https://restapi.amap.com"
api_key   = ""
city_code = "110101"
header    = "Weather update ({count}):"

[onebot]
endpoint     = ""
target       = ""
access_token = ""

[lookup]
bind                 = "0.0.0.0:5000"
cache_ttl_secs       = 86400
cert_timeout_secs    = 5
whois_timeout_secs   = 10
whois_server         = "whois.iana.org"
container_start_file = "/tmp/container_start_time"
"#;

/// Old script variable names and the setting each one feeds.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("MASTODON_INSTANCE", "mastodon.instance"),
    ("MASTODON_TOKEN", "mastodon.token"),
    ("QQ_API", "onebot.endpoint"),
    ("QQBOT_API_URL", "onebot.endpoint"),
    ("QQ_ID", "onebot.target"),
    ("QQ_USER_ID", "onebot.target"),
    ("CHECK_INTERVAL", "notifier.interval_secs"),
    ("STATE_FILE", "notifier.state_file"),
    ("GAODE_API_KEY", "weather.api_key"),
    ("CITY_CODE", "weather.city_code"),
];

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub mastodon: MastodonConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub onebot: OneBotConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
}

/// `[notifier]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifierConfig {
    #[serde(default, deserialize_with = "lenient_number")]
    pub interval_secs: Option<u64>,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_state_file() -> PathBuf { PathBuf::from("state.json") }

impl NotifierConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(positive(self.interval_secs, DEFAULT_INTERVAL_SECS))
    }
}

/// `[http]` section, shared by every outbound request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
    #[serde(default, deserialize_with = "lenient_number")]
    pub timeout_secs: Option<u64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub max_attempts: Option<u64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub backoff_base_ms: Option<u64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub backoff_max_ms: Option<u64>,
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_retry_statuses() -> Vec<u16> { vec![500, 502, 503, 504] }
fn default_user_agent() -> String { "relay/0.1".to_string() }

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(positive(self.timeout_secs, DEFAULT_TIMEOUT_SECS))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let max_attempts = positive(self.max_attempts, DEFAULT_MAX_ATTEMPTS);
        RetryPolicy {
            max_attempts: u32::try_from(max_attempts).unwrap_or(u32::MAX),
            base_delay: Duration::from_millis(
                self.backoff_base_ms.unwrap_or(DEFAULT_BACKOFF_BASE_MS),
            ),
            max_delay: Duration::from_millis(positive(self.backoff_max_ms, DEFAULT_BACKOFF_MAX_MS)),
            retry_statuses: self.retry_statuses.clone(),
        }
    }
}

/// `[mastodon]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MastodonConfig {
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub exclude_types: Vec<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub page_limit: Option<u64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub max_pages: Option<u64>,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub footer: String,
}

impl MastodonConfig {
    /// Notifications requested per page.
    pub fn page_limit(&self) -> usize {
        usize::try_from(positive(self.page_limit, DEFAULT_PAGE_LIMIT)).unwrap_or(usize::MAX)
    }

    /// Pages drained per cycle before the rest is left for the next one.
    pub fn max_pages(&self) -> usize {
        usize::try_from(positive(self.max_pages, DEFAULT_MAX_PAGES)).unwrap_or(usize::MAX)
    }

    /// Batch layout, with `{instance}` in the footer already substituted.
    pub fn batch_format(&self) -> BatchFormat {
        let instance = self.instance.trim_end_matches('/');
        BatchFormat::new(header_or_default(&self.header))
            .with_footer(self.footer.replace("{instance}", instance))
    }
}

/// `[weather]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherConfig {
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub city_code: String,
    #[serde(default)]
    pub header: String,
}

impl WeatherConfig {
    pub fn batch_format(&self) -> BatchFormat {
        BatchFormat::new(header_or_default(&self.header))
    }
}

/// `[onebot]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OneBotConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub access_token: String,
}

/// `[lookup]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub cache_ttl_secs: Option<u64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub cert_timeout_secs: Option<u64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub whois_timeout_secs: Option<u64>,
    #[serde(default = "default_whois_server")]
    pub whois_server: String,
    #[serde(default = "default_container_start_file")]
    pub container_start_file: PathBuf,
}

fn default_bind() -> String { "0.0.0.0:5000".to_string() }
fn default_whois_server() -> String { "whois.iana.org".to_string() }
fn default_container_start_file() -> PathBuf { PathBuf::from("/tmp/container_start_time") }

impl LookupConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS))
    }

    pub fn cert_timeout(&self) -> Duration {
        Duration::from_secs(positive(self.cert_timeout_secs, DEFAULT_CERT_TIMEOUT_SECS))
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_secs(positive(self.whois_timeout_secs, DEFAULT_WHOIS_TIMEOUT_SECS))
    }
}

impl Config {
    /// Load from the process environment, optionally with an explicit file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, std::env::vars().collect())
    }

    /// Load against an explicit variable set instead of the process environment.
    pub fn load_with_env(
        path: Option<&Path>,
        vars: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::from(config_path(&vars).as_path()).required(false),
        };

        let environment = config::Environment::with_prefix("RELAY")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(false)
            .list_separator(",")
            .with_list_parse_key("mastodon.exclude_types")
            .with_list_parse_key("http.retry_statuses")
            .source(Some(vars.clone().into_iter().collect()));

        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(file)
            .add_source(LegacyEnv { vars })
            .add_source(environment)
            .build()?
            .try_deserialize()
            .map_err(Into::into)
    }

    /// Return the built-in defaults without touching the filesystem or environment.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap_or_default()
    }
}

/// Return `value` trimmed, or [`ConfigError::Missing`] naming `key` when empty.
pub fn required<'a>(value: &'a str, key: &'static str) -> Result<&'a str, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ConfigError::Missing(key))
    } else {
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn positive(value: Option<u64>, default: u64) -> u64 {
    value.filter(|v| *v > 0).unwrap_or(default)
}

fn header_or_default(header: &str) -> String {
    if header.trim().is_empty() {
        BatchFormat::default().header
    } else {
        header.to_string()
    }
}

/// Accept a number or a numeric string; anything else becomes `None` so the
/// caller's default applies.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Float(f64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer) {
        Ok(Raw::Int(n)) => Some(n),
        Ok(Raw::Float(f)) if f.is_finite() && f >= 0.0 => Some(f as u64),
        Ok(Raw::Text(s)) => match s.trim().parse::<u64>() {
            Ok(n) => Some(n),
            Err(_) => {
                tracing::warn!(value = %s, "ignoring non-numeric setting; using default");
                None
            }
        },
        _ => {
            tracing::warn!("ignoring invalid numeric setting; using default");
            None
        }
    })
}

fn config_path(vars: &HashMap<String, String>) -> PathBuf {
    vars.get("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(vars.get("HOME").map(String::as_str).unwrap_or(".")).join(".config")
        })
        .join("relay")
        .join("config.toml")
}

/// Config source for the variable names the old scripts read.
#[derive(Debug, Clone)]
struct LegacyEnv {
    vars: HashMap<String, String>,
}

impl config::Source for LegacyEnv {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        let origin = "legacy environment".to_string();
        Ok(LEGACY_ENV
            .iter()
            .filter_map(|(var, key)| {
                let value = self.vars.get(*var).filter(|v| !v.trim().is_empty())?;
                Some((
                    key.to_string(),
                    config::Value::new(Some(&origin), value.as_str()),
                ))
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
