//! WHOIS over TCP port 43.
//!
//! The referral server (IANA by default) names the registry for the TLD in a
//! `refer:` line; the registry's answer is then scanned for the usual
//! registration fields. Both gTLD (`Registry Expiry Date`) and CNNIC
//! (`Expiration Time`) spellings are recognised.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::LookupError;

pub const WHOIS_PORT: u16 = 43;
/// Upper bound on a single response; real ones are a few KiB.
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

static REFER: LazyLock<Regex> = LazyLock::new(|| field(r"refer|whois"));
static REGISTRAR: LazyLock<Regex> =
    LazyLock::new(|| field(r"registrar|sponsoring registrar|registrar name"));
static CREATED: LazyLock<Regex> = LazyLock::new(|| {
    field(r"creation date|created on|created|registration time|registered on|registered")
});
static EXPIRES: LazyLock<Regex> = LazyLock::new(|| {
    field(
        r"registry expiry date|registrar registration expiration date|expiration date|expiration time|expiry date|expires on|expires|paid-till",
    )
});
static UPDATED: LazyLock<Regex> =
    LazyLock::new(|| field(r"updated date|last updated on|last-modified|last modified|changed"));
static REGISTRAR_WHOIS: LazyLock<Regex> = LazyLock::new(|| field(r"registrar whois server"));
static NAME_SERVER: LazyLock<Regex> = LazyLock::new(|| field(r"name server|nserver"));
static STATUS: LazyLock<Regex> = LazyLock::new(|| field(r"domain status|status"));

/// `Label: value` on its own line, case-insensitive.
fn field(labels: &str) -> Regex {
    Regex::new(&format!(r"(?mi)^[ \t]*(?:{labels})[ \t]*:[ \t]*(\S.*?)[ \t]*\r?$"))
        .expect("static regex")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhoisInfo {
    pub domain: String,
    pub success: bool,
    pub error: Option<String>,
    pub registrar: Option<String>,
    pub creation_date: Option<String>,
    pub expiration_date: Option<String>,
    pub updated_date: Option<String>,
    pub name_servers: Vec<String>,
    pub status: Vec<String>,
    pub whois_server: Option<String>,
    pub days_until_expiration: Option<f64>,
}

impl WhoisInfo {
    fn empty(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            success: false,
            error: None,
            registrar: None,
            creation_date: None,
            expiration_date: None,
            updated_date: None,
            name_servers: Vec::new(),
            status: Vec::new(),
            whois_server: None,
            days_until_expiration: None,
        }
    }

    pub fn failed(domain: &str, error: &LookupError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::empty(domain)
        }
    }
}

/// Strip scheme, path, port and trailing dot; lowercase. `None` when nothing
/// usable is left.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let without_scheme = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    let host = host.split(':').next().unwrap_or_default();
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    let valid = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '.');
    valid.then_some(host)
}

#[derive(Debug, Clone)]
pub struct WhoisClient {
    referral_server: String,
    port: u16,
    timeout: Duration,
}

impl WhoisClient {
    pub fn new(referral_server: impl Into<String>, timeout: Duration) -> Self {
        Self::with_port(referral_server, WHOIS_PORT, timeout)
    }

    /// Every hop uses `port`; only tests need anything other than 43.
    pub fn with_port(referral_server: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            referral_server: referral_server.into(),
            port,
            timeout,
        }
    }

    /// Look up an already-normalised domain. Failures are reported inside
    /// the result.
    pub async fn lookup(&self, domain: &str) -> WhoisInfo {
        match self.resolve(domain).await {
            Ok((server, response)) => parse_response(domain, &server, &response, Utc::now()),
            Err(e) => {
                debug!(domain, error = %e, "whois lookup failed");
                WhoisInfo::failed(domain, &e)
            }
        }
    }

    /// Registry server and its raw answer for `domain`.
    async fn resolve(&self, domain: &str) -> Result<(String, String), LookupError> {
        let referral = self.query(&self.referral_server, domain).await?;
        let server = match first(&REFER, &referral) {
            Some(next) if !next.eq_ignore_ascii_case(&self.referral_server) => next,
            _ => return Ok((self.referral_server.clone(), referral)),
        };
        debug!(domain, %server, "following whois referral");
        let response = self.query(&server, domain).await?;
        Ok((server, response))
    }

    async fn query(&self, server: &str, domain: &str) -> Result<String, LookupError> {
        let exchange = async {
            let mut stream = TcpStream::connect((server, self.port))
                .await
                .map_err(|source| LookupError::Connect {
                    target: format!("{server}:{}", self.port),
                    source,
                })?;
            let io = |e: std::io::Error| LookupError::Whois(format!("{server}: {e}"));
            stream
                .write_all(format!("{domain}\r\n").as_bytes())
                .await
                .map_err(io)?;
            let mut buf = Vec::new();
            stream
                .take(MAX_RESPONSE_BYTES)
                .read_to_end(&mut buf)
                .await
                .map_err(io)?;
            Ok::<_, LookupError>(String::from_utf8_lossy(&buf).into_owned())
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| LookupError::Timeout(self.timeout))?
    }
}

fn first(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Distinct first tokens of every match, in order of appearance.
fn all_tokens(pattern: &Regex, text: &str, lowercase: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in pattern.captures_iter(text) {
        let Some(token) = caps.get(1).and_then(|m| m.as_str().split_whitespace().next()) else {
            continue;
        };
        let token = if lowercase {
            token.trim_end_matches('.').to_ascii_lowercase()
        } else {
            token.to_string()
        };
        if !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

/// Registry dates come as RFC 3339, `YYYY-MM-DD hh:mm:ss` (CNNIC, China
/// Standard Time) or a bare date.
pub fn parse_whois_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        let cst = FixedOffset::east_opt(8 * 3600)?;
        return cst
            .from_local_datetime(&naive)
            .single()
            .map(|t| t.with_timezone(&Utc));
    }
    let date = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn normalise_date(raw: Option<String>) -> Option<String> {
    raw.map(|r| parse_whois_date(&r).map_or(r, |t| t.to_rfc3339()))
}

pub fn parse_response(domain: &str, server: &str, text: &str, now: DateTime<Utc>) -> WhoisInfo {
    let registrar = first(&REGISTRAR, text);
    let expiration_raw = first(&EXPIRES, text);
    let days_until_expiration = expiration_raw
        .as_deref()
        .and_then(parse_whois_date)
        .map(|exp| ((exp - now).num_seconds() as f64 / 86_400.0 * 100.0).round() / 100.0);
    let creation_date = normalise_date(first(&CREATED, text));
    let expiration_date = normalise_date(expiration_raw);

    let found = registrar.is_some() || creation_date.is_some() || expiration_date.is_some();
    WhoisInfo {
        domain: domain.to_string(),
        success: found,
        error: (!found).then(|| format!("no registration data for {domain} from {server}")),
        registrar,
        creation_date,
        expiration_date,
        updated_date: normalise_date(first(&UPDATED, text)),
        name_servers: all_tokens(&NAME_SERVER, text, true),
        status: all_tokens(&STATUS, text, false),
        whois_server: first(&REGISTRAR_WHOIS, text).or_else(|| Some(server.to_string())),
        days_until_expiration,
    }
}
