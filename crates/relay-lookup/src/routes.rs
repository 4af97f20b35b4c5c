//! HTTP surface of the lookup service.

use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::cert::{parse_host_port, CertInfo};
use crate::error::LookupError;
use crate::uptime::{self, UptimeReport};
use crate::whois::{normalize_domain, WhoisInfo};
use crate::LookupState;

pub fn router(state: Arc<LookupState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/uptime", get(uptime_report))
        .route("/cert", get(cert))
        .route("/whois", get(whois))
        .with_state(state)
}

/// JSON `{"error": ...}` with a 400 status.
#[derive(Debug, Serialize)]
pub struct BadRequest {
    pub error: String,
}

impl IntoResponse for BadRequest {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// A single result is returned bare; several as an array.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        match <[T; 1]>::try_from(items) {
            Ok([one]) => OneOrMany::One(one),
            Err(items) => OneOrMany::Many(items),
        }
    }
}

/// Decoded query string.
struct Params(Vec<(String, String)>);

impl Params {
    fn parse(query: Option<&str>) -> Self {
        let pairs = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Params(pairs)
    }

    /// Every value of `key`, repeated or comma-separated, trimmed, blanks dropped.
    fn list(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .flat_map(|(_, v)| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "time": Utc::now().timestamp() }))
}

async fn uptime_report(State(state): State<Arc<LookupState>>) -> Json<UptimeReport> {
    Json(uptime::report(&state.container_start_file).await)
}

async fn cert(
    State(state): State<Arc<LookupState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<OneOrMany<CertInfo>>, BadRequest> {
    let params = Params::parse(query.as_deref());
    let hosts = params.list("host");
    if hosts.is_empty() {
        return Err(BadRequest {
            error: "missing `host` parameter, e.g. /cert?host=example.com or /cert?host=example.com:8443"
                .into(),
        });
    }
    let timeout = params
        .first("timeout")
        .and_then(|t| t.trim().parse::<f64>().ok())
        .filter(|t| t.is_finite() && *t > 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(state.cert_timeout);

    let lookups = hosts.iter().map(|raw| {
        let (host, port) = parse_host_port(raw);
        let host = host.to_ascii_lowercase();
        let state = &state;
        async move {
            state
                .certs
                .get_or_insert_with("cert", &format!("{host}:{port}"), || {
                    state.inspector.inspect(&host, port, timeout)
                })
                .await
        }
    });
    Ok(Json(join_all(lookups).await.into()))
}

async fn whois(
    State(state): State<Arc<LookupState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<OneOrMany<WhoisInfo>>, BadRequest> {
    let domains = Params::parse(query.as_deref()).list("domain");
    if domains.is_empty() {
        return Err(BadRequest {
            error: "missing `domain` parameter, e.g. /whois?domain=example.com".into(),
        });
    }

    let lookups = domains.iter().map(|raw| {
        let state = &state;
        async move {
            let Some(domain) = normalize_domain(raw) else {
                return WhoisInfo::failed(raw, &LookupError::InvalidInput(raw.clone()));
            };
            state
                .domains
                .get_or_insert_with("whois", &domain, || state.whois.lookup(&domain))
                .await
        }
    });
    Ok(Json(join_all(lookups).await.into()))
}
