//! Fake upstream and delivery endpoints for integration tests.
//!
//! One `axum` server on 127.0.0.1 plays all three remote parties:
//! - `GET /api/v1/notifications`: Mastodon, honouring `min_id`, `since_id`
//!   and `limit` up to a page cap (40 unless set)
//! - `GET /v3/weather/weatherInfo`: AMap live weather
//! - `POST /send_private_msg`, `POST /send_group_msg`: a OneBot bridge
//!
//! Every request is recorded. OneBot and Mastodon replies can be scripted as a
//! queue of statuses; once a script runs out the endpoint answers 200.
//!
//! ```rust,no_run
//! let server = FakeServer::start().await;
//! server.push_notification(notification("101", "mention").build()).await;
//! server.script_onebot([503, 200]).await;
//! // point the config at server.base_url()
//! ```

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// One request as the fake saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

impl Recorded {
    /// Value of query parameter `key`, if present (first occurrence).
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.query_params(key).into_iter().next()
    }

    pub fn query_params(&self, key: &str) -> Vec<String> {
        url::form_urlencoded::parse(self.query.as_deref().unwrap_or_default().as_bytes())
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .collect()
    }

    /// The `message` field of a OneBot send request.
    pub fn message(&self) -> String {
        self.body
            .as_ref()
            .and_then(|b| b["message"].as_str())
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Default)]
struct ServerState {
    notifications: Vec<Value>,
    page_cap: Option<usize>,
    mastodon_script: VecDeque<u16>,
    weather: Option<Value>,
    onebot_script: VecDeque<(u16, Value)>,
    requests: Vec<Recorded>,
}

type Shared = Arc<Mutex<ServerState>>;

/// Handle to the running fake server.
pub struct FakeServer {
    addr: SocketAddr,
    state: Shared,
}

impl FakeServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state: Shared = Arc::default();

        let app = Router::new()
            .route("/api/v1/notifications", get(notifications))
            .route("/v3/weather/weatherInfo", get(weather))
            .route("/send_private_msg", post(onebot_send))
            .route("/send_group_msg", post(onebot_send))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Base URL, e.g. `http://127.0.0.1:PORT`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn push_notification(&self, notification: Value) {
        self.state.lock().await.notifications.push(notification);
    }

    /// Largest page the fake Mastodon returns, whatever `limit` asks for.
    pub async fn set_page_cap(&self, cap: usize) {
        self.state.lock().await.page_cap = Some(cap);
    }

    /// Statuses for the next Mastodon requests; 200 afterwards.
    pub async fn script_mastodon(&self, statuses: impl IntoIterator<Item = u16>) {
        self.state.lock().await.mastodon_script.extend(statuses);
    }

    pub async fn set_weather(&self, body: Value) {
        self.state.lock().await.weather = Some(body);
    }

    /// Statuses for the next OneBot sends, each answered with the standard
    /// body for that status; 200 afterwards.
    pub async fn script_onebot(&self, statuses: impl IntoIterator<Item = u16>) {
        let mut state = self.state.lock().await;
        for status in statuses {
            state.onebot_script.push_back((status, onebot_reply(status)));
        }
    }

    /// A single OneBot reply with an explicit body.
    pub async fn script_onebot_reply(&self, status: u16, body: Value) {
        self.state.lock().await.onebot_script.push_back((status, body));
    }

    pub async fn requests(&self) -> Vec<Recorded> {
        self.state.lock().await.requests.clone()
    }

    /// Requests whose path matches `path`.
    pub async fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// All OneBot sends, private and group.
    pub async fn sends(&self) -> Vec<Recorded> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.path.starts_with("/send_"))
            .collect()
    }
}

fn onebot_reply(status: u16) -> Value {
    if (200..300).contains(&status) {
        serde_json::json!({"status": "ok", "retcode": 0, "data": {"message_id": 4242}})
    } else {
        serde_json::json!({"status": "failed", "retcode": status, "wording": "scripted failure"})
    }
}

fn record(method: Method, uri: &Uri, headers: &HeaderMap, body: Option<Value>) -> Recorded {
    Recorded {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    }
}

fn numeric_id(value: &Value) -> u64 {
    value["id"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

async fn notifications(
    State(state): State<Shared>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().await;
    let recorded = record(Method::GET, &uri, &headers, None);
    let param = |key: &str| recorded.query_param(key).and_then(|v| v.parse::<u64>().ok());
    let min_id = param("min_id");
    let since = param("since_id").unwrap_or_default();
    let cap = state.page_cap.unwrap_or(40);
    let limit = param("limit").map_or(cap, |l| (l as usize).min(cap));
    state.requests.push(recorded);

    if let Some(status) = state.mastodon_script.pop_front() {
        if status != 200 {
            let status = StatusCode::from_u16(status).unwrap();
            return (status, Json(serde_json::json!({"error": "scripted"}))).into_response();
        }
    }

    // min_id pages up from the bound; since_id returns the newest page above
    // it. Either way the page itself is newest first, like the real API.
    let lower = min_id.unwrap_or(since);
    let mut fresh: Vec<Value> = state
        .notifications
        .iter()
        .filter(|n| numeric_id(n) > lower)
        .cloned()
        .collect();
    if min_id.is_some() {
        fresh.sort_by_key(numeric_id);
        fresh.truncate(limit);
        fresh.reverse();
    } else {
        fresh.sort_by_key(|n| std::cmp::Reverse(numeric_id(n)));
        fresh.truncate(limit);
    }
    Json(fresh).into_response()
}

async fn weather(State(state): State<Shared>, uri: Uri, headers: HeaderMap) -> Response {
    let mut state = state.lock().await;
    state.requests.push(record(Method::GET, &uri, &headers, None));
    match state.weather.clone() {
        Some(body) => Json(body).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn onebot_send(
    State(state): State<Shared>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().await;
    state
        .requests
        .push(record(Method::POST, &uri, &headers, Some(body)));
    let (status, reply) = state
        .onebot_script
        .pop_front()
        .unwrap_or_else(|| (200, onebot_reply(200)));
    (StatusCode::from_u16(status).unwrap(), Json(reply)).into_response()
}
