//! Minimal HTTPS client shared by every source and sink.
//!
//! A thin layer over hyper's legacy pooled client with a rustls connector.
//! Every request carries the configured `User-Agent` and is bounded by one
//! timeout covering connect, headers and body.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request, StatusCode};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use relay_core::config::HttpConfig;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Longest body excerpt carried into error messages.
const SNIPPET_LEN: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("building request: {0}")]
    Request(String),
    #[error("{0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("reading response body: {0}")]
    Body(String),
}

/// Status and fully-buffered body of a response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    /// Leading part of the body as lossy UTF-8, for diagnostics.
    pub fn snippet(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        let text = text.trim();
        match text.char_indices().nth(SNIPPET_LEN) {
            Some((cut, _)) => format!("{}…", &text[..cut]),
            None => text.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
    user_agent: String,
}

impl HttpClient {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        Self {
            inner: Client::builder(TokioExecutor::new()).build(https),
            timeout,
            user_agent: user_agent.into(),
        }
    }

    pub fn from_config(config: &HttpConfig) -> Self {
        Self::new(config.timeout(), config.user_agent.clone())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get(
        &self,
        url: &Url,
        headers: &[(&str, String)],
    ) -> Result<HttpResponse, HttpError> {
        self.send(Method::GET, url, headers, None).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &Url,
        headers: &[(&str, String)],
        body: &T,
    ) -> Result<HttpResponse, HttpError> {
        let body = serde_json::to_vec(body).map_err(|e| HttpError::Request(e.to_string()))?;
        self.send(Method::POST, url, headers, Some(Bytes::from(body)))
            .await
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        headers: &[(&str, String)],
        json: Option<Bytes>,
    ) -> Result<HttpResponse, HttpError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(url.as_str())
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::ACCEPT, "application/json");
        if json.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        let request = builder
            .body(Full::new(json.unwrap_or_default()))
            .map_err(|e| HttpError::Request(e.to_string()))?;

        let exchange = async {
            let response = self
                .inner
                .request(request)
                .await
                .map_err(|e| HttpError::Transport(describe(&e)))?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| HttpError::Body(e.to_string()))?
                .to_bytes();
            Ok::<_, HttpError>(HttpResponse { status, body })
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| HttpError::Timeout(self.timeout))?
    }
}

/// hyper-util errors hide the useful part in their source chain.
fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
