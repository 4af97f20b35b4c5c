//! Mastodon notifications source and renderer.
//!
//! Polls `GET /api/v1/notifications` with the configured `exclude_types[]`,
//! authenticated with a bearer token.
//!
//! A fetch pages forward from the cursor with `min_id` and `limit`, so a
//! backlog larger than one page is read oldest page first and nothing between
//! the cursor and the newest notification is skipped. At most `max_pages`
//! pages are drained per fetch; whatever is left starts the next cycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::config::{required, MastodonConfig, DEFAULT_MAX_PAGES, DEFAULT_PAGE_LIMIT};
use relay_core::render::strip_markup;
use relay_core::types::compare_ids;
use relay_core::{ConfigError, Cursor, Item, Renderer, Source, UpstreamError};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::http::HttpClient;

/// Shown in place of a post body the notification does not carry.
pub const CONTENT_UNAVAILABLE: &str = "[content unavailable]";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One entry of the notifications API. Only the fields we render are decoded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub account: Account,
    #[serde(default)]
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub acct: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub spoiler_text: String,
}

impl Item for Notification {
    fn id(&self) -> &str {
        &self.id
    }

    fn recency(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn kind(&self) -> &str {
        &self.kind
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct MastodonSource {
    client: HttpClient,
    instance: Url,
    endpoint: Url,
    token: String,
    exclude_types: Vec<String>,
    page_limit: usize,
    max_pages: usize,
}

impl MastodonSource {
    pub fn new(
        client: HttpClient,
        instance: &str,
        token: impl Into<String>,
        exclude_types: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let instance = parse_base_url(instance, "mastodon.instance")?;
        let endpoint = instance
            .join("api/v1/notifications")
            .map_err(|e| ConfigError::Invalid {
                key: "mastodon.instance",
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            instance,
            endpoint,
            token: token.into(),
            exclude_types,
            page_limit: DEFAULT_PAGE_LIMIT as usize,
            max_pages: DEFAULT_MAX_PAGES as usize,
        })
    }

    /// Page size and the number of pages one fetch may drain. Zero means one.
    pub fn with_paging(mut self, page_limit: usize, max_pages: usize) -> Self {
        self.page_limit = page_limit.max(1);
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn from_config(client: HttpClient, config: &MastodonConfig) -> Result<Self, ConfigError> {
        let instance = required(&config.instance, "mastodon.instance")?;
        let token = required(&config.token, "mastodon.token")?;
        Ok(Self::new(client, instance, token, config.exclude_types.clone())?
            .with_paging(config.page_limit(), config.max_pages()))
    }

    pub fn instance(&self) -> &Url {
        &self.instance
    }

    fn request_url(&self, since: &Cursor) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            for kind in &self.exclude_types {
                query.append_pair("exclude_types[]", kind);
            }
            query.append_pair("min_id", since.as_str());
            // Servers without min_id fall back to since_id.
            query.append_pair("since_id", since.as_str());
            query.append_pair("limit", &self.page_limit.to_string());
        }
        url
    }

    /// One page of notifications strictly newer than `after`, as decoded.
    async fn fetch_page(&self, after: &Cursor) -> Result<Vec<Notification>, UpstreamError> {
        let url = self.request_url(after);
        let headers = [("authorization", format!("Bearer {}", self.token))];
        let response = self
            .client
            .get(&url, &headers)
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if !response.status.is_success() {
            return Err(UpstreamError::Status {
                status: response.status.as_u16(),
                body: response.snippet(),
            });
        }

        serde_json::from_slice(&response.body).map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Source for MastodonSource {
    type Item = Notification;

    async fn fetch(&self, since: &Cursor) -> Result<Vec<Notification>, UpstreamError> {
        let mut fresh = Vec::new();
        let mut after = since.clone();

        for page in 1..=self.max_pages {
            let notifications = self.fetch_page(&after).await?;
            let full = notifications.len() >= self.page_limit;

            // Some instances ignore the id bounds; never re-deliver.
            let batch: Vec<Notification> = notifications
                .into_iter()
                .filter(|n| after.precedes(&n.id))
                .collect();
            let Some(newest) = batch
                .iter()
                .map(|n| n.id.as_str())
                .max_by(|a, b| compare_ids(a, b))
            else {
                break;
            };
            after = Cursor::new(newest);
            debug!(page, fetched = batch.len(), cursor = %after, "mastodon page");
            fresh.extend(batch);

            if !full {
                break;
            }
            if page == self.max_pages {
                debug!(pages = page, cursor = %after, "backlog continues next cycle");
            }
        }

        debug!(fresh = fresh.len(), cursor = %since, "mastodon notifications");
        Ok(fresh)
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

struct Phrase {
    /// `{who}` is replaced with "Name (@acct)".
    template: &'static str,
    with_content: bool,
}

static PHRASES: phf::Map<&'static str, Phrase> = phf::phf_map! {
    "mention" => Phrase { template: "💬 {who} mentioned you:", with_content: true },
    "reply" => Phrase { template: "↩️ {who} replied to you:", with_content: true },
    "reblog" => Phrase { template: "🔁 {who} boosted your post:", with_content: true },
    "favourite" => Phrase { template: "⭐ {who} favourited your post:", with_content: true },
    "status" => Phrase { template: "📝 {who} posted:", with_content: true },
    "update" => Phrase { template: "✏️ {who} edited a post:", with_content: true },
    "poll" => Phrase { template: "📊 The poll by {who} has ended", with_content: false },
    "follow" => Phrase { template: "👤 {who} followed you", with_content: false },
    "follow_request" => Phrase { template: "🙋 {who} requested to follow you", with_content: false },
    "admin.sign_up" => Phrase { template: "🆕 {who} signed up", with_content: false },
    "admin.report" => Phrase { template: "🚩 {who} filed a report", with_content: false },
};

/// Renders one notification per block, phrased by notification type.
#[derive(Debug, Clone, Copy, Default)]
pub struct MastodonRenderer;

impl MastodonRenderer {
    fn who(account: &Account) -> String {
        let name = [&account.display_name, &account.username]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("unknown");
        let acct = if account.acct.is_empty() {
            &account.username
        } else {
            &account.acct
        };
        format!("{name} (@{acct})")
    }

    fn content(status: Option<&Status>) -> String {
        let Some(status) = status else {
            return CONTENT_UNAVAILABLE.to_string();
        };
        let body = strip_markup(&status.content);
        let spoiler = status.spoiler_text.trim();
        match (spoiler.is_empty(), body.is_empty()) {
            (true, true) => CONTENT_UNAVAILABLE.to_string(),
            (true, false) => body,
            (false, _) => format!("[CW: {spoiler}] {body}").trim_end().to_string(),
        }
    }
}

impl Renderer<Notification> for MastodonRenderer {
    fn render(&self, n: &Notification) -> String {
        let who = Self::who(&n.account);
        match PHRASES.get(n.kind.as_str()) {
            Some(phrase) if phrase.with_content => format!(
                "{}\n{}",
                phrase.template.replace("{who}", &who),
                Self::content(n.status.as_ref())
            ),
            Some(phrase) => phrase.template.replace("{who}", &who),
            None => format!("ℹ️ New notification ({}) from {who}", n.kind),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse an http(s) base URL, making sure it ends in `/` so `join` appends.
pub(crate) fn parse_base_url(raw: &str, key: &'static str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid { key, reason };
    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
