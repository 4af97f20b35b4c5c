//! OneBot v11 HTTP sink (QQ bot bridges such as go-cqhttp, NapCat, Lagrange).

use async_trait::async_trait;
use relay_core::config::{required, OneBotConfig};
use relay_core::retry::{AttemptError, RetryPolicy};
use relay_core::{ConfigError, Delivered, DeliveryError, DeliveryResult, RenderedMessage, Sink};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};
use url::Url;

use crate::http::HttpClient;
use crate::mastodon::parse_base_url;

/// Actions an endpoint URL may already end with; stripped so both the bare
/// API root and a full action URL are accepted.
const ACTIONS: [&str; 2] = ["send_private_msg", "send_group_msg"];

/// `retcode` 1 means the bridge queued the message asynchronously.
const ACCEPTED_RETCODES: [i64; 2] = [0, 1];

/// Who a message goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneBotTarget {
    Private(u64),
    Group(u64),
}

impl OneBotTarget {
    fn action(&self) -> &'static str {
        match self {
            OneBotTarget::Private(_) => "send_private_msg",
            OneBotTarget::Group(_) => "send_group_msg",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid OneBot target `{0}`: expected `private:<id>`, `group:<id>` or a bare id")]
pub struct InvalidTarget(String);

impl FromStr for OneBotTarget {
    type Err = InvalidTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (kind, id) = trimmed.split_once(':').unwrap_or(("private", trimmed));
        let id: u64 = id.trim().parse().map_err(|_| InvalidTarget(s.to_string()))?;
        match kind.trim().to_ascii_lowercase().as_str() {
            "private" | "user" => Ok(OneBotTarget::Private(id)),
            "group" => Ok(OneBotTarget::Group(id)),
            _ => Err(InvalidTarget(s.to_string())),
        }
    }
}

impl fmt::Display for OneBotTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OneBotTarget::Private(id) => write!(f, "private:{id}"),
            OneBotTarget::Group(id) => write!(f, "group:{id}"),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum SendRequest<'a> {
    Private { user_id: u64, message: &'a str },
    Group { group_id: u64, message: &'a str },
}

#[derive(Debug, Default, Deserialize)]
struct SendReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    retcode: Option<i64>,
    #[serde(default)]
    wording: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl SendReply {
    fn rejection(&self) -> Option<String> {
        let failed = self.status.as_deref() == Some("failed");
        let bad_code = self.retcode.is_some_and(|c| !ACCEPTED_RETCODES.contains(&c));
        if !failed && !bad_code {
            return None;
        }
        let reason = self
            .wording
            .as_deref()
            .or(self.msg.as_deref())
            .unwrap_or("no reason given");
        Some(match self.retcode {
            Some(code) => format!("retcode {code}: {reason}"),
            None => reason.to_string(),
        })
    }

    fn message_id(&self) -> Option<String> {
        let id = self.data.as_ref()?.get("message_id")?;
        Some(match id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

pub struct OneBotSink {
    client: HttpClient,
    base: Url,
    access_token: Option<String>,
    policy: RetryPolicy,
}

impl OneBotSink {
    pub fn new(
        client: HttpClient,
        endpoint: &str,
        access_token: Option<String>,
        policy: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let trimmed = endpoint.trim().trim_end_matches('/');
        let root = ACTIONS
            .iter()
            .find_map(|action| trimmed.strip_suffix(action))
            .unwrap_or(trimmed);
        let base = parse_base_url(root, "onebot.endpoint")?;
        Ok(Self {
            client,
            base,
            access_token: access_token.filter(|t| !t.trim().is_empty()),
            policy,
        })
    }

    /// Build the sink and validate the configured target.
    pub fn from_config(
        client: HttpClient,
        config: &OneBotConfig,
        policy: RetryPolicy,
    ) -> Result<(Self, OneBotTarget), ConfigError> {
        let endpoint = required(&config.endpoint, "onebot.endpoint")?;
        let target = required(&config.target, "onebot.target")?
            .parse::<OneBotTarget>()
            .map_err(|e| ConfigError::Invalid {
                key: "onebot.target",
                reason: e.to_string(),
            })?;
        let sink = Self::new(client, endpoint, Some(config.access_token.clone()), policy)?;
        Ok((sink, target))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn action_url(&self, target: OneBotTarget) -> Result<Url, DeliveryError> {
        self.base
            .join(target.action())
            .map_err(|e| DeliveryError::Rejected(format!("building action URL: {e}")))
    }
}

#[async_trait]
impl Sink for OneBotSink {
    async fn deliver(&self, message: &RenderedMessage) -> DeliveryResult {
        let target: OneBotTarget = message
            .target
            .parse()
            .map_err(|e: InvalidTarget| DeliveryError::Rejected(e.to_string()))?;
        let url = self.action_url(target)?;
        let payload = match target {
            OneBotTarget::Private(user_id) => SendRequest::Private {
                user_id,
                message: &message.text,
            },
            OneBotTarget::Group(group_id) => SendRequest::Group {
                group_id,
                message: &message.text,
            },
        };
        let mut headers = Vec::new();
        if let Some(token) = &self.access_token {
            headers.push(("authorization", format!("Bearer {token}")));
        }

        let client = &self.client;
        let (url, headers, payload) = (&url, &headers, &payload);
        let outcome = self
            .policy
            .execute(move |attempt| async move {
                debug!(attempt, %target, "sending to OneBot");
                let response = client
                    .post_json(url, headers, payload)
                    .await
                    .map_err(|e| AttemptError::Transport(e.to_string()))?;
                if response.status.is_success() {
                    Ok(response)
                } else {
                    warn!(attempt, status = response.status.as_u16(), "OneBot send failed");
                    Err(AttemptError::Status {
                        status: response.status.as_u16(),
                        body: response.snippet(),
                    })
                }
            })
            .await?;

        // Some bridges answer with an empty or non-JSON body on success.
        let reply: SendReply = serde_json::from_slice(&outcome.value.body).unwrap_or_default();
        if let Some(reason) = reply.rejection() {
            return Err(DeliveryError::Rejected(reason));
        }
        let detail = reply.message_id();
        info!(%target, attempts = outcome.attempts, message_id = ?detail, "delivered to OneBot");
        Ok(Delivered {
            attempts: outcome.attempts,
            detail,
        })
    }
}
