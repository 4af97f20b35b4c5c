//! Test builders: Mastodon notification payloads and harness configs.
//!
//! These builders are designed for readability in test assertions, not for
//! production use. They panic on invalid input rather than returning `Result`.

use relay::notify::config::Config;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// NotificationBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for Mastodon notification JSON as the API returns it.
///
/// # Example
///
/// ```rust
/// let n = notification("101", "mention")
///     .from("alice", "Alice")
///     .content("<p>hello</p>")
///     .at("2024-01-15T10:00:00Z")
///     .build();
/// ```
pub struct NotificationBuilder {
    id: String,
    kind: String,
    created_at: String,
    username: String,
    display_name: String,
    content: Option<String>,
}

pub fn notification(id: &str, kind: &str) -> NotificationBuilder {
    NotificationBuilder {
        id: id.to_string(),
        kind: kind.to_string(),
        created_at: "2024-01-15T10:00:00.000Z".to_string(),
        username: "alice".to_string(),
        display_name: "Alice".to_string(),
        content: None,
    }
}

impl NotificationBuilder {
    pub fn from(mut self, username: &str, display_name: &str) -> Self {
        self.username = username.to_string();
        self.display_name = display_name.to_string();
        self
    }

    pub fn content(mut self, html: &str) -> Self {
        self.content = Some(html.to_string());
        self
    }

    pub fn at(mut self, rfc3339: &str) -> Self {
        self.created_at = rfc3339.to_string();
        self
    }

    pub fn build(self) -> Value {
        let mut value = json!({
            "id": self.id,
            "type": self.kind,
            "created_at": self.created_at,
            "account": {
                "id": "1",
                "username": self.username,
                "acct": self.username,
                "display_name": self.display_name,
            },
        });
        if let Some(content) = self.content {
            value["status"] = json!({ "id": "9", "content": content, "spoiler_text": "" });
        }
        value
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Config for a harness: every remote points at `base_url`, the cursor lives
/// in `state_file`, and backoff is shortened so retry tests stay fast.
/// `extra` entries are applied on top as environment variables.
pub fn harness_config(base_url: &str, state_file: &Path, extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("RELAY_MASTODON__INSTANCE", base_url),
        ("RELAY_MASTODON__TOKEN", "test-token"),
        ("RELAY_WEATHER__API_BASE", base_url),
        ("RELAY_WEATHER__API_KEY", "test-key"),
        ("RELAY_ONEBOT__ENDPOINT", base_url),
        ("RELAY_ONEBOT__TARGET", "private:10001"),
        ("RELAY_HTTP__TIMEOUT_SECS", "5"),
        ("RELAY_HTTP__BACKOFF_BASE_MS", "10"),
        ("RELAY_HTTP__BACKOFF_MAX_MS", "40"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    vars.insert(
        "RELAY_NOTIFIER__STATE_FILE".into(),
        state_file.display().to_string(),
    );
    // Keep the developer's own config file out of the picture.
    vars.insert("XDG_CONFIG_HOME".into(), "/nonexistent".into());
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::load_with_env(None, vars).unwrap()
}

/// Write a cursor file the way a previous run would have left it.
pub fn seed_cursor(path: &Path, id: &str) {
    std::fs::write(path, json!({ "last_notification_id": id }).to_string()).unwrap();
}

/// The cursor currently stored in `path`.
pub fn stored_cursor(path: &Path) -> String {
    let raw = std::fs::read_to_string(path).unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    value["last_notification_id"].as_str().unwrap().to_string()
}
