//! relay: forward new Mastodon notifications and weather reports to a QQ
//! bot, plus a small read-only lookup service.
//!
//! # Architecture
//!
//! ```text
//! MastodonSource ─┐                                  ┌─► OneBotSink
//!                 ├─► Notifier (relay-core) ─────────┤
//! WeatherSource ──┘    cursor in FileCursorStore     └─► (any Sink)
//!
//! relay-lookup: /health /uptime /cert /whois (independent of the notifier)
//! ```
//!
//! The library re-exports the workspace crates so integration tests and the
//! binary share one import path.

pub mod app;

pub use relay_core as notify;
pub use relay_feeds as feeds;
pub use relay_lookup as lookup;
