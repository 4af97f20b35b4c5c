//! Concrete sources and sinks for the relay notifier.
//!
//! - [`mastodon`]: notifications API source and per-type renderer
//! - [`weather`]: AMap live-weather source and one-line renderer
//! - [`onebot`]: OneBot v11 HTTP sink with bounded retry
//!
//! All of them share one [`http::HttpClient`].

pub mod http;
pub mod mastodon;
pub mod onebot;
pub mod weather;

pub use http::{HttpClient, HttpError, HttpResponse};
pub use mastodon::{MastodonRenderer, MastodonSource, Notification};
pub use onebot::{OneBotSink, OneBotTarget};
pub use weather::{WeatherRenderer, WeatherReport, WeatherSource};
