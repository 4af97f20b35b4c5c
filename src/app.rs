//! Wiring: turn a loaded [`Config`] into runnable notifiers.

use relay_core::config::Config;
use relay_core::{
    ConfigError, CursorStore, CycleError, CycleOutcome, FileCursorStore, Notifier, Renderer, Sink,
    Source,
};
use relay_feeds::{
    HttpClient, MastodonRenderer, MastodonSource, OneBotSink, WeatherRenderer, WeatherSource,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub type MastodonNotifier =
    Notifier<MastodonSource, MastodonRenderer, OneBotSink, FileCursorStore>;
pub type WeatherNotifier = Notifier<WeatherSource, WeatherRenderer, OneBotSink, FileCursorStore>;

/// Mastodon notifications → OneBot.
pub fn mastodon_notifier(config: &Config) -> Result<MastodonNotifier, ConfigError> {
    let client = HttpClient::from_config(&config.http);
    let source = MastodonSource::from_config(client.clone(), &config.mastodon)?;
    let (sink, target) =
        OneBotSink::from_config(client, &config.onebot, config.http.retry_policy())?;
    let store = FileCursorStore::new(&config.notifier.state_file);
    Ok(
        Notifier::new("mastodon", source, MastodonRenderer, sink, store, target.to_string())
            .with_batch_format(config.mastodon.batch_format()),
    )
}

/// AMap live weather → OneBot.
pub fn weather_notifier(config: &Config) -> Result<WeatherNotifier, ConfigError> {
    let client = HttpClient::from_config(&config.http);
    let source = WeatherSource::from_config(client.clone(), &config.weather)?;
    let (sink, target) =
        OneBotSink::from_config(client, &config.onebot, config.http.retry_policy())?;
    let store = FileCursorStore::new(&config.notifier.state_file);
    Ok(
        Notifier::new("weather", source, WeatherRenderer, sink, store, target.to_string())
            .with_batch_format(config.weather.batch_format()),
    )
}

/// Run a single cycle, abandoning it if `shutdown` fires first.
pub async fn run_once<S, R, K, C>(
    notifier: &mut Notifier<S, R, K, C>,
    shutdown: &CancellationToken,
) -> Result<Option<CycleOutcome>, CycleError>
where
    S: Source,
    R: Renderer<S::Item>,
    K: Sink,
    C: CursorStore,
{
    let name = notifier.name().to_string();
    tokio::select! {
        _ = shutdown.cancelled() => {
            warn!(notifier = %name, "shutdown before the cycle finished");
            Ok(None)
        }
        outcome = notifier.run_cycle() => {
            let outcome = outcome?;
            info!(notifier = %name, ?outcome, "single cycle finished");
            Ok(Some(outcome))
        }
    }
}

/// Either one cycle (`once`) or the polling loop until `shutdown`.
pub async fn drive<S, R, K, C>(
    mut notifier: Notifier<S, R, K, C>,
    interval: Duration,
    once: bool,
    shutdown: CancellationToken,
) -> Result<(), CycleError>
where
    S: Source,
    R: Renderer<S::Item>,
    K: Sink,
    C: CursorStore,
{
    if once {
        run_once(&mut notifier, &shutdown).await.map(|_| ())
    } else {
        notifier.run(interval, shutdown).await;
        Ok(())
    }
}

/// Whether each mode has everything it needs, for `check-config`.
pub fn readiness(config: &Config) -> Vec<(&'static str, Result<(), ConfigError>)> {
    vec![
        ("mastodon", mastodon_notifier(config).map(|_| ())),
        ("weather", weather_notifier(config).map(|_| ())),
    ]
}
