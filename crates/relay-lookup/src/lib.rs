//! relay-lookup: read-only host diagnostics over HTTP.
//!
//! | Route     | Answer                                                   |
//! |-----------|----------------------------------------------------------|
//! | `/health` | liveness and server time                                 |
//! | `/uptime` | host boot time and container start time                  |
//! | `/cert`   | TLS leaf certificate of one or more `host[:port]`        |
//! | `/whois`  | registration data of one or more domains                 |
//!
//! Certificate and WHOIS results, failures included, are memoized per
//! normalised input in a [`TtlCache`] owned by [`LookupState`].

pub mod cert;
pub mod error;
pub mod routes;
pub mod uptime;
pub mod whois;

use relay_core::cache::TtlCache;
use relay_core::config::LookupConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use cert::{CertInfo, CertInspector};
pub use error::LookupError;
pub use routes::router;
pub use whois::{WhoisClient, WhoisInfo};

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Init(#[from] LookupError),
    #[error("binding {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("lookup server: {0}")]
    Serve(#[source] std::io::Error),
}

/// Everything the handlers share.
pub struct LookupState {
    pub(crate) certs: TtlCache<CertInfo>,
    pub(crate) domains: TtlCache<WhoisInfo>,
    pub(crate) inspector: CertInspector,
    pub(crate) whois: WhoisClient,
    pub(crate) cert_timeout: Duration,
    pub(crate) container_start_file: PathBuf,
}

impl LookupState {
    pub fn new(inspector: CertInspector, whois: WhoisClient, config: &LookupConfig) -> Self {
        Self {
            certs: TtlCache::new(config.cache_ttl()),
            domains: TtlCache::new(config.cache_ttl()),
            inspector,
            whois,
            cert_timeout: config.cert_timeout(),
            container_start_file: config.container_start_file.clone(),
        }
    }

    pub fn from_config(config: &LookupConfig) -> Result<Self, LookupError> {
        let whois = WhoisClient::new(config.whois_server.clone(), config.whois_timeout());
        Ok(Self::new(CertInspector::new()?, whois, config))
    }

    /// Drop expired cache entries; returns how many went.
    pub fn purge_expired(&self) -> usize {
        self.certs.purge_expired() + self.domains.purge_expired()
    }

    pub fn cached_entries(&self) -> usize {
        self.certs.len() + self.domains.len()
    }
}

/// Bind `config.bind` and serve until `shutdown` fires.
pub async fn serve(config: &LookupConfig, shutdown: CancellationToken) -> Result<(), ServeError> {
    let state = Arc::new(LookupState::from_config(config)?);
    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|source| ServeError::Bind {
            addr: config.bind.clone(),
            source,
        })?;
    let addr = listener.local_addr().map_err(ServeError::Serve)?;
    info!(%addr, cache_ttl = ?config.cache_ttl(), "lookup service listening");

    let sweep_stop = shutdown.child_token();
    let sweeper = tokio::spawn(sweep(state.clone(), config.cache_ttl(), sweep_stop.clone()));

    let stop = shutdown.clone();
    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await
        .map_err(ServeError::Serve);

    sweep_stop.cancel();
    let _ = sweeper.await;
    info!("lookup service stopped");
    served
}

/// Periodically drop expired entries so one-off lookups do not pile up.
async fn sweep(state: Arc<LookupState>, ttl: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(ttl.max(Duration::from_secs(60)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let purged = state.purge_expired();
                debug!(purged, remaining = state.cached_entries(), "cache sweep");
            }
        }
    }
}
