use std::time::Duration;
use thiserror::Error;

/// Why a single lookup failed. Lookups never fail the request as a whole:
/// the message is reported in the result's `error` field.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("invalid input `{0}`")]
    InvalidInput(String),
    #[error("connecting to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("TLS handshake: {0}")]
    Tls(String),
    #[error("certificate: {0}")]
    Certificate(String),
    #[error("whois: {0}")]
    Whois(String),
}
