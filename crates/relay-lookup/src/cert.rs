//! TLS certificate inspection.
//!
//! Connects to `host:port`, completes a verified TLS handshake against the
//! webpki roots (hostname checked), and reports the leaf certificate's
//! validity window, names and remaining lifetime.

use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use x509_parser::prelude::*;

use crate::error::LookupError;

pub const DEFAULT_TLS_PORT: u16 = 443;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertInfo {
    pub host_requested: String,
    pub port: u16,
    pub success: bool,
    pub error: Option<String>,
    pub not_before: Option<String>,
    pub not_after: Option<String>,
    pub not_after_ts: Option<i64>,
    pub seconds_remaining: Option<i64>,
    pub days_remaining: Option<f64>,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub san: Vec<String>,
}

impl CertInfo {
    fn failed(host: &str, port: u16, error: &LookupError) -> Self {
        Self {
            host_requested: host.to_string(),
            port,
            success: false,
            error: Some(error.to_string()),
            not_before: None,
            not_after: None,
            not_after_ts: None,
            seconds_remaining: None,
            days_remaining: None,
            issuer: None,
            subject: None,
            san: Vec::new(),
        }
    }
}

/// Split `host[:port]`. A port that does not parse falls back to 443;
/// bracketed IPv6 literals (`[::1]:8443`) are unwrapped.
pub fn parse_host_port(raw: &str) -> (String, u16) {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_TLS_PORT);
            return (host.to_string(), port);
        }
    }
    match raw.split_once(':') {
        Some((host, port)) if !port.contains(':') => {
            (host.to_string(), port.parse().unwrap_or(DEFAULT_TLS_PORT))
        }
        _ => (raw.to_string(), DEFAULT_TLS_PORT),
    }
}

#[derive(Clone)]
pub struct CertInspector {
    connector: TlsConnector,
}

impl CertInspector {
    /// Inspector trusting the bundled webpki roots.
    pub fn new() -> Result<Self, LookupError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_roots(roots)
    }

    pub fn with_roots(roots: RootCertStore) -> Result<Self, LookupError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| LookupError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    /// Inspect `host:port`. Failures are reported inside the result.
    pub async fn inspect(&self, host: &str, port: u16, timeout: Duration) -> CertInfo {
        let fetched = tokio::time::timeout(timeout, self.fetch_leaf(host, port))
            .await
            .unwrap_or(Err(LookupError::Timeout(timeout)));
        match fetched.and_then(|der| describe_leaf(&der, Utc::now())) {
            Ok(leaf) => leaf.into_info(host, port),
            Err(e) => {
                debug!(host, port, error = %e, "certificate lookup failed");
                CertInfo::failed(host, port, &e)
            }
        }
    }

    async fn fetch_leaf(&self, host: &str, port: u16) -> Result<Vec<u8>, LookupError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| LookupError::InvalidInput(host.to_string()))?;
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|source| LookupError::Connect {
                target: format!("{host}:{port}"),
                source,
            })?;
        let tls = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| LookupError::Tls(e.to_string()))?;
        let (_, session) = tls.get_ref();
        session
            .peer_certificates()
            .and_then(|chain| chain.first())
            .map(|leaf| leaf.as_ref().to_vec())
            .ok_or_else(|| LookupError::Certificate("server presented no certificate".into()))
    }
}

/// Fields read from a DER-encoded leaf certificate.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafSummary {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub seconds_remaining: i64,
    pub issuer: String,
    pub subject: String,
    pub san: Vec<String>,
}

impl LeafSummary {
    fn into_info(self, host: &str, port: u16) -> CertInfo {
        let days = self.seconds_remaining as f64 / 86_400.0;
        CertInfo {
            host_requested: host.to_string(),
            port,
            success: true,
            error: None,
            not_before: Some(self.not_before.to_rfc3339()),
            not_after: Some(self.not_after.to_rfc3339()),
            not_after_ts: Some(self.not_after.timestamp()),
            seconds_remaining: Some(self.seconds_remaining),
            days_remaining: Some((days * 1e6).round() / 1e6),
            issuer: Some(self.issuer),
            subject: Some(self.subject),
            san: self.san,
        }
    }
}

pub fn describe_leaf(der: &[u8], now: DateTime<Utc>) -> Result<LeafSummary, LookupError> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| LookupError::Certificate(e.to_string()))?;
    let validity = cert.validity();
    let instant = |t: ASN1Time| {
        DateTime::from_timestamp(t.timestamp(), 0)
            .ok_or_else(|| LookupError::Certificate("validity out of range".into()))
    };
    let not_before = instant(validity.not_before)?;
    let not_after = instant(validity.not_after)?;

    let san = match cert.subject_alternative_name() {
        Ok(Some(ext)) => ext
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(LeafSummary {
        not_before,
        not_after,
        seconds_remaining: (not_after - now).num_seconds(),
        issuer: cert.issuer().to_string(),
        subject: cert.subject().to_string(),
        san,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const LEAF: &[u8] = include_bytes!("../tests/fixtures/leaf.der");
    const NOT_BEFORE: i64 = 1_792_159_143;
    const NOT_AFTER: i64 = 2_107_519_143;

    #[rstest]
    #[case("example.com", "example.com", 443)]
    #[case("example.com:8443", "example.com", 8443)]
    #[case("example.com:https", "example.com", 443)]
    #[case("[::1]:8443", "::1", 8443)]
    #[case("[::1]", "::1", 443)]
    #[case(" example.com ", "example.com", 443)]
    fn splits_host_and_port(#[case] raw: &str, #[case] host: &str, #[case] port: u16) {
        assert_eq!(parse_host_port(raw), (host.to_string(), port));
    }

    #[test]
    fn reads_fixture_leaf() {
        let now = DateTime::from_timestamp(NOT_BEFORE + 86_400, 0).unwrap();
        let leaf = describe_leaf(LEAF, now).unwrap();
        assert_eq!(leaf.not_before.timestamp(), NOT_BEFORE);
        assert_eq!(leaf.not_after.timestamp(), NOT_AFTER);
        assert_eq!(leaf.seconds_remaining, NOT_AFTER - NOT_BEFORE - 86_400);
        assert_eq!(leaf.san, vec!["relay.test", "www.relay.test"]);
        assert!(leaf.subject.contains("CN=relay.test"), "{}", leaf.subject);
        assert!(leaf.issuer.contains("O=Relay Test"), "{}", leaf.issuer);
    }

    #[test]
    fn summary_becomes_successful_info() {
        let now = DateTime::from_timestamp(NOT_AFTER - 43_200, 0).unwrap();
        let info = describe_leaf(LEAF, now).unwrap().into_info("relay.test", 443);
        assert!(info.success);
        assert_eq!(info.error, None);
        assert_eq!(info.not_after_ts, Some(NOT_AFTER));
        assert_eq!(info.seconds_remaining, Some(43_200));
        assert_eq!(info.days_remaining, Some(0.5));
        assert_eq!(info.not_after.as_deref(), Some("2036-10-13T13:59:03+00:00"));
    }

    #[test]
    fn garbage_is_a_certificate_error() {
        let err = describe_leaf(b"not a certificate", Utc::now()).unwrap_err();
        assert!(matches!(err, LookupError::Certificate(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_reported_not_raised() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let inspector = CertInspector::new().unwrap();
        let info = inspector
            .inspect("127.0.0.1", port, Duration::from_secs(2))
            .await;
        assert!(!info.success);
        assert_eq!(info.port, port);
        assert!(info.error.unwrap().contains("connecting to"));
    }
}
