//! Error taxonomy for relay.
//!
//! The three cycle errors ([`UpstreamError`], [`DeliveryError`],
//! [`StorageError`]) are recovered at the cycle boundary: the notifier logs
//! them and waits for the next tick. [`ConfigError`] is the only error that
//! stops the process, and only at startup.

use std::path::PathBuf;
use thiserror::Error;

/// Fetching from the upstream read API failed.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream response could not be decoded: {0}")]
    Decode(String),
    #[error("upstream reported an error: {0}")]
    Api(String),
}

/// The sink could not deliver a message, after exhausting its retry policy.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery failed after {attempts} attempt(s): HTTP {status}")]
    Status { status: u16, attempts: u32 },
    #[error("delivery failed after {attempts} attempt(s): {detail}")]
    Transport { detail: String, attempts: u32 },
    #[error("delivery rejected by endpoint: {0}")]
    Rejected(String),
}

/// The cursor could not be read or written.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("reading cursor file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing cursor file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cursor file {} is not valid JSON: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A failed cycle, tagged with the stage that failed.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("loading cursor: {0}")]
    Load(#[source] StorageError),
    #[error("fetching items: {0}")]
    Fetch(#[from] UpstreamError),
    #[error("delivering batch: {0}")]
    Deliver(#[from] DeliveryError),
}

impl CycleError {
    /// Short stage name used as a structured log field.
    pub fn stage(&self) -> &'static str {
        match self {
            CycleError::Load(_) => "load",
            CycleError::Fetch(_) => "fetch",
            CycleError::Deliver(_) => "deliver",
        }
    }
}

/// Startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    Load(#[from] config::ConfigError),
}
