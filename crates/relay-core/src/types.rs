//! Core types shared by every stage of a polling cycle.
//!
//! This module defines the durable [`Cursor`], the [`Item`] capability that
//! fetched upstream records expose to the notifier, the transient
//! [`RenderedMessage`], and the [`DeliveryResult`] a sink hands back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::DeliveryError;

/// Identity of the initial cursor, meaning "nothing has been delivered yet".
pub const INITIAL_CURSOR: &str = "0";

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Durable marker of the last successfully delivered item.
///
/// The value is opaque to the notifier; it only ever compares it against item
/// identities with [`compare_ids`]. A cursor is replaced after a confirmed
/// delivery and never rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no item has ever been delivered.
    pub fn is_initial(&self) -> bool {
        self.0 == INITIAL_CURSOR
    }

    /// True when `id` denotes an item strictly newer than this cursor.
    pub fn precedes(&self, id: &str) -> bool {
        compare_ids(&self.0, id) == Ordering::Less
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self(INITIAL_CURSOR.to_string())
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order two item identities.
///
/// Upstream ids are usually decimal snowflakes or compacted timestamps, which
/// must compare numerically (`"99" < "100"`). Purely numeric ids are compared
/// by magnitude; anything else falls back to lexicographic order.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    if numeric(a) && numeric(b) {
        let a = a.trim_start_matches('0');
        let b = b.trim_start_matches('0');
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    } else {
        a.cmp(b)
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// One unit fetched from an upstream source.
///
/// Items are immutable once fetched and live only for the current cycle.
pub trait Item: Send + Sync {
    /// Identity used to advance the cursor.
    fn id(&self) -> &str;

    /// Comparable recency field; the newest item is the one with the greatest value.
    fn recency(&self) -> DateTime<Utc>;

    /// Category discriminator (notification type, reading kind, ...).
    fn kind(&self) -> &str;
}

/// Sort items newest first. Equal recency falls back to identity order, newest
/// identity first; the sort is stable so fully identical keys keep fetch order.
pub fn sort_by_recency<I: Item>(items: &mut [I]) {
    items.sort_by(|a, b| {
        b.recency()
            .cmp(&a.recency())
            .then_with(|| compare_ids(b.id(), a.id()))
    });
}

// ---------------------------------------------------------------------------
// Messages and delivery
// ---------------------------------------------------------------------------

/// A text block derived from one or more items plus the delivery target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub target: String,
    pub text: String,
}

/// Successful delivery outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Number of HTTP attempts the sink needed, including the successful one.
    pub attempts: u32,
    /// Optional diagnostic detail from the endpoint (message id, etc).
    pub detail: Option<String>,
}

/// Outcome of handing a [`RenderedMessage`] to a sink.
pub type DeliveryResult = Result<Delivered, DeliveryError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
