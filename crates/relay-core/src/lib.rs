//! relay-core: the polling-and-forwarding notifier and its building blocks.
//!
//! # Architecture
//!
//! ```text
//! CursorStore ──► Source ──► Renderer ──► batch ──► Sink
//!      ▲                                             │
//!      └──────────────── save after delivery ────────┘
//! ```
//!
//! Concrete sources and sinks live in `relay-feeds`; this crate only defines
//! the seams, the cycle, and the supporting pieces (retry policy, TTL cache,
//! configuration).

pub mod cache;
pub mod config;
pub mod error;
pub mod notifier;
pub mod render;
pub mod retry;
pub mod store;
pub mod types;

pub use error::{ConfigError, CycleError, DeliveryError, StorageError, UpstreamError};
pub use notifier::{CycleOutcome, Notifier, NotifierState, Sink, Source};
pub use render::{BatchFormat, Renderer};
pub use retry::RetryPolicy;
pub use store::{CursorStore, FileCursorStore, MemoryCursorStore};
pub use types::{Cursor, Delivered, DeliveryResult, Item, RenderedMessage};
