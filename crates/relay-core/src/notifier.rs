//! Notifier: the fetch → render → deliver → persist loop.
//!
//! One [`Notifier`] owns one source, one renderer, one sink and one cursor
//! store. Cycles never overlap: [`Notifier::run`] drives them from a single
//! task, and a tick that comes due while a cycle is still in flight is
//! skipped.
//!
//! ```text
//!            tick                    ≥1 item
//!   Idle ───────────► Polling ───────────────► Delivering
//!    ▲                   │ empty / error            │ delivered → save cursor
//!    └───────────────────┴──────────────────────────┘ failed → cursor untouched
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::error::{CycleError, UpstreamError};
use crate::render::{BatchFormat, Renderer};
use crate::store::CursorStore;
use crate::types::{compare_ids, sort_by_recency, Cursor, DeliveryResult, Item, RenderedMessage};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Upstream read API.
#[async_trait]
pub trait Source: Send + Sync {
    type Item: Item;

    /// Items strictly newer than `since`, in any order.
    async fn fetch(&self, since: &Cursor) -> Result<Vec<Self::Item>, UpstreamError>;
}

/// Downstream delivery channel.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn deliver(&self, message: &RenderedMessage) -> DeliveryResult;
}

#[async_trait]
impl<S: Source + ?Sized> Source for std::sync::Arc<S> {
    type Item = S::Item;

    async fn fetch(&self, since: &Cursor) -> Result<Vec<Self::Item>, UpstreamError> {
        (**self).fetch(since).await
    }
}

#[async_trait]
impl<K: Sink + ?Sized> Sink for std::sync::Arc<K> {
    async fn deliver(&self, message: &RenderedMessage) -> DeliveryResult {
        (**self).deliver(message).await
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierState {
    Idle,
    Polling,
    Delivering,
}

impl std::fmt::Display for NotifierState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifierState::Idle => write!(f, "idle"),
            NotifierState::Polling => write!(f, "polling"),
            NotifierState::Delivering => write!(f, "delivering"),
        }
    }
}

/// What a completed cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing new upstream; nothing sent, cursor untouched.
    Empty,
    /// A batch went out. `persisted` is false when the cursor write failed;
    /// the next cycle will then re-deliver the same items.
    Delivered {
        count: usize,
        cursor: Cursor,
        persisted: bool,
    },
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

pub struct Notifier<S, R, K, C> {
    name: String,
    source: S,
    renderer: R,
    sink: K,
    store: C,
    target: String,
    batch: BatchFormat,
    state: NotifierState,
}

impl<S, R, K, C> Notifier<S, R, K, C>
where
    S: Source,
    R: Renderer<S::Item>,
    K: Sink,
    C: CursorStore,
{
    pub fn new(
        name: impl Into<String>,
        source: S,
        renderer: R,
        sink: K,
        store: C,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            renderer,
            sink,
            store,
            target: target.into(),
            batch: BatchFormat::default(),
            state: NotifierState::Idle,
        }
    }

    pub fn with_batch_format(mut self, batch: BatchFormat) -> Self {
        self.batch = batch;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> NotifierState {
        self.state
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    /// Run exactly one cycle. Errors leave the cursor where it was.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let result = self.cycle().await;
        self.state = NotifierState::Idle;
        result
    }

    async fn cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        self.state = NotifierState::Polling;
        let since = self.store.load().map_err(CycleError::Load)?;
        debug!(cursor = %since, "fetching");

        let mut items = self.source.fetch(&since).await?;
        if items.is_empty() {
            debug!(cursor = %since, "no new items");
            return Ok(CycleOutcome::Empty);
        }

        self.state = NotifierState::Delivering;
        sort_by_recency(&mut items);
        let blocks: Vec<String> = items.iter().map(|item| self.renderer.render(item)).collect();
        let message = RenderedMessage {
            target: self.target.clone(),
            text: self.batch.assemble(&blocks),
        };

        let delivered = self.sink.deliver(&message).await?;
        // Highest id, not first by recency: the two can disagree.
        let newest = items
            .iter()
            .map(|item| item.id())
            .max_by(|a, b| compare_ids(a, b))
            .map_or(since, Cursor::new);
        info!(
            items = items.len(),
            attempts = delivered.attempts,
            cursor = %newest,
            "batch delivered"
        );

        let persisted = match self.store.save(&newest) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    error = %e,
                    cursor = %newest,
                    "delivered but cursor not saved; items may repeat"
                );
                false
            }
        };

        Ok(CycleOutcome::Delivered {
            count: items.len(),
            cursor: newest,
            persisted,
        })
    }

    /// Run a cycle and report its outcome through tracing.
    pub async fn tick(&mut self) -> Option<CycleOutcome> {
        let span = tracing::info_span!("cycle", notifier = %self.name);
        match self.run_cycle().instrument(span).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(
                    notifier = %self.name,
                    stage = e.stage(),
                    error = %e,
                    "cycle failed; will retry next tick"
                );
                None
            }
        }
    }

    /// Tick every `interval` until `shutdown` fires.
    ///
    /// The first cycle starts immediately. A tick that falls due while a cycle
    /// is still running is dropped, not queued. Cancellation abandons an in-flight
    /// cycle; since the cursor is only written after delivery, the next run
    /// re-fetches whatever was not confirmed.
    pub async fn run(mut self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let name = self.name.clone();
        let mut finished: Option<Instant> = None;
        info!(notifier = %name, ?interval, "notifier started");

        loop {
            let due = tokio::select! {
                _ = shutdown.cancelled() => break,
                due = ticker.tick() => due,
            };

            // The interval still yields one tick that fell due mid-cycle.
            if finished.is_some_and(|at| due < at) {
                debug!(notifier = %name, "previous cycle overran; skipping tick");
                continue;
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    warn!(notifier = %name, "shutdown during cycle; abandoning it");
                    break;
                }
                _ = self.tick() => {}
            }
            finished = Some(Instant::now());
        }

        info!(notifier = %name, "notifier stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
