//! Bounded retry with exponential backoff for outbound requests.
//!
//! [`RetryPolicy`] is a plain value handed to a sink; it owns the three
//! decisions a retry loop needs: how many attempts, how long to wait before
//! the next one, and which failures are worth another attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::DeliveryError;

/// Status that is always retried, regardless of the configured set.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// The endpoint answered with a non-success status.
    Status { status: u16, body: String },
    /// The request never produced a response (connect error, timeout, ...).
    Transport(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Status { status, body } if body.is_empty() => write!(f, "HTTP {status}"),
            AttemptError::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            AttemptError::Transport(detail) => f.write_str(detail),
        }
    }
}

/// A value together with the number of attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// The last failure once the policy gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub error: AttemptError,
    pub attempts: u32,
    /// False when the failure was not retriable and the loop stopped early.
    pub exhausted: bool,
}

impl From<RetryFailure> for DeliveryError {
    fn from(failure: RetryFailure) -> Self {
        match failure.error {
            AttemptError::Status { status, .. } => DeliveryError::Status {
                status,
                attempts: failure.attempts,
            },
            AttemptError::Transport(detail) => DeliveryError::Transport {
                detail,
                attempts: failure.attempts,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Never less than one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Statuses treated as transient, in addition to 429.
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            retry_statuses: vec![500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn is_retriable_status(&self, status: u16) -> bool {
        status == TOO_MANY_REQUESTS || self.retry_statuses.contains(&status)
    }

    pub fn is_retriable(&self, error: &AttemptError) -> bool {
        match error {
            AttemptError::Status { status, .. } => self.is_retriable_status(*status),
            AttemptError::Transport(_) => true,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retriable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<Attempted<T>, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(Attempted { value, attempts: attempt }),
                Err(error) => {
                    let retriable = self.is_retriable(&error);
                    if !retriable || attempt >= max_attempts {
                        return Err(RetryFailure {
                            error,
                            attempts: attempt,
                            exhausted: retriable,
                        });
                    }
                    let delay = self.backoff(attempt);
                    tracing::debug!(attempt, ?delay, %error, "transient failure; backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
