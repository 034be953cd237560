//! # Error Policy
//!
//! Retry decisions for failed queue items.
//!
//! - Non-retryable errors (malformed keys, unencodable values) are dropped on
//!   the first failure.
//! - Retryable errors are requeued with per-item backoff until the item has
//!   been delivered `max_retries` times, then dropped.
//!
//! A dropped item is logged with its identity and last error and counted in
//! `stargazer_items_dropped_total`. The process keeps running; only that
//! object's datastore state goes stale until its next watch event.

use crate::controller::handlers::SyncError;
use crate::controller::identity::QueueEvent;
use crate::controller::queue::WorkQueue;
use crate::observability;
use tracing::{error, warn};

/// What to do with an item whose sync failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the item back after its backoff delay
    Requeue,
    /// The error cannot be fixed by retrying
    DropNonRetryable,
    /// The item has used up its deliveries
    DropExhausted,
}

/// Decide the fate of an item on its `attempts`-th failed delivery
pub fn decide(error: &SyncError, attempts: u32, max_retries: u32) -> RetryDecision {
    if !error.is_retryable() {
        RetryDecision::DropNonRetryable
    } else if attempts < max_retries {
        RetryDecision::Requeue
    } else {
        RetryDecision::DropExhausted
    }
}

/// Apply the retry policy to a failed item
///
/// Must be called before the item is released with [`WorkQueue::done`].
pub fn handle_sync_error(
    queue: &WorkQueue,
    event: &QueueEvent,
    error: &SyncError,
    max_retries: u32,
) -> RetryDecision {
    let kind = queue.name().to_string();
    let attempts = queue.num_requeues(&event.identity).saturating_add(1);
    let decision = decide(error, attempts, max_retries);

    match decision {
        RetryDecision::Requeue => {
            warn!(
                kind = %kind,
                identity = %event.identity,
                operation = %event.operation,
                attempt = attempts,
                max_retries,
                error = %error,
                "Error syncing item, will retry"
            );
            observability::metrics::increment_requeues(&kind);
            queue.add_rate_limited(event.clone());
        }
        RetryDecision::DropNonRetryable | RetryDecision::DropExhausted => {
            error!(
                kind = %kind,
                identity = %event.identity,
                operation = %event.operation,
                attempt = attempts,
                retryable = error.is_retryable(),
                error = %error,
                "Error syncing item, giving up"
            );
            observability::metrics::increment_items_dropped(&kind);
            queue.forget(&event.identity);
        }
    }

    decision
}
