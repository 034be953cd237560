//! # Work Queue
//!
//! Deduplicating, rate-limited work queue of resource identities.
//!
//! - An identity is pending at most once; re-adding it only replaces the
//!   pending operation, so the latest operation wins.
//! - An identity handed to a worker is not handed out again until that worker
//!   calls [`WorkQueue::done`]. Adds that arrive meanwhile are held back and
//!   queued by `done`.
//! - [`WorkQueue::add_rate_limited`] re-adds an identity after its per-item
//!   backoff delay.
//! - After [`WorkQueue::shut_down`], adds are ignored, the remaining items are
//!   still handed out, and [`WorkQueue::get`] returns `None` once the queue is
//!   empty.

use crate::controller::backoff::ItemBackoff;
use crate::controller::identity::{Operation, QueueEvent, ResourceIdentity};
use crate::observability::metrics;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug)]
struct QueueState {
    /// Identities ready to be handed out, in arrival order
    queue: VecDeque<ResourceIdentity>,
    /// Pending operation per identity; an identity is pending iff present
    dirty: HashMap<ResourceIdentity, Operation>,
    /// Identities currently held by a worker
    processing: HashSet<ResourceIdentity>,
    backoff: ItemBackoff,
    shutting_down: bool,
}

#[derive(Debug)]
struct Inner {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
}

/// Shared handle to a work queue
#[derive(Debug, Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl WorkQueue {
    /// Create a queue whose metrics are labelled `name`
    pub fn new(name: impl Into<String>, backoff: ItemBackoff) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    dirty: HashMap::new(),
                    processing: HashSet::new(),
                    backoff,
                    shutting_down: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Mark `event.identity` as needing processing with `event.operation`
    pub fn add(&self, event: QueueEvent) {
        let QueueEvent {
            identity,
            operation,
        } = event;
        let mut state = self.lock();
        if state.shutting_down {
            trace!(queue = %self.inner.name, identity = %identity, "Ignoring add after shutdown");
            return;
        }

        if let Some(pending) = state.dirty.get_mut(&identity) {
            *pending = operation;
            return;
        }

        state.dirty.insert(identity.clone(), operation);
        if state.processing.contains(&identity) {
            return;
        }

        state.queue.push_back(identity);
        self.publish_depth(&state);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Wait for the next item
    ///
    /// Returns `None` once the queue has been shut down and drained.
    pub async fn get(&self) -> Option<QueueEvent> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(identity) = state.queue.pop_front() {
                    let operation = state.dirty.remove(&identity).unwrap_or(Operation::Update);
                    state.processing.insert(identity.clone());
                    self.publish_depth(&state);
                    return Some(QueueEvent::new(identity, operation));
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Release an identity handed out by [`get`](Self::get)
    ///
    /// If the identity was re-added while it was being processed it becomes
    /// ready again.
    pub fn done(&self, identity: &ResourceIdentity) {
        let mut state = self.lock();
        state.processing.remove(identity);
        if state.dirty.contains_key(identity) {
            state.queue.push_back(identity.clone());
            self.publish_depth(&state);
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Clear the backoff history of an identity
    pub fn forget(&self, identity: &ResourceIdentity) {
        self.lock().backoff.forget(identity);
    }

    /// Number of times an identity has been requeued since it was last forgotten
    pub fn num_requeues(&self, identity: &ResourceIdentity) -> u32 {
        self.lock().backoff.num_requeues(identity)
    }

    /// Re-add an event after its identity's backoff delay
    pub fn add_rate_limited(&self, event: QueueEvent) {
        let delay = {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            state.backoff.next_delay(&event.identity)
        };
        self.add_after(event, delay);
    }

    /// Add an event once `delay` has elapsed
    pub fn add_after(&self, event: QueueEvent, delay: Duration) {
        if delay.is_zero() {
            self.add(event);
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(event);
        });
    }

    /// Stop accepting new items and wake every waiting worker
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of items ready to be handed out
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The state is consistent after every statement, so a panic while the
        // lock was held cannot leave it half-updated.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_depth(&self, state: &QueueState) {
        metrics::set_queue_depth(&self.inner.name, state.queue.len());
    }
}
