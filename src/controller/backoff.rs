//! # Item Backoff
//!
//! Per-item exponential backoff for requeued work.
//!
//! Each identity has its own failure count. The n-th requeue of an identity
//! waits `base * 2^n`, capped at `max`. Forgetting an identity resets its
//! count so the next failure starts again at `base`.
//!
//! ## Usage
//!
//! ```rust
//! use stargazer::controller::backoff::ItemBackoff;
//! use stargazer::controller::identity::ResourceIdentity;
//! use std::time::Duration;
//!
//! let mut backoff = ItemBackoff::new(Duration::from_millis(5), Duration::from_secs(1000));
//! let id = ResourceIdentity::cluster("n1");
//! assert_eq!(backoff.next_delay(&id), Duration::from_millis(5));
//! assert_eq!(backoff.next_delay(&id), Duration::from_millis(10));
//! assert_eq!(backoff.next_delay(&id), Duration::from_millis(20));
//! backoff.forget(&id);
//! assert_eq!(backoff.next_delay(&id), Duration::from_millis(5));
//! ```

use crate::controller::identity::ResourceIdentity;
use std::collections::HashMap;
use std::time::Duration;

/// Exponential per-identity rate limiter
#[derive(Debug, Clone)]
pub struct ItemBackoff {
    /// Delay of the first requeue
    base: Duration,
    /// Upper bound of any delay
    max: Duration,
    /// Requeues since the identity was last forgotten
    failures: HashMap<ResourceIdentity, u32>,
}

impl ItemBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: HashMap::new(),
        }
    }

    /// Delay for the next requeue of `identity`, recording one more failure
    pub fn next_delay(&mut self, identity: &ResourceIdentity) -> Duration {
        let failures = self.num_requeues(identity);
        self.failures
            .insert(identity.clone(), failures.saturating_add(1));
        self.delay_for(failures)
    }

    /// Number of requeues recorded for `identity`
    pub fn num_requeues(&self, identity: &ResourceIdentity) -> u32 {
        self.failures.get(identity).copied().unwrap_or(0)
    }

    /// Clear the failure history of `identity`
    pub fn forget(&mut self, identity: &ResourceIdentity) {
        self.failures.remove(identity);
    }

    fn delay_for(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
