//! Per-authority request pacing.
//!
//! Each outbound authority call waits for its governor permit via
//! `until_ready()`, which spaces requests at the configured rate. Failed
//! calls are never retried (single-attempt policy), so a fixed quota per
//! authority is enough.

use std::collections::HashMap;
use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Fixed-rate limiters keyed by authority name.
pub struct AuthorityLimiters {
    limiters: HashMap<String, DirectLimiter>,
}

impl AuthorityLimiters {
    /// Default pacing for the known authorities and the DOI resolver.
    pub fn new() -> Self {
        let mut limiters = HashMap::new();
        limiters.insert("CrossRef".to_string(), per_second(2));
        limiters.insert("Semantic Scholar".to_string(), per_second(1));
        limiters.insert("PubMed".to_string(), per_second(3));
        limiters.insert("doi.org".to_string(), per_second(5));
        Self { limiters }
    }

    /// Wait until a request to `name` is allowed. Unknown names pass
    /// immediately (mocks, tests).
    pub async fn until_ready(&self, name: &str) {
        if let Some(limiter) = self.limiters.get(name) {
            limiter.until_ready().await;
        }
    }
}

impl Default for AuthorityLimiters {
    fn default() -> Self {
        Self::new()
    }
}

fn per_second(n: u32) -> DirectLimiter {
    let quota = Quota::per_second(NonZeroU32::new(n.max(1)).unwrap());
    RateLimiter::direct(quota)
}
