//! Blocking minimum-interval gate for outbound provider calls.

use std::num::NonZeroU32;
use std::thread;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Allows one call per `period`, blocking callers until their slot opens.
pub struct Throttle {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl Throttle {
    pub fn new(period: Duration) -> Self {
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Blocks until the next call is allowed.
    pub fn wait(&self) {
        while self.limiter.check().is_err() {
            thread::sleep(POLL_INTERVAL);
        }
    }
}
