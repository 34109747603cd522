//! Minimum-interval scheduling for outbound catalog requests.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;

const MIN_POLL_STEP: Duration = Duration::from_millis(1);
const MAX_POLL_STEP: Duration = Duration::from_millis(50);

/// Blocks until the next outbound request may be sent.
pub trait RequestPacer {
    fn wait_turn(&mut self);
}

/// Spaces requests at least `interval` apart; the first request is not delayed.
pub struct GovernorPacer {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    poll_step: Duration,
}

impl GovernorPacer {
    /// Returns `None` for a zero interval, which cannot be expressed as a quota.
    pub fn with_interval(interval: Duration) -> Option<Self> {
        let quota = Quota::with_period(interval)?.allow_burst(NonZeroU32::MIN);
        Some(Self {
            limiter: RateLimiter::direct(quota),
            poll_step: (interval / 20).clamp(MIN_POLL_STEP, MAX_POLL_STEP),
        })
    }
}

impl RequestPacer for GovernorPacer {
    fn wait_turn(&mut self) {
        let mut waited = false;
        while self.limiter.check().is_err() {
            waited = true;
            std::thread::sleep(self.poll_step);
        }
        if waited {
            debug!("Request pacer released after waiting for the next slot");
        }
    }
}

/// Never waits. Used when the configured interval is zero.
#[derive(Debug, Default)]
pub struct UnpacedPacer;

impl RequestPacer for UnpacedPacer {
    fn wait_turn(&mut self) {}
}

pub fn pacer_for_interval_ms(interval_ms: u64) -> Box<dyn RequestPacer> {
    match GovernorPacer::with_interval(Duration::from_millis(interval_ms)) {
        Some(pacer) => Box::new(pacer),
        None => Box::new(UnpacedPacer),
    }
}
