//! Token-bucket rate limiting per object-store prefix. On an
//! explicit slow-down response the refill rate halves for a cool-down
//! window, then recovers gradually back to its configured rate.

use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct AdaptivePrefixLimiter {
    configured_rate: u32,
    current_rate: AtomicU32,
    limiter: RwLock<DirectLimiter>,
    cooldown: Duration,
    slowed_down_at: RwLock<Option<Instant>>,
}

fn build_limiter(rate_per_sec: u32) -> DirectLimiter {
    let rate = NonZeroU32::new(rate_per_sec.max(1)).unwrap();
    RateLimiter::direct(Quota::per_second(rate))
}

impl AdaptivePrefixLimiter {
    pub fn new(requests_per_second: u32, cooldown: Duration) -> Self {
        Self {
            configured_rate: requests_per_second,
            current_rate: AtomicU32::new(requests_per_second),
            limiter: RwLock::new(build_limiter(requests_per_second)),
            cooldown,
            slowed_down_at: RwLock::new(None),
        }
    }

    /// Blocks until a request slot is available.
    pub async fn acquire(&self) {
        self.maybe_recover();
        loop {
            let outcome = { self.limiter.read().unwrap().check() };
            match outcome {
                Ok(()) => return,
                Err(not_until) => {
                    let wait = not_until.wait_time_from(governor::clock::DefaultClock::default().now());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Called on an explicit slow-down / throttling response from the
    /// backend: halves the refill rate for `self.cooldown`.
    pub fn on_slow_down(&self) {
        let new_rate = (self.current_rate.load(Ordering::SeqCst) / 2).max(1);
        self.current_rate.store(new_rate, Ordering::SeqCst);
        *self.limiter.write().unwrap() = build_limiter(new_rate);
        *self.slowed_down_at.write().unwrap() = Some(Instant::now());
    }

    /// Steps the rate back toward `configured_rate` once the cooldown has
    /// elapsed. Called opportunistically before each acquire.
    fn maybe_recover(&self) {
        let due = {
            let guard = self.slowed_down_at.read().unwrap();
            matches!(*guard, Some(at) if at.elapsed() >= self.cooldown)
        };
        if !due {
            return;
        }
        let current = self.current_rate.load(Ordering::SeqCst);
        if current >= self.configured_rate {
            *self.slowed_down_at.write().unwrap() = None;
            return;
        }
        let recovered = (current * 2).min(self.configured_rate);
        self.current_rate.store(recovered, Ordering::SeqCst);
        *self.limiter.write().unwrap() = build_limiter(recovered);
        *self.slowed_down_at.write().unwrap() = Some(Instant::now());
    }

    pub fn current_rate(&self) -> u32 {
        self.current_rate.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_down_halves_rate() {
        let limiter = AdaptivePrefixLimiter::new(100, Duration::from_secs(60));
        limiter.on_slow_down();
        assert_eq!(limiter.current_rate(), 50);
    }

    #[test]
    fn slow_down_floor_is_one() {
        let limiter = AdaptivePrefixLimiter::new(1, Duration::from_secs(60));
        limiter.on_slow_down();
        assert_eq!(limiter.current_rate(), 1);
    }
}
