use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How often the background sweeper scans the visitor table.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Visitors idle longer than this are evicted.
const VISITOR_MAX_IDLE: Duration = Duration::from_secs(180);

/// Classic token bucket: capacity = burst, continuous refill.
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_minute: u32, now: Instant) -> Self {
        let capacity = f64::from(rate_per_minute.max(1));
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: f64::from(rate_per_minute) / 60.0,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_per_sec)
            .min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one whole token is available again.
    fn retry_after(&self, now: Instant) -> Duration {
        let mut probe = self.clone();
        probe.refill(now);
        let deficit = (1.0 - probe.tokens).max(0.0);
        if self.refill_per_sec <= 0.0 {
            return Duration::from_secs(60);
        }
        Duration::from_secs_f64(deficit / self.refill_per_sec)
    }
}

struct Visitor {
    bucket: TokenBucket,
    last_seen: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

/// Per-IP admission control. Burst equals the per-minute rate, matching the
/// upstream configuration contract.
pub struct RateLimiter {
    visitors: DashMap<IpAddr, Visitor>,
    rate_per_minute: u32,
}

impl RateLimiter {
    pub fn new(rate_per_minute: u32) -> Self {
        Self {
            visitors: DashMap::new(),
            rate_per_minute,
        }
    }

    /// Consume one token for `ip`, creating the visitor on first sight.
    pub fn check(&self, ip: IpAddr) -> RateDecision {
        let now = Instant::now();
        let mut visitor = self
            .visitors
            .entry(ip)
            .or_insert_with(|| Visitor {
                bucket: TokenBucket::new(self.rate_per_minute, now),
                last_seen: now,
            });
        visitor.last_seen = now;

        if visitor.bucket.try_consume(now) {
            RateDecision::Allowed
        } else {
            RateDecision::Limited {
                retry_after: visitor.bucket.retry_after(now),
            }
        }
    }

    pub fn visitor_count(&self) -> usize {
        self.visitors.len()
    }

    /// Drop visitors idle longer than `max_idle`. Bounds memory against
    /// long-tail IP churn.
    pub fn evict_idle(&self, max_idle: Duration) {
        let now = Instant::now();
        self.visitors
            .retain(|_, visitor| now.saturating_duration_since(visitor.last_seen) < max_idle);
    }

    pub async fn run_sweeper(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("rate limit sweeper stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let before = self.visitors.len();
                    self.evict_idle(VISITOR_MAX_IDLE);
                    let after = self.visitors.len();
                    if before != after {
                        tracing::debug!(evicted = before - after, "rate limit visitors evicted");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[tokio::test]
    async fn burst_is_rate_per_minute() {
        let limiter = RateLimiter::new(2);
        assert_eq!(limiter.check(ip(1)), RateDecision::Allowed);
        assert_eq!(limiter.check(ip(1)), RateDecision::Allowed);
        assert!(matches!(
            limiter.check(ip(1)),
            RateDecision::Limited { .. }
        ));
    }

    #[tokio::test]
    async fn ips_are_limited_independently() {
        let limiter = RateLimiter::new(1);
        assert_eq!(limiter.check(ip(1)), RateDecision::Allowed);
        assert!(matches!(limiter.check(ip(1)), RateDecision::Limited { .. }));
        assert_eq!(limiter.check(ip(2)), RateDecision::Allowed);
        assert_eq!(limiter.visitor_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_refill_over_time() {
        let limiter = RateLimiter::new(60); // one token per second
        for _ in 0..60 {
            assert_eq!(limiter.check(ip(1)), RateDecision::Allowed);
        }
        assert!(matches!(limiter.check(ip(1)), RateDecision::Limited { .. }));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(limiter.check(ip(1)), RateDecision::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_covers_the_deficit() {
        let limiter = RateLimiter::new(60); // refills 1/s
        for _ in 0..60 {
            let _ = limiter.check(ip(1));
        }
        match limiter.check(ip(1)) {
            RateDecision::Limited { retry_after } => {
                assert!(retry_after <= Duration::from_secs(1));
                assert!(retry_after > Duration::ZERO);
            }
            RateDecision::Allowed => panic!("expected limit"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_visitors_are_evicted() {
        let limiter = RateLimiter::new(10);
        let _ = limiter.check(ip(1));
        let _ = limiter.check(ip(2));
        assert_eq!(limiter.visitor_count(), 2);

        tokio::time::advance(Duration::from_secs(60)).await;
        let _ = limiter.check(ip(2)); // keep this one fresh
        tokio::time::advance(Duration::from_secs(150)).await;

        limiter.evict_idle(VISITOR_MAX_IDLE);
        assert_eq!(limiter.visitor_count(), 1);
        assert!(limiter.visitors.contains_key(&ip(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_until_cancelled() {
        let limiter = Arc::new(RateLimiter::new(10));
        let _ = limiter.check(ip(1));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(limiter.clone().run_sweeper(cancel.clone()));
        tokio::task::yield_now().await;

        tokio::time::advance(VISITOR_MAX_IDLE + SWEEP_INTERVAL).await;
        tokio::task::yield_now().await;
        assert_eq!(limiter.visitor_count(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
