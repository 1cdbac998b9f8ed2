use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use app_config::TokenBucketSettings;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Outcome of taking a token for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the next token is available; zero when allowed.
    pub retry_after: u64,
}

/// Token bucket per client key: `burst` tokens of capacity, refilled
/// continuously at `rate_per_second`.
#[derive(Debug, Clone)]
pub struct TokenBucketLimiter {
    buckets: Arc<RwLock<HashMap<String, Bucket>>>,
    rate_per_second: f64,
    burst: u32,
    cleanup_interval: Duration,
    last_cleanup: Arc<RwLock<Instant>>,
}

impl TokenBucketLimiter {
    pub fn new(rate_per_second: f64, burst: u32) -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            rate_per_second,
            burst: burst.max(1),
            cleanup_interval: Duration::from_secs(300), // 5 minutes
            last_cleanup: Arc::new(RwLock::new(Instant::now())),
        }
    }

    pub fn from_settings(settings: &TokenBucketSettings) -> Self {
        Self::new(settings.rate_per_second, settings.burst)
    }

    /// Set cleanup interval
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    pub async fn try_acquire(&self, key: &str) -> RateLimitDecision {
        self.try_acquire_at(key, Instant::now()).await
    }

    pub(crate) async fn try_acquire_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut buckets = self.buckets.write().await;
        self.cleanup(&mut buckets, now).await;

        let capacity = f64::from(self.burst);
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_second).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateLimitDecision {
                allowed: true,
                limit: self.burst,
                remaining: bucket.tokens.floor() as u32,
                retry_after: 0,
            }
        } else {
            let missing = 1.0 - bucket.tokens;
            let wait = if self.rate_per_second > 0.0 {
                (missing / self.rate_per_second).ceil() as u64
            } else {
                u64::MAX
            };
            RateLimitDecision {
                allowed: false,
                limit: self.burst,
                remaining: 0,
                retry_after: wait.max(1),
            }
        }
    }

    /// Number of clients currently tracked.
    pub async fn tracked_clients(&self) -> usize {
        self.buckets.read().await.len()
    }

    /// Drop buckets that have refilled completely; they are indistinguishable
    /// from a fresh bucket.
    async fn cleanup(&self, buckets: &mut HashMap<String, Bucket>, now: Instant) {
        let mut last_cleanup = self.last_cleanup.write().await;

        if now.saturating_duration_since(*last_cleanup) >= self.cleanup_interval {
            let capacity = f64::from(self.burst);
            let before = buckets.len();
            buckets.retain(|_, bucket| {
                let idle = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens + idle * self.rate_per_second < capacity
            });
            tracing::debug!(evicted = before - buckets.len(), "Evicted idle rate limit buckets");
            *last_cleanup = now;
        }
    }
}
