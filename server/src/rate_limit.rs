//! Per-connection flood control for inbound chat frames.
//!
//! Each authorized connection has a token bucket that refills over time.
//! Every inbound frame consumes one token; a frame arriving with the bucket
//! empty is dropped (the connection stays open and is told nothing). This
//! bounds how fast one client can make the gateway rebroadcast on its
//! behalf.
//!
//! Buckets are removed when their connection disconnects. A periodic sweep
//! backstops that cleanup in case a connection's teardown path is skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::registry::ConnectionId;

/// Default refill rate: 25 frames per second per connection.
pub const DEFAULT_RATE: f64 = 25.0;

/// Default bucket capacity: bursts of up to 50 frames.
pub const DEFAULT_CAPACITY: u32 = 50;

/// Duration after which an inactive bucket is swept.
pub const STALE_ENTRY_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of a flood-control check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    /// The frame may be relayed.
    Allowed,

    /// The connection is over its budget; the frame is dropped.
    Limited {
        /// Seconds until the connection has budget again, for logging.
        retry_after_secs: u64,
    },
}

impl RateLimitResult {
    /// Returns `true` if the frame may be relayed.
    #[inline]
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// A token bucket tracking one connection's frame budget.
///
/// The bucket starts full, refills at a constant rate, and caps at its
/// capacity.
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    capacity: u32,
    rate: f64,
}

impl TokenBucket {
    fn new(rate: f64, capacity: u32) -> Self {
        Self {
            tokens: f64::from(capacity),
            last_refill: Instant::now(),
            capacity,
            rate,
        }
    }

    fn try_consume(&mut self) -> RateLimitResult {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            RateLimitResult::Allowed
        } else {
            let tokens_needed = 1.0 - self.tokens;
            let retry_after_secs = ((tokens_needed / self.rate).ceil() as u64).max(1);
            RateLimitResult::Limited { retry_after_secs }
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_secs = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed_secs * self.rate).min(f64::from(self.capacity));
        self.last_refill = now;
    }

    fn time_since_last_activity(&self) -> Duration {
        self.last_refill.elapsed()
    }
}

/// Thread-safe flood controller with one bucket per connection.
///
/// Cloning is cheap; clones share the bucket table.
///
/// # Example
///
/// ```rust
/// use eventplat_server::rate_limit::MessageRateLimiter;
/// use eventplat_server::registry::ConnectionId;
///
/// #[tokio::main]
/// async fn main() {
///     let limiter = MessageRateLimiter::new(25.0, 50);
///     let conn = ConnectionId::new();
///
///     assert!(limiter.check(conn).await.is_allowed());
///
///     // On disconnect:
///     limiter.remove(conn).await;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MessageRateLimiter {
    inner: Arc<RwLock<LimiterInner>>,
}

#[derive(Debug)]
struct LimiterInner {
    buckets: HashMap<ConnectionId, TokenBucket>,
    rate: f64,
    capacity: u32,
}

impl MessageRateLimiter {
    /// Creates a limiter refilling `rate` tokens/sec with the given burst
    /// capacity per connection.
    #[must_use]
    pub fn new(rate: f64, capacity: u32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LimiterInner {
                buckets: HashMap::new(),
                rate,
                capacity,
            })),
        }
    }

    /// Creates a limiter with [`DEFAULT_RATE`] and [`DEFAULT_CAPACITY`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_RATE, DEFAULT_CAPACITY)
    }

    /// Consumes one token for the connection, creating its bucket on first
    /// use.
    pub async fn check(&self, connection_id: ConnectionId) -> RateLimitResult {
        let mut inner = self.inner.write().await;

        let rate = inner.rate;
        let capacity = inner.capacity;

        inner
            .buckets
            .entry(connection_id)
            .or_insert_with(|| TokenBucket::new(rate, capacity))
            .try_consume()
    }

    /// Drops the bucket for a disconnected connection.
    pub async fn remove(&self, connection_id: ConnectionId) {
        self.inner.write().await.buckets.remove(&connection_id);
    }

    /// Sweeps buckets inactive for longer than [`STALE_ENTRY_TIMEOUT`].
    ///
    /// Returns the number of buckets removed.
    pub async fn cleanup_stale_entries(&self) -> usize {
        self.cleanup_stale_entries_with_timeout(STALE_ENTRY_TIMEOUT)
            .await
    }

    /// Sweeps buckets inactive for longer than `timeout`.
    pub async fn cleanup_stale_entries_with_timeout(&self, timeout: Duration) -> usize {
        let mut inner = self.inner.write().await;
        let initial_count = inner.buckets.len();

        inner
            .buckets
            .retain(|_, bucket| bucket.time_since_last_activity() < timeout);

        initial_count - inner.buckets.len()
    }

    /// Number of connections currently tracked.
    pub async fn tracked_connections(&self) -> usize {
        self.inner.read().await.buckets.len()
    }

    /// Spawns a background task sweeping stale buckets every
    /// `cleanup_interval`.
    pub fn spawn_cleanup_task(&self, cleanup_interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);

            loop {
                interval.tick().await;
                let removed = limiter.cleanup_stale_entries().await;
                if removed > 0 {
                    tracing::debug!(removed_count = removed, "Swept stale rate limit buckets");
                }
            }
        })
    }
}

impl Default for MessageRateLimiter {
    fn default() -> Self {
        Self::with_defaults()
    }
}
