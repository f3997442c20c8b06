//! Request pacing for quota-limited providers.
//!
//! [`RequestPacer`] is a token bucket: it holds up to `capacity` tokens and
//! refills one every `interval`. Each provider request takes one token, so
//! once the initial burst is spent consecutive requests start at least
//! `interval` apart. Time comes from an injected [`Clock`], which lets tests
//! drive the pacer with [`ManualClock`] instead of sleeping for real.
//!
//! Waiting is cancellable: [`RequestPacer::acquire`] returns
//! [`VaultError::Cancelled`] as soon as the supplied token fires.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::IndexerConfig;
use crate::error::{VaultError, VaultResult};

/// Monotonic time source.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time via tokio (honours `tokio::time::pause`).
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` advances time instantly and records the request.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.now) += by;
    }

    /// Every duration passed to [`Clock::sleep`], in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }

    pub fn total_slept(&self) -> Duration {
        lock(&self.sleeps).iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *lock(&self.now)
    }

    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Bucket {
    tokens: u32,
    /// Instant from which the next refill is measured.
    last_refill: Duration,
}

/// Token-bucket pacer shared by every request of an indexing run.
pub struct RequestPacer {
    clock: Arc<dyn Clock>,
    capacity: u32,
    interval: Duration,
    bucket: Mutex<Bucket>,
}

impl RequestPacer {
    /// `capacity` is clamped to at least 1.
    pub fn new(clock: Arc<dyn Clock>, capacity: u32, interval: Duration) -> Self {
        let capacity = capacity.max(1);
        let now = clock.now();
        Self {
            clock,
            capacity,
            interval,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: now,
            }),
        }
    }

    pub fn from_config(config: &IndexerConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            clock,
            config.burst,
            Duration::from_secs(config.batch_delay_secs),
        )
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Take one token, waiting for a refill if the bucket is empty.
    pub async fn acquire(&self, cancel: &CancellationToken) -> VaultResult<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(VaultError::Cancelled);
            }

            let wait = match self.try_take() {
                None => return Ok(()),
                Some(wait) => wait,
            };

            tracing::debug!(wait_ms = wait.as_millis() as u64, "pacing provider request");
            tokio::select! {
                _ = cancel.cancelled() => return Err(VaultError::Cancelled),
                _ = self.clock.sleep(wait) => {}
            }
        }
    }

    /// Returns `None` if a token was taken, else how long until the next one.
    fn try_take(&self) -> Option<Duration> {
        let now = self.clock.now();
        let mut bucket = lock(&self.bucket);

        if self.interval.is_zero() {
            return None;
        }

        let elapsed = now.saturating_sub(bucket.last_refill);
        let refills = elapsed.as_nanos() / self.interval.as_nanos();
        if refills > 0 {
            let added = u32::try_from(refills).unwrap_or(u32::MAX);
            bucket.tokens = bucket.tokens.saturating_add(added).min(self.capacity);
            bucket.last_refill += self.interval * added.min(self.capacity);
        }
        // A full bucket earns nothing while idle; the refill clock restarts
        // when the first token is spent.
        if bucket.tokens == self.capacity {
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            return None;
        }

        let since = now.saturating_sub(bucket.last_refill);
        Some(self.interval.saturating_sub(since).max(Duration::from_nanos(1)))
    }
}
