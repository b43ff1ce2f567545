//! Outbound rate limiting with a token bucket and a FIFO wait queue.
//!
//! `acquire()` never rejects. When the bucket is empty (or other callers are
//! already waiting) the caller is parked on a oneshot channel at the back of
//! the queue. A single drain task owns the job of handing out tokens to
//! parked callers in arrival order; it sleeps only as long as the next whole
//! token takes to accrue and exits as soon as the queue is empty.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Shortest sleep the drain task will schedule.
const MIN_DRAIN_INTERVAL: Duration = Duration::from_millis(1);

/// Errors raised when constructing a limiter.
#[derive(Debug, Error, PartialEq)]
pub enum RateLimiterError {
    #[error("burst capacity must be at least 1")]
    ZeroCapacity,

    #[error("refill rate must be a finite number greater than 0, got {0}")]
    InvalidRefillRate(f64),
}

/// Read-only snapshot of the limiter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterState {
    /// Tokens available right now (fractional).
    pub tokens: f64,
    pub capacity: u32,
    /// Callers currently parked waiting for a token.
    pub queue_length: usize,
    /// Tokens added per second.
    pub refill_rate: f64,
}

struct Waiter {
    id: u64,
    grant: oneshot::Sender<()>,
}

/// Token bucket plus its wait queue; always mutated under one lock.
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    queue: VecDeque<Waiter>,
    next_waiter_id: u64,
    draining: bool,
}

impl TokenBucket {
    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;
    }

    /// Hand whole tokens to the longest-waiting callers.
    ///
    /// Waiters whose receiver is already gone are skipped without spending a token.
    fn grant_waiters(&mut self) -> usize {
        let mut granted = 0;
        while self.tokens >= 1.0 {
            let Some(waiter) = self.queue.pop_front() else {
                break;
            };
            if waiter.grant.send(()).is_ok() {
                self.tokens -= 1.0;
                granted += 1;
            }
        }
        granted
    }
}

struct Shared {
    bucket: Mutex<TokenBucket>,
    capacity: u32,
    refill_rate: f64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TokenBucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Token bucket admission controller.
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    /// Create a limiter that starts full.
    pub fn new(capacity: u32, refill_rate: f64) -> Result<Self, RateLimiterError> {
        if capacity == 0 {
            return Err(RateLimiterError::ZeroCapacity);
        }
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(RateLimiterError::InvalidRefillRate(refill_rate));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                bucket: Mutex::new(TokenBucket {
                    tokens: f64::from(capacity),
                    last_refill: Instant::now(),
                    queue: VecDeque::new(),
                    next_waiter_id: 0,
                    draining: false,
                }),
                capacity,
                refill_rate,
            }),
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateLimiterError> {
        Self::new(config.burst_capacity, config.requests_per_second)
    }

    /// Wait for one token and consume it.
    ///
    /// Dropping the returned future before it completes gives up the place in
    /// the queue; a token granted to an abandoned caller goes back to the bucket.
    pub async fn acquire(&self) {
        let (id, rx) = {
            let mut bucket = self.shared.lock();
            bucket.refill(f64::from(self.shared.capacity), self.shared.refill_rate);

            // Fast path only when nobody is queued, so callers never overtake.
            if bucket.queue.is_empty() && bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return;
            }

            let id = bucket.next_waiter_id;
            bucket.next_waiter_id += 1;
            let (tx, rx) = oneshot::channel();
            bucket.queue.push_back(Waiter { id, grant: tx });

            let queue_length = bucket.queue.len();
            tracing::debug!(
                waiter = id,
                queue_length,
                tokens = bucket.tokens,
                "Rate limit reached, queueing request"
            );
            metrics::record_rate_limit_wait(queue_length);

            if !bucket.draining {
                bucket.draining = true;
                tokio::spawn(drain(Arc::clone(&self.shared)));
            }
            (id, rx)
        };

        PendingPermit {
            shared: &self.shared,
            id,
            rx,
            done: false,
        }
        .wait()
        .await;
    }

    /// Snapshot of the current state. Does not mutate the bucket.
    pub fn state(&self) -> LimiterState {
        let bucket = self.shared.lock();
        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        let capacity = f64::from(self.shared.capacity);
        LimiterState {
            tokens: (bucket.tokens + elapsed * self.shared.refill_rate).min(capacity),
            capacity: self.shared.capacity,
            queue_length: bucket.queue.len(),
            refill_rate: self.shared.refill_rate,
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("RateLimiter")
            .field("capacity", &state.capacity)
            .field("refill_rate", &state.refill_rate)
            .field("tokens", &state.tokens)
            .field("queue_length", &state.queue_length)
            .finish()
    }
}

/// A queued acquisition. Cleans up after itself if dropped early.
struct PendingPermit<'a> {
    shared: &'a Arc<Shared>,
    id: u64,
    rx: oneshot::Receiver<()>,
    done: bool,
}

impl PendingPermit<'_> {
    async fn wait(mut self) {
        if (&mut self.rx).await.is_err() {
            // Sender dropped without a grant: the limiter is being torn down.
            tracing::warn!(waiter = self.id, "Rate limiter dropped while request was queued");
        }
        self.done = true;
    }
}

impl Drop for PendingPermit<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }

        let mut bucket = self.shared.lock();
        if let Some(pos) = bucket.queue.iter().position(|w| w.id == self.id) {
            bucket.queue.remove(pos);
            tracing::debug!(waiter = self.id, "Queued request abandoned");
        } else if self.rx.try_recv().is_ok() {
            // Granted but never observed: return the token and pass it on.
            let capacity = f64::from(self.shared.capacity);
            bucket.tokens = (bucket.tokens + 1.0).min(capacity);
            bucket.grant_waiters();
            tracing::debug!(waiter = self.id, "Returned token granted to abandoned request");
        }
        metrics::record_queue_length(bucket.queue.len());
    }
}

/// Grant tokens to queued callers until the queue is empty.
async fn drain(shared: Arc<Shared>) {
    let capacity = f64::from(shared.capacity);
    loop {
        let wait = {
            let mut bucket = shared.lock();
            bucket.refill(capacity, shared.refill_rate);
            let granted = bucket.grant_waiters();
            metrics::record_queue_length(bucket.queue.len());

            if bucket.queue.is_empty() {
                bucket.draining = false;
                tracing::trace!(granted, "Rate limiter queue drained");
                return;
            }

            let deficit = (1.0 - bucket.tokens).max(0.0);
            Duration::from_secs_f64(deficit / shared.refill_rate).max(MIN_DRAIN_INTERVAL)
        };
        tokio::time::sleep(wait).await;
    }
}
