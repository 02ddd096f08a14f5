use crate::rate_limit::{RateLimiter, Decision};
use crate::rate_limit::store::TokenStore;
use crate::adaptive::Adaptive;
use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use std::sync::{Arc, Mutex};
use std::collections::HashMap;

/// A Token Bucket rate limiter.
///
/// Replenishes tokens at a fixed `rate` per second, up to `capacity`.
pub struct TokenBucket<S> {
    store: Arc<S>,
    bucket_key: String,
    rate: Adaptive<f64>, // Tokens per second
    capacity: Adaptive<f64>, // Max tokens
}

impl<S> TokenBucket<S>
where
    S: TokenStore + Send + Sync + 'static,
{
    /// Create a new TokenBucket backed by `store`.
    pub fn new(store: S, key: impl Into<String>, rate: f64, capacity: f64) -> Self {
        Self {
            store: Arc::new(store),
            bucket_key: key.into(),
            rate: Adaptive::new(rate),
            capacity: Adaptive::new(capacity),
        }
    }

    fn now_nanos() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
    }
}

#[async_trait]
impl<S> RateLimiter for TokenBucket<S>
where
    S: TokenStore + Send + Sync + 'static,
{
    async fn acquire(&self, permits: u32) -> Result<Decision, Box<dyn std::error::Error + Send + Sync>> {
        let now = Self::now_nanos();
        let cost = permits as f64;
        let rate = *self.rate.get();
        let capacity = *self.capacity.get();

        // Optimistic locking loop
        for _ in 0..3 { // Try 3 times
            let (current_tokens, last_updated) = match self.store.get_state(&self.bucket_key).await? {
                Some((t, u)) => (t, u),
                None => (capacity, now), // Initial state: full bucket
            };

            // Refill
            let elapsed_secs = (now.saturating_sub(last_updated) as f64) / 1_000_000_000.0;
            let new_tokens = (current_tokens + elapsed_secs * rate).min(capacity);

            if new_tokens >= cost {
                let final_tokens = new_tokens - cost;
                // Try to commit
                if self.store.set_state(&self.bucket_key, final_tokens, now, Some(last_updated)).await? {
                    return Ok(Decision::Allowed {
                        remaining: final_tokens as u32,
                        metadata: Default::default(),
                    });
                }
                // Race detected, loop again
            } else {
                // Not enough tokens. Calculate wait time.
                let missing = cost - new_tokens;
                let wait_secs = missing / rate;
                return Ok(Decision::Denied {
                    wait: Duration::from_secs_f64(wait_secs),
                    reason: "token_bucket_empty".into(),
                });
            }
        }

        // Failed to acquire lock after retries
        // In a real system, we might deny or fail open.
        Ok(Decision::Denied {
            wait: Duration::from_millis(100), // Arbitrary backoff on contention
            reason: "store_contention".into(),
        })
    }
}

/// Fixed-window limiter: allows up to `max_requests` per `window`, keyed on
/// one bucket key, reset wholesale once the window elapses.
///
/// Shares the same CAS-over-`TokenStore` shape as [`TokenBucket`]; the
/// repurposed `(count, window_start_nanos)` pair plays the role of
/// `(tokens, last_updated)`.
pub struct FixedWindow<S> {
    store: Arc<S>,
    bucket_key: String,
    window: Duration,
    max_requests: u32,
}

impl<S> FixedWindow<S>
where
    S: TokenStore + Send + Sync + 'static,
{
    pub fn new(store: Arc<S>, key: impl Into<String>, window: Duration, max_requests: u32) -> Self {
        Self { store, bucket_key: key.into(), window, max_requests }
    }

    fn now_nanos() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
    }
}

#[async_trait]
impl<S> RateLimiter for FixedWindow<S>
where
    S: TokenStore + Send + Sync + 'static,
{
    async fn acquire(&self, permits: u32) -> Result<Decision, Box<dyn std::error::Error + Send + Sync>> {
        let now = Self::now_nanos();
        let window_nanos = self.window.as_nanos() as u64;

        for _ in 0..3 {
            let (count, window_start) = match self.store.get_state(&self.bucket_key).await? {
                Some((c, w)) if now.saturating_sub(w) < window_nanos => (c, w),
                Some((_, _)) | None => (0.0, now), // expired or first request: new window
            };

            let new_count = count + permits as f64;
            if new_count <= self.max_requests as f64 {
                if self.store.set_state(&self.bucket_key, new_count, window_start, Some(window_start)).await? {
                    return Ok(Decision::Allowed {
                        remaining: (self.max_requests as f64 - new_count).max(0.0) as u32,
                        metadata: Default::default(),
                    });
                }
            } else {
                let elapsed = now.saturating_sub(window_start);
                let wait_nanos = window_nanos.saturating_sub(elapsed);
                return Ok(Decision::Denied {
                    wait: Duration::from_nanos(wait_nanos),
                    reason: "fixed_window_exceeded".into(),
                });
            }
        }

        Ok(Decision::Denied {
            wait: Duration::from_millis(100),
            reason: "store_contention".into(),
        })
    }
}

/// Lazily allocates one [`FixedWindow`] limiter per key over a shared store,
/// for callers (like the facade's per-remote-address middleware) that need
/// many independent windows rather than the single fixed key [`FixedWindow`]
/// itself is constructed with.
pub struct KeyedFixedWindow<S> {
    store: Arc<S>,
    window: Duration,
    max_requests: u32,
    limiters: Mutex<HashMap<String, Arc<FixedWindow<S>>>>,
}

impl<S> KeyedFixedWindow<S>
where
    S: TokenStore + Send + Sync + 'static,
{
    pub fn new(store: S, window: Duration, max_requests: u32) -> Self {
        Self { store: Arc::new(store), window, max_requests, limiters: Mutex::new(HashMap::new()) }
    }

    pub async fn acquire(&self, key: &str) -> Result<Decision, Box<dyn std::error::Error + Send + Sync>> {
        let limiter = {
            let mut limiters = self.limiters.lock().unwrap();
            limiters
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(FixedWindow::new(self.store.clone(), key, self.window, self.max_requests)))
                .clone()
        };
        limiter.acquire(1).await
    }
}
