//! Token-bucket rate limiting.
//!
//! One bucket per key, created full on first use. Each bucket refills
//! continuously at `rate` tokens per second and never holds more than
//! `burst` tokens; each admitted call takes one token. The rate can be
//! changed in place, which the adaptive stage relies on.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::context::{CallContext, Interrupt};
use crate::error::{GateError, GateResult};

/// Keyed rate limiter consumed by the rate-limit stages.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Take a token for `key` if one is available right now.
    fn allow(&self, key: &str) -> bool;

    /// Block until a token for `key` is available, or fail with
    /// [`GateError::RateLimitExceeded`] once `ctx` is cancelled or its
    /// deadline cannot be met.
    async fn wait(&self, ctx: &CallContext, key: &str) -> GateResult<()>;
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, rate: f64, burst: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.last_refill = now;
    }
}

#[derive(Debug)]
struct LimiterState {
    rate: f64,
    burst: u32,
    buckets: HashMap<String, Bucket>,
}

impl LimiterState {
    fn bucket(&mut self, key: &str, now: Instant) -> &mut Bucket {
        let (rate, burst) = (self.rate, f64::from(self.burst));
        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket {
                tokens: burst,
                last_refill: now,
            });
        bucket.refill(rate, burst, now);
        bucket
    }
}

/// Token-bucket limiter keyed by arbitrary strings.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    state: Mutex<LimiterState>,
}

impl TokenBucketLimiter {
    /// `rate` tokens per second, at most `burst` tokens banked per key.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                rate: rate.max(0.0),
                burst,
                buckets: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn rate(&self) -> f64 {
        self.lock().rate
    }

    pub fn burst(&self) -> u32 {
        self.lock().burst
    }

    /// Change the refill rate for every key. Tokens accrued under the old
    /// rate up to now are kept.
    pub fn set_rate(&self, rate: f64) {
        let now = Instant::now();
        let mut state = self.lock();
        let (old_rate, burst) = (state.rate, f64::from(state.burst));
        for bucket in state.buckets.values_mut() {
            bucket.refill(old_rate, burst, now);
        }
        state.rate = rate.max(0.0);
    }

    /// Tokens currently banked for `key`.
    pub fn available(&self, key: &str) -> f64 {
        let now = Instant::now();
        self.lock().bucket(key, now).tokens
    }

    /// Number of keys with a bucket.
    pub fn tracked_keys(&self) -> usize {
        self.lock().buckets.len()
    }

    /// Drop buckets that have refilled completely; they are recreated full
    /// on next use, so this loses nothing.
    pub fn prune_full(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let (rate, burst) = (state.rate, f64::from(state.burst));
        let before = state.buckets.len();
        state.buckets.retain(|_, bucket| {
            bucket.refill(rate, burst, now);
            bucket.tokens < burst
        });
        before - state.buckets.len()
    }

    /// Take a token, or report how long until one frees up. `Err(None)`
    /// means one never will.
    fn reserve(&self, key: &str) -> Result<(), Option<Duration>> {
        let now = Instant::now();
        let mut state = self.lock();
        let rate = state.rate;
        let burst = state.burst;
        let bucket = state.bucket(key, now);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }
        if rate <= 0.0 || burst == 0 {
            return Err(None);
        }
        let missing = 1.0 - bucket.tokens;
        // A wait too long to represent is treated as no refill at all.
        Err(Duration::try_from_secs_f64(missing / rate).ok())
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    fn allow(&self, key: &str) -> bool {
        self.reserve(key).is_ok()
    }

    async fn wait(&self, ctx: &CallContext, key: &str) -> GateResult<()> {
        loop {
            let delay = match self.reserve(key) {
                Ok(()) => return Ok(()),
                Err(None) => {
                    return Err(GateError::RateLimitExceeded {
                        key: key.to_string(),
                        reason: "limiter has no capacity and never refills".into(),
                    })
                }
                Err(Some(delay)) => delay,
            };

            if let Some(deadline) = ctx.deadline() {
                let ready = Instant::now().checked_add(delay);
                if ready.map_or(true, |ready| ready > deadline) {
                    return Err(GateError::RateLimitExceeded {
                        key: key.to_string(),
                        reason: format!(
                            "next token in {}ms would miss the call deadline",
                            delay.as_millis()
                        ),
                    });
                }
            }

            if let Err(interrupt) = ctx.guard(tokio::time::sleep(delay)).await {
                let reason = match interrupt {
                    Interrupt::Cancelled => "cancelled while waiting for capacity",
                    Interrupt::DeadlineExceeded => "deadline exceeded while waiting for capacity",
                };
                return Err(GateError::RateLimitExceeded {
                    key: key.to_string(),
                    reason: reason.into(),
                });
            }
        }
    }
}
