//! Per-client fixed-window rate limiting.
//!
//! Each client key owns a bucket holding the requests left in its current
//! window. The window resets wholesale once it has elapsed, so a client can
//! burst up to twice the capacity across a window boundary.

use dashmap::DashMap;
use log::debug;
use std::net::IpAddr;
use std::sync::{Mutex, TryLockError};
use std::time::{Duration, Instant};

/// Key used when neither a forwarded-for header nor a peer address is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug)]
struct RateBucket {
    remaining: u32,
    window_start: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// In-memory bucket table shared by all workers.
///
/// Buckets whose window has run out are swept once the table holds more than
/// `sweep_threshold` entries, at most once per window.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, RateBucket>,
    capacity: u32,
    window: Duration,
    sweep_threshold: usize,
    last_sweep: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration, sweep_threshold: usize) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity,
            window,
            sweep_threshold,
            last_sweep: Mutex::new(None),
        }
    }

    pub fn check_and_consume(&self, key: &str) -> RateDecision {
        self.check_and_consume_at(key, Instant::now())
    }

    /// Same as [`check_and_consume`](Self::check_and_consume) with an explicit clock reading.
    pub fn check_and_consume_at(&self, key: &str, now: Instant) -> RateDecision {
        self.sweep_if_needed(now);

        // The entry guard holds the shard lock across check and decrement.
        let mut bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| RateBucket {
                remaining: self.capacity,
                window_start: now,
            });

        if now.saturating_duration_since(bucket.window_start) > self.window {
            bucket.remaining = self.capacity;
            bucket.window_start = now;
        }

        if bucket.remaining == 0 {
            let retry_after = (bucket.window_start + self.window).saturating_duration_since(now);
            return RateDecision::Limited { retry_after };
        }

        bucket.remaining -= 1;
        RateDecision::Allowed {
            remaining: bucket.remaining,
        }
    }

    /// Drops every bucket whose window has expired. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.window_start) <= self.window);
        before.saturating_sub(self.buckets.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    fn sweep_if_needed(&self, now: Instant) {
        if self.buckets.len() <= self.sweep_threshold {
            return;
        }

        // Another worker already sweeping is as good as sweeping here.
        let mut last_sweep = match self.last_sweep.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        if last_sweep.is_some_and(|at| now.saturating_duration_since(at) < self.window) {
            return;
        }
        *last_sweep = Some(now);

        let removed = self.sweep(now);
        debug!("Swept {} expired rate-limit buckets, {} left", removed, self.len());
    }
}

/// Derives the rate-limit key for a request.
///
/// First entry of `x-forwarded-for`, then the peer address, then [`UNKNOWN_CLIENT`].
pub fn client_key(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> String {
    forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map(str::to_owned)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
