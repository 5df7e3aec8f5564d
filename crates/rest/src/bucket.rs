//! Rate-limit bucket table.
//!
//! Tracks, per bucket key, the remaining quota and reset deadline the
//! server last advertised, and decides whether a dispatch may proceed now
//! or must wait. Buckets are created lazily on the first response carrying
//! rate-limit headers; an absent bucket is unlimited.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::HeaderMap;
use tokio::sync::RwLock;
use tokio::time::Instant;

use quill_common::{ClientError, ClientResult};

use crate::scope::CancellationScope;

/// Rate-limit header names consumed from responses.
pub mod headers {
    /// Remaining quota in the current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Total quota per window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Window reset as epoch seconds (fractional allowed).
    pub const RESET: &str = "x-ratelimit-reset";
    /// Seconds to wait after a 429 (fractional allowed).
    pub const RETRY_AFTER: &str = "retry-after";
}

/// Rate-limit state advertised by one response.
#[derive(Debug, Clone)]
pub struct RateLimitHeaders {
    /// Remaining quota in the current window.
    pub remaining: u32,
    /// Total quota per window.
    pub limit: u32,
    /// Monotonic deadline at which the window resets.
    pub reset_at: Instant,
}

impl RateLimitHeaders {
    /// Parse the rate-limit headers from a response.
    ///
    /// Returns `None` unless all three quota headers are present and
    /// well-formed. The epoch reset timestamp is converted to a monotonic
    /// deadline here, so the limiter only ever compares one clock.
    #[must_use]
    pub fn from_headers(map: &HeaderMap) -> Option<Self> {
        let remaining = header_number(map, headers::REMAINING)?;
        let limit = header_number(map, headers::LIMIT)?;
        let reset_epoch: f64 = header_value(map, headers::RESET)?;

        Some(Self {
            remaining,
            limit,
            reset_at: deadline_from_epoch(reset_epoch),
        })
    }
}

/// Parse the `retry-after` duration from a 429 response, if present.
#[must_use]
pub fn retry_after(map: &HeaderMap) -> Option<Duration> {
    let seconds: f64 = header_value(map, headers::RETRY_AFTER)?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

fn header_value<T: std::str::FromStr>(map: &HeaderMap, name: &str) -> Option<T> {
    map.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn header_number(map: &HeaderMap, name: &str) -> Option<u32> {
    header_value(map, name)
}

/// Convert a server epoch timestamp to a monotonic deadline.
///
/// A reset already in the past clamps to "now".
fn deadline_from_epoch(reset_epoch: f64) -> Instant {
    let now_epoch = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    let delta = (reset_epoch - now_epoch).max(0.0);
    Instant::now() + Duration::from_secs_f64(delta)
}

/// Quota state for a single bucket key.
#[derive(Debug, Clone)]
struct Bucket {
    /// Total quota per window.
    limit: u32,
    /// Remaining quota, clamped at 0.
    remaining: u32,
    /// Deadline at which the window resets.
    reset_at: Instant,
}

/// Per-bucket rate limiter.
///
/// The write lock is held only for bookkeeping; waits happen outside it,
/// so exhaustion of one bucket never delays dispatch on another.
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Create an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Wait until the bucket admits one request, then claim a slot.
    ///
    /// Unknown buckets admit immediately. A wait resolves to
    /// [`ClientError::Cancelled`] as soon as `scope` is superseded.
    pub async fn acquire(&self, bucket: &str, scope: &CancellationScope) -> ClientResult<()> {
        loop {
            let reset_at = {
                let mut buckets = self.buckets.write().await;
                match buckets.get_mut(bucket) {
                    // Unlimited until the first response creates the bucket.
                    None => return Ok(()),
                    Some(state) => {
                        let now = Instant::now();
                        if now >= state.reset_at {
                            if state.limit == 0 {
                                // Stale 429-only bucket; let the next
                                // response refresh it.
                                return Ok(());
                            }
                            state.remaining = state.limit;
                        }
                        if state.remaining > 0 {
                            state.remaining -= 1;
                            return Ok(());
                        }
                        state.reset_at
                    }
                }
            };

            tracing::debug!(bucket, "Bucket exhausted, waiting for reset");
            tokio::select! {
                () = tokio::time::sleep_until(reset_at) => {}
                () = scope.cancelled() => {
                    tracing::debug!(bucket, "Bucket wait cancelled");
                    return Err(ClientError::Cancelled);
                }
            }
        }
    }

    /// Update a bucket from the rate-limit headers of a response.
    ///
    /// No-op when the response carried no quota headers.
    pub async fn note_response(&self, bucket: &str, map: &HeaderMap) {
        let Some(parsed) = RateLimitHeaders::from_headers(map) else {
            return;
        };

        let mut buckets = self.buckets.write().await;
        buckets.insert(
            bucket.to_string(),
            Bucket {
                limit: parsed.limit,
                remaining: parsed.remaining,
                reset_at: parsed.reset_at,
            },
        );
    }

    /// Mark a bucket exhausted after a 429, for `retry_after` long.
    pub async fn note_exhausted(&self, bucket: &str, retry_after: Duration) {
        let reset_at = Instant::now() + retry_after;
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(bucket.to_string())
            .and_modify(|state| {
                state.remaining = 0;
                state.reset_at = reset_at;
            })
            .or_insert(Bucket {
                limit: 0,
                remaining: 0,
                reset_at,
            });
    }

    /// Current (remaining, limit) for a bucket, if it exists.
    pub async fn snapshot(&self, bucket: &str) -> Option<(u32, u32)> {
        let buckets = self.buckets.read().await;
        buckets.get(bucket).map(|b| (b.remaining, b.limit))
    }

    /// Number of tracked buckets.
    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }
}
