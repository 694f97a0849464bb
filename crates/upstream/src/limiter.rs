//! Download pacing.
//!
//! One token per reload interval, burst one. A caller that finds the
//! bucket empty waits for the refill, but never longer than one interval,
//! so a stuck clock cannot stall the reload path indefinitely.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::time::sleep;

pub struct ReloadLimiter {
    interval: Duration,
    bucket: Mutex<TokenBucket>,
}

struct TokenBucket {
    tokens: u32,
    last_refill: Instant,
}

impl ReloadLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            bucket: Mutex::new(TokenBucket {
                tokens: 1,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take a download slot, waiting at most one interval.
    pub async fn acquire(&self) {
        let wait = {
            let mut bucket = self.bucket.lock();
            let now = Instant::now();
            if now.duration_since(bucket.last_refill) >= self.interval {
                bucket.tokens = 1;
                bucket.last_refill = now;
            }
            if bucket.tokens > 0 {
                bucket.tokens -= 1;
                None
            } else {
                Some(
                    self.interval
                        .saturating_sub(now.duration_since(bucket.last_refill)),
                )
            }
        };

        if let Some(wait) = wait {
            sleep(wait.min(self.interval)).await;
            let mut bucket = self.bucket.lock();
            bucket.tokens = 0;
            bucket.last_refill = Instant::now();
        }
    }
}

#[cfg(test)]
#[path = "limiter_test.rs"]
mod tests;
