// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

// Tokens are kept in thousandths so slow refill rates do not lose
// the fraction accumulated between two acquisitions.
const SCALE: u64 = 1000;

struct Bucket {
    tokens: u64,
    last_refill: Instant,
}

/// WriteThrottle is a token bucket shared by every reconcile of one controller.
///
/// The shim layer takes a token before each patch it sends, which bounds the
/// rate at which one policy change fans out into workspace writes.
pub struct WriteThrottle {
    rate: u64,
    capacity: u64,
    bucket: Mutex<Bucket>,
}

impl WriteThrottle {
    pub fn new(rate_per_second: u32, burst: u32) -> WriteThrottle {
        let capacity = u64::from(burst.max(1)) * SCALE;
        WriteThrottle {
            rate: u64::from(rate_per_second.max(1)) * SCALE,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed_ms = now.saturating_duration_since(bucket.last_refill).as_millis() as u64;
        if elapsed_ms == 0 {
            return;
        }
        let added = self.rate.saturating_mul(elapsed_ms) / 1000;
        bucket.tokens = bucket.tokens.saturating_add(added).min(self.capacity);
        bucket.last_refill = now;
    }

    // Takes one token if available without waiting.
    #[cfg(test)]
    async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= SCALE {
            bucket.tokens -= SCALE;
            true
        } else {
            false
        }
    }

    /// Waits until a token is available and takes it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket, Instant::now());
                if bucket.tokens >= SCALE {
                    bucket.tokens -= SCALE;
                    return;
                }
                let missing = SCALE - bucket.tokens;
                Duration::from_millis((missing * 1000).div_ceil(self.rate).max(1))
            };
            tokio::time::sleep(wait).await;
        }
    }
}
