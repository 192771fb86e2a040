//! Token bucket limiting requests per minute on the single control thread.

use std::time::{Duration, Instant};

/// Token bucket where tokens refill at a constant rate and each request takes one.
///
/// The bucket starts full, allowing a burst up to the per-minute capacity.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    /// Tokens added per second.
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// `requests_per_minute == 0` disables limiting.
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn unlimited(&self) -> bool {
        self.capacity <= 0.0
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Take a token at `now`, or return how long to wait for the next one.
    pub fn try_acquire_at(&mut self, now: Instant) -> Result<(), Duration> {
        if self.unlimited() {
            return Ok(());
        }
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    /// Block the calling thread until a token is available, then take it.
    pub fn acquire(&mut self) {
        loop {
            match self.try_acquire_at(Instant::now()) {
                Ok(()) => return,
                Err(wait) => {
                    tracing::info!("rate limit reached, sleeping {:.1}s", wait.as_secs_f64());
                    std::thread::sleep(wait);
                }
            }
        }
    }
}
