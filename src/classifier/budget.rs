//! Process-wide rate budget for classifier calls.
//!
//! A single token bucket shared by every monitor. Token accounting (refill
//! and consume) happens atomically under one mutex so concurrent monitors
//! can never over-consume; waiting for a token happens outside the lock.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

struct BudgetState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket limiting classifier request rate across all monitors.
pub struct RateBudget {
    state: Mutex<BudgetState>,
    capacity: f64,
    refill_per_minute: f64,
}

impl RateBudget {
    /// Create a budget that starts full.
    pub fn new(capacity: f64, refill_per_minute: f64) -> Self {
        Self {
            state: Mutex::new(BudgetState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_minute,
        }
    }

    /// Acquire one token, sleeping until the bucket refills if necessary.
    pub async fn acquire(&self) {
        loop {
            match self.try_take() {
                Ok(()) => return,
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Rate budget exhausted, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Refill from elapsed time, then consume one token or report how long
    /// until the next token is due.
    fn try_take(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        if elapsed > Duration::ZERO {
            let refill = elapsed.as_secs_f64() / 60.0 * self.refill_per_minute;
            state.tokens = (state.tokens + refill).min(self.capacity);
            state.last_refill = now;
        }

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }

        let deficit = 1.0 - state.tokens;
        let secs = deficit * 60.0 / self.refill_per_minute;
        Err(Duration::from_secs_f64(secs))
    }
}
