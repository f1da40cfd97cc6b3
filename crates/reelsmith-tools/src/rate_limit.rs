//! Token-bucket rate limiter for bulk page fetches.
//!
//! One bucket is shared by every page-fetch tool call in the process. Tokens
//! refill continuously from elapsed time; callers that find the bucket empty
//! sleep briefly and try again.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Longest single sleep while waiting for a token.
const MAX_POLL: Duration = Duration::from_millis(50);

pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket holding `capacity` tokens, refilled at `refill_per_sec`.
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_sec: refill_per_sec.max(f64::MIN_POSITIVE),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    /// Take a token if one is available.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            let wait = self.time_to_next_token().min(MAX_POLL);
            debug!(wait_ms = wait.as_millis() as u64, "Page-fetch bucket empty, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available (after refill).
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refill(&mut state);
        state.tokens
    }

    fn time_to_next_token(&self) -> Duration {
        let missing = (1.0 - self.available()).max(0.0);
        Duration::from_secs_f64(missing / self.refill_per_sec).max(Duration::from_millis(1))
    }
}

static PAGE_FETCH_LIMITER: OnceLock<Arc<TokenBucket>> = OnceLock::new();

/// The process-wide page-fetch bucket. Settings from the first call win.
pub fn page_fetch_limiter(capacity: u32, refill_per_sec: f64) -> Arc<TokenBucket> {
    PAGE_FETCH_LIMITER
        .get_or_init(|| Arc::new(TokenBucket::new(capacity, refill_per_sec)))
        .clone()
}
