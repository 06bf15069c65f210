//! Fixed-window request limiter for the OpenAlex API.
//!
//! OpenAlex allows 10 requests per second for polite-pool clients. The
//! limiter counts requests since the current window started; once the
//! ceiling is reached it sleeps out the rest of the window and starts a new
//! one. Bursts up to the ceiling go out without delay.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Requests allowed per window
pub const DEFAULT_MAX_REQUESTS: u32 = 10;

/// Window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    count: u32,
    window_start: Option<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            count: 0,
            window_start: None,
        }
    }

    /// Requests counted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Wait until another request may be issued, then count it.
    pub async fn acquire(&mut self) {
        let now = Instant::now();
        let start = *self.window_start.get_or_insert(now);

        if self.count >= self.max_requests {
            let elapsed = now.duration_since(start);
            if elapsed < self.window {
                let remaining = self.window - elapsed;
                debug!(
                    requests = self.count,
                    sleep_ms = remaining.as_millis() as u64,
                    "Request ceiling reached, sleeping"
                );
                tokio::time::sleep(remaining).await;
            }
            self.count = 0;
            self.window_start = Some(Instant::now());
        }

        self.count += 1;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}
