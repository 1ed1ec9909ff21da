use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter for outbound calls to rate-constrained
/// upstreams. A caller that would exceed the per-minute ceiling is delayed
/// until the oldest call leaves the window, never rejected.
pub struct RateLimiter {
    max_per_minute: usize,
    stamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_minute: usize) -> Self {
        Self {
            max_per_minute: max_per_minute.max(1),
            stamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a call slot is available, then claim it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut stamps = self.stamps.lock().await;
                let now = Instant::now();

                while let Some(front) = stamps.front() {
                    if now.duration_since(*front) >= WINDOW {
                        stamps.pop_front();
                    } else {
                        break;
                    }
                }

                if stamps.len() < self.max_per_minute {
                    stamps.push_back(now);
                    return;
                }

                // Oldest stamp leaves the window at front + WINDOW.
                let front = *stamps.front().expect("non-empty at capacity");
                (front + WINDOW).saturating_duration_since(now)
            };

            debug!(delay_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Calls currently counted inside the window.
    pub async fn current_load(&self) -> usize {
        let mut stamps = self.stamps.lock().await;
        let now = Instant::now();
        while let Some(front) = stamps.front() {
            if now.duration_since(*front) >= WINDOW {
                stamps.pop_front();
            } else {
                break;
            }
        }
        stamps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn acquires_up_to_the_ceiling_without_waiting() {
        let limiter = RateLimiter::new(3);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.current_load().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn over_ceiling_caller_is_delayed_not_rejected() {
        let limiter = RateLimiter::new(2);
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;

        // Admitted exactly when the first stamp left the 60s window.
        assert_eq!(start.elapsed(), WINDOW);
        assert_eq!(limiter.current_load().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_drains_over_time() {
        let limiter = RateLimiter::new(5);
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.current_load().await, 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.current_load().await, 0);
    }
}
