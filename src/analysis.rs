//! Interface to the AI-analysis collaborator. The pipeline consumes it as
//! a black box: `analyze(text) -> StructuredSummary`, rate-limited
//! independently of extraction traffic.

use crate::rate_limit::RateLimiter;
use crate::EmbedError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Structured summary a content analyzer returns for a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StructuredSummary {
    pub title: Option<String>,
    pub summary: String,
    pub category: String,
    pub tags: Vec<String>,
    pub sentiment: String,
    pub quality_score: f32,
    pub topics: Vec<String>,
    pub content_type: String,
    pub language: String,
    pub reading_time_minutes: Option<u32>,
    pub key_points: Vec<String>,
}

#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        text: &str,
        context: Option<&str>,
    ) -> Result<StructuredSummary, EmbedError>;
}

/// Wraps an analyzer with its own sliding-window limiter, so analysis
/// traffic is throttled independently of extraction calls.
pub struct RateLimited<A> {
    inner: A,
    limiter: RateLimiter,
}

impl<A: ContentAnalyzer> RateLimited<A> {
    pub fn new(inner: A, calls_per_minute: usize) -> Self {
        Self {
            inner,
            limiter: RateLimiter::new(calls_per_minute),
        }
    }
}

#[async_trait]
impl<A: ContentAnalyzer> ContentAnalyzer for RateLimited<A> {
    async fn analyze(
        &self,
        text: &str,
        context: Option<&str>,
    ) -> Result<StructuredSummary, EmbedError> {
        self.limiter.acquire().await;
        self.inner.analyze(text, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAnalyzer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentAnalyzer for CountingAnalyzer {
        async fn analyze(
            &self,
            text: &str,
            _context: Option<&str>,
        ) -> Result<StructuredSummary, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StructuredSummary {
                summary: format!("summary of {} chars", text.len()),
                ..Default::default()
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wrapped_analyzer_is_throttled_not_rejected() {
        let analyzer = RateLimited::new(
            CountingAnalyzer {
                calls: AtomicUsize::new(0),
            },
            2,
        );

        let start = tokio::time::Instant::now();
        for _ in 0..3 {
            analyzer.analyze("text", None).await.unwrap();
        }

        // Third call waited out the window instead of failing.
        assert_eq!(analyzer.inner.calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= std::time::Duration::from_secs(60));
    }
}
