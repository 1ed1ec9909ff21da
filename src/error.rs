use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Failed to parse URL: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("URL not supported by any provider: {0}")]
    UnsupportedUrl(String),

    #[error("All extraction strategies exhausted for: {0}")]
    ExtractionFailed(String),

    #[error("Failed to fetch content: {0}")]
    FetchError(String),

    #[error("Failed to extract metadata: {0}")]
    ExtractError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Blob storage error: {0}")]
    StorageError(String),

    #[error("Asset exceeds size cap: {size} > {cap} bytes")]
    AssetTooLarge { size: u64, cap: u64 },

    #[error("Asset has unexpected content type: {0}")]
    AssetWrongType(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task cancelled")]
    TaskCancelled,

    #[error("Request timeout: {0}")]
    TimeoutError(String),

    #[error("Concurrency limit reached")]
    ConcurrencyLimitError,
}

impl EmbedError {
    /// Whether a background task failing with this error is worth another
    /// attempt. Malformed or unsupported input never is.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbedError::UrlParseError(_)
            | EmbedError::UnsupportedUrl(_)
            | EmbedError::AssetTooLarge { .. }
            | EmbedError::AssetWrongType(_)
            | EmbedError::TaskNotFound(_)
            | EmbedError::TaskCancelled => false,
            EmbedError::ExtractionFailed(_)
            | EmbedError::FetchError(_)
            | EmbedError::ExtractError(_)
            | EmbedError::CacheError(_)
            | EmbedError::StorageError(_)
            | EmbedError::TimeoutError(_)
            | EmbedError::ConcurrencyLimitError => true,
        }
    }

    pub fn log(&self) {
        match self {
            EmbedError::UrlParseError(e) => {
                warn!(error = %e, "URL parsing failed");
            }
            EmbedError::UnsupportedUrl(url) => {
                warn!(url = %url, "URL not supported");
            }
            EmbedError::ExtractionFailed(url) => {
                error!(url = %url, "extraction strategies exhausted");
            }
            EmbedError::FetchError(e) => {
                error!(error = %e, "content fetch failed");
            }
            EmbedError::ExtractError(e) => {
                error!(error = %e, "metadata extraction failed");
            }
            EmbedError::CacheError(e) => {
                warn!(error = %e, "cache operation failed");
            }
            EmbedError::StorageError(e) => {
                warn!(error = %e, "blob storage operation failed");
            }
            EmbedError::AssetTooLarge { size, cap } => {
                warn!(size, cap, "asset rejected, too large");
            }
            EmbedError::AssetWrongType(ct) => {
                warn!(content_type = %ct, "asset rejected, wrong content type");
            }
            EmbedError::TaskNotFound(id) => {
                warn!(task_id = %id, "unknown task id");
            }
            EmbedError::TaskCancelled => {
                warn!("task cancelled");
            }
            EmbedError::TimeoutError(e) => {
                warn!(error = %e, "request timed out");
            }
            EmbedError::ConcurrencyLimitError => {
                warn!("concurrency limit reached");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_input_is_not_retryable() {
        assert!(!EmbedError::UnsupportedUrl("x".into()).is_retryable());
        assert!(!EmbedError::AssetWrongType("text/html".into()).is_retryable());
        assert!(!EmbedError::TaskCancelled.is_retryable());
    }

    #[test]
    fn transport_failures_are_retryable() {
        assert!(EmbedError::FetchError("connection reset".into()).is_retryable());
        assert!(EmbedError::TimeoutError("oembed call".into()).is_retryable());
        assert!(EmbedError::ExtractionFailed("https://a".into()).is_retryable());
    }
}
