use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod analysis;
mod assets;
mod cache;
mod cards;
mod error;
mod extractor;
mod fetcher;
mod logging;
mod metadata;
mod orchestrator;
mod providers;
mod queue;
mod rate_limit;
mod service;
mod utils;

pub use analysis::{ContentAnalyzer, RateLimited, StructuredSummary};
pub use assets::{
    AssetKind, AssetPreserver, BlobStore, LocalBlobStore, MemoryBlobStore, PreservedAsset,
    CONTENT_MAX_BYTES, THUMBNAIL_MAX_BYTES,
};
pub use cache::{
    url_hash, CacheEntry, CacheStats, CacheStore, MemoryCacheStore, PlatformCount, PurgeFilter,
    ResponseCache, TopUrl,
};
pub use error::EmbedError;
pub use extractor::{
    facebook_post_id, instagram_post_id, pinterest_pin_id, select_strategy, tiktok_video_id,
    twitter_status_id, youtube_video_id, ExtractOptions, ExtractionEngine, ExtractionStrategy,
};
pub use fetcher::{Fetcher, FetcherConfig, OEmbedPayload};
pub use logging::{log_embed_card, log_error_card, setup_logging, LogConfig};
pub use metadata::{MetadataScraper, PageMetadata};
pub use orchestrator::{backoff_delay, OrchestratorConfig, TaskOrchestrator};
pub use providers::{Provider, ProviderRegistry, UrlMatcher};
pub use queue::{
    ExtractionTask, MemoryTaskQueue, ProgressStage, TaskEvent, TaskQueue, TaskState, TaskStatus,
};
pub use rate_limit::RateLimiter;
pub use service::{
    BatchPreviewOutcome, EmbedService, EmbedServiceConfig, EnrichContext, PreviewOutcome,
    MAX_CONCURRENT_EXTRACTIONS,
};

/// Embed content category, following the oEmbed `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedKind {
    Photo,
    Video,
    #[default]
    Link,
    Rich,
}

impl EmbedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedKind::Photo => "photo",
            EmbedKind::Video => "video",
            EmbedKind::Link => "link",
            EmbedKind::Rich => "rich",
        }
    }

    pub fn from_oembed_type(value: &str) -> Self {
        match value {
            "photo" => EmbedKind::Photo,
            "video" => EmbedKind::Video,
            "rich" => EmbedKind::Rich,
            _ => EmbedKind::Link,
        }
    }
}

impl std::fmt::Display for EmbedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical output of the extraction pipeline.
///
/// All URL-typed fields are plain strings at this boundary so the payload
/// serializes the same way regardless of which strategy produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EmbedResult {
    pub kind: EmbedKind,
    pub title: Option<String>,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub provider_name: Option<String>,
    pub provider_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub thumbnail_width: Option<u32>,
    pub thumbnail_height: Option<u32>,
    pub content_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub html: Option<String>,
    pub platform: Option<String>,
    pub platform_id: Option<String>,
    pub description: Option<String>,
    pub duration: Option<u64>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub published_at: Option<DateTime<Utc>>,
}

impl EmbedResult {
    pub fn new(kind: EmbedKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Structural invariants: a photo embed must carry its image URL, and
    /// video/rich embeds are unusable without embeddable markup.
    pub fn validate(&self) -> Result<(), EmbedError> {
        match self.kind {
            EmbedKind::Photo if self.content_url.is_none() => Err(EmbedError::ExtractError(
                "photo embed is missing content_url".into(),
            )),
            EmbedKind::Video | EmbedKind::Rich if self.html.is_none() => Err(
                EmbedError::ExtractError(format!("{} embed is missing html", self.kind)),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_oembed_type() {
        for kind in ["photo", "video", "link", "rich"] {
            assert_eq!(EmbedKind::from_oembed_type(kind).as_str(), kind);
        }
        assert_eq!(EmbedKind::from_oembed_type("unknown"), EmbedKind::Link);
    }

    #[test]
    fn photo_without_content_url_is_invalid() {
        let embed = EmbedResult::new(EmbedKind::Photo);
        assert!(embed.validate().is_err());

        let embed = EmbedResult {
            content_url: Some("https://example.com/a.jpg".into()),
            ..EmbedResult::new(EmbedKind::Photo)
        };
        assert!(embed.validate().is_ok());
    }

    #[test]
    fn rich_without_html_is_invalid() {
        let embed = EmbedResult::new(EmbedKind::Rich);
        assert!(embed.validate().is_err());

        let embed = EmbedResult {
            html: Some("<div></div>".into()),
            ..EmbedResult::new(EmbedKind::Video)
        };
        assert!(embed.validate().is_ok());
    }
}
