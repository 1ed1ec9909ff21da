use crate::analysis::{ContentAnalyzer, StructuredSummary};
use crate::assets::{AssetKind, AssetPreserver, BlobStore};
use crate::cache::{CacheEntry, CacheStats, CacheStore, PurgeFilter, ResponseCache};
use crate::extractor::{ExtractOptions, ExtractionEngine};
use crate::fetcher::Fetcher;
use crate::providers::UrlMatcher;
use crate::queue::ProgressStage;
use crate::{EmbedError, EmbedKind, EmbedResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

/// Ceiling for concurrent extractions (inline and batch combined), so a
/// large batch cannot overwhelm the local network stack or one upstream.
pub const MAX_CONCURRENT_EXTRACTIONS: usize = 50;

/// Outcome of a preview request. A failed extraction is a modeled result
/// (`is_supported` + `error`), never a transport fault.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PreviewOutcome {
    pub url: String,
    pub is_supported: bool,
    pub provider: Option<String>,
    pub embed: Option<EmbedResult>,
    pub cached: bool,
    pub error: Option<String>,
}

impl PreviewOutcome {
    fn unsupported(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            is_supported: false,
            provider: None,
            embed: None,
            cached: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BatchPreviewOutcome {
    pub results: HashMap<String, PreviewOutcome>,
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub cached: usize,
}

/// Knobs for the shared extract → preserve → cache-write sequence.
#[derive(Clone, Copy, Default)]
pub struct EnrichContext<'a> {
    pub owner_id: &'a str,
    pub force_refresh: bool,
    pub options: ExtractOptions,
    /// Leave remote asset URLs untouched. The inline preview path sets
    /// this: previews have no persistence side effects beyond the cache.
    pub skip_assets: bool,
    /// Cooperative cancellation checkpoints between pipeline stages.
    pub cancel: Option<&'a CancellationToken>,
    /// Coarse milestone reporting for background progress.
    pub progress: Option<&'a (dyn Fn(ProgressStage) + Send + Sync)>,
}

impl std::fmt::Debug for EnrichContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichContext")
            .field("owner_id", &self.owner_id)
            .field("force_refresh", &self.force_refresh)
            .finish_non_exhaustive()
    }
}

pub struct EmbedServiceConfig {
    pub matcher: Option<Arc<UrlMatcher>>,
    pub fetcher: Option<Fetcher>,
    pub cache_store: Option<Arc<dyn CacheStore>>,
    /// When absent, asset preservation is skipped and embeds keep their
    /// remote URLs.
    pub blob_store: Option<Arc<dyn BlobStore>>,
    pub analyzer: Option<Arc<dyn ContentAnalyzer>>,
    pub max_concurrent_extractions: usize,
}

impl Default for EmbedServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbedServiceConfig {
    pub fn new() -> Self {
        Self {
            matcher: None,
            fetcher: None,
            cache_store: None,
            blob_store: None,
            analyzer: None,
            max_concurrent_extractions: MAX_CONCURRENT_EXTRACTIONS,
        }
    }

    pub fn with_matcher(mut self, matcher: Arc<UrlMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn ContentAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_max_concurrent_extractions(mut self, max: usize) -> Self {
        self.max_concurrent_extractions = max.max(1);
        self
    }
}

/// Unified entry point for the content-enrichment pipeline: provider
/// matching, cache-or-extract previews, batch fan-out, and the shared
/// enrichment sequence the background orchestrator reuses verbatim.
#[derive(Clone)]
pub struct EmbedService {
    matcher: Arc<UrlMatcher>,
    engine: Arc<ExtractionEngine>,
    cache: ResponseCache,
    preserver: Option<Arc<AssetPreserver>>,
    analyzer: Option<Arc<dyn ContentAnalyzer>>,
    semaphore: Arc<Semaphore>,
}

impl Default for EmbedService {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbedService {
    /// In-memory cache, no asset preservation.
    pub fn new() -> Self {
        Self::new_with_config(EmbedServiceConfig::new())
    }

    pub fn new_with_config(config: EmbedServiceConfig) -> Self {
        let matcher = config
            .matcher
            .unwrap_or_else(|| Arc::new(UrlMatcher::default()));
        let fetcher = config.fetcher.unwrap_or_default();
        let engine = Arc::new(ExtractionEngine::new_with_fetcher(
            Arc::clone(&matcher),
            fetcher,
        ));
        let cache = match config.cache_store {
            Some(store) => ResponseCache::new(store),
            None => ResponseCache::in_memory(),
        };
        let preserver = config
            .blob_store
            .map(|store| Arc::new(AssetPreserver::new(store)));

        debug!(
            providers = matcher.registry().len(),
            preserve_assets = preserver.is_some(),
            "embed service initialized"
        );

        Self {
            matcher,
            engine,
            cache,
            preserver,
            analyzer: config.analyzer,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_extractions)),
        }
    }

    pub fn matcher(&self) -> &UrlMatcher {
        &self.matcher
    }

    pub fn engine(&self) -> &ExtractionEngine {
        &self.engine
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn is_supported(&self, url: &str) -> bool {
        self.matcher.is_supported(url)
    }

    /// Cache-or-extract preview with no persistence side effects beyond
    /// the cache itself.
    #[instrument(level = "debug", skip(self))]
    pub async fn preview(&self, url: &str, options: ExtractOptions) -> PreviewOutcome {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return PreviewOutcome::unsupported(url, EmbedError::ConcurrencyLimitError.to_string())
            }
        };

        if let Err(e) = Url::parse(url) {
            return PreviewOutcome::unsupported(url, format!("invalid URL: {e}"));
        }

        match self.cache.get(url).await {
            Ok(Some((entry, embed))) => {
                return PreviewOutcome {
                    url: url.to_string(),
                    is_supported: true,
                    provider: entry.platform.clone(),
                    embed: Some(embed),
                    cached: true,
                    error: None,
                };
            }
            Ok(None) => {}
            Err(e) => e.log(),
        }

        if !self.matcher.is_supported(url) {
            return PreviewOutcome::unsupported(url, "URL not supported by any provider");
        }

        let provider = self
            .matcher
            .match_url(url)
            .map(|p| p.name.clone());

        match self
            .enrich(
                url,
                EnrichContext {
                    owner_id: "preview",
                    force_refresh: false,
                    options,
                    skip_assets: true,
                    cancel: None,
                    progress: None,
                },
            )
            .await
        {
            Ok(entry) => {
                let embed = entry.embed().ok();
                PreviewOutcome {
                    url: url.to_string(),
                    is_supported: true,
                    provider: provider.or_else(|| entry.platform.clone()),
                    embed,
                    cached: false,
                    error: None,
                }
            }
            Err(e) => {
                e.log();
                PreviewOutcome {
                    url: url.to_string(),
                    is_supported: true,
                    provider,
                    embed: None,
                    cached: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Fan out previews for many URLs, bounded by the shared concurrency
    /// ceiling. Results are keyed by URL; completion order is unspecified.
    #[instrument(level = "debug", skip(self, urls))]
    pub async fn batch_preview(
        &self,
        urls: &[String],
        options: ExtractOptions,
    ) -> BatchPreviewOutcome {
        let futures: Vec<_> = urls
            .iter()
            .map(|url| async move { (url.clone(), self.preview(url, options).await) })
            .collect();

        let results: HashMap<String, PreviewOutcome> =
            futures::future::join_all(futures).await.into_iter().collect();

        let total_processed = results.len();
        let successful = results.values().filter(|r| r.embed.is_some()).count();
        let cached = results.values().filter(|r| r.cached).count();

        BatchPreviewOutcome {
            total_processed,
            successful,
            failed: total_processed - successful,
            cached,
            results,
        }
    }

    /// The shared enrichment sequence: cache-read, then extraction, then
    /// asset preservation, then cache-write, strictly in that order for a
    /// given URL. Both the inline path and the background orchestrator run
    /// this exact code.
    pub async fn enrich(
        &self,
        url: &str,
        ctx: EnrichContext<'_>,
    ) -> Result<CacheEntry, EmbedError> {
        let report = |stage: ProgressStage| {
            if let Some(progress) = ctx.progress {
                progress(stage);
            }
        };
        let checkpoint = || -> Result<(), EmbedError> {
            match ctx.cancel {
                Some(token) if token.is_cancelled() => Err(EmbedError::TaskCancelled),
                _ => Ok(()),
            }
        };

        if !ctx.force_refresh {
            if let Some((entry, _)) = self.cache.get(url).await? {
                debug!(url = %url, "enrich served from cache");
                report(ProgressStage::Done);
                return Ok(entry);
            }
        }

        if !self.matcher.is_supported(url) {
            return Err(EmbedError::UnsupportedUrl(url.to_string()));
        }

        checkpoint()?;
        report(ProgressStage::Fetching);
        let mut embed = self.engine.extract(url, ctx.options).await?;
        report(ProgressStage::Parsing);

        checkpoint()?;
        if let Some(preserver) = self.preserver.as_ref().filter(|_| !ctx.skip_assets) {
            report(ProgressStage::PreservingAssets);
            let platform = embed.platform.clone().unwrap_or_else(|| "unknown".into());

            if let Some(thumbnail_url) = embed.thumbnail_url.clone() {
                if let Some(asset) = preserver
                    .preserve(&thumbnail_url, ctx.owner_id, &platform, AssetKind::Thumbnail)
                    .await
                {
                    embed.thumbnail_url = Some(asset.local_path);
                }
            }

            if embed.kind == EmbedKind::Photo {
                if let Some(content_url) = embed.content_url.clone() {
                    if let Some(asset) = preserver
                        .preserve(&content_url, ctx.owner_id, &platform, AssetKind::Image)
                        .await
                    {
                        embed.content_url = Some(asset.local_path);
                    }
                }
            }
        }

        checkpoint()?;
        let entry = self.cache.put(url, &embed, 200).await?;
        report(ProgressStage::Done);
        Ok(entry)
    }

    /// Run the AI collaborator over an embed's text, if one is configured.
    pub async fn analyze_embed(
        &self,
        embed: &EmbedResult,
    ) -> Result<Option<StructuredSummary>, EmbedError> {
        let Some(analyzer) = &self.analyzer else {
            return Ok(None);
        };

        let mut text = String::new();
        if let Some(title) = &embed.title {
            text.push_str(title);
            text.push('\n');
        }
        if let Some(description) = &embed.description {
            text.push_str(description);
        }
        if text.trim().is_empty() {
            return Ok(None);
        }

        let summary = analyzer
            .analyze(&text, embed.platform.as_deref())
            .await?;
        Ok(Some(summary))
    }

    pub async fn purge_cache(&self, filter: &PurgeFilter) -> Result<u64, EmbedError> {
        self.cache.purge(filter).await
    }

    pub async fn sweep_expired_cache(&self) -> Result<u64, EmbedError> {
        self.cache.delete_expired().await
    }

    pub async fn cache_stats(&self) -> Result<CacheStats, EmbedError> {
        self.cache.stats().await
    }
}
