use crate::cards;
use crate::fetcher::{Fetcher, OEmbedPayload};
use crate::metadata::{MetadataScraper, PageMetadata};
use crate::providers::{Provider, UrlMatcher};
use crate::utils::host_from_url;
use crate::{EmbedError, EmbedKind, EmbedResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

static YOUTUBE_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([^&\n?#]+)").unwrap(),
        Regex::new(r"youtube\.com/shorts/([^&\n?#]+)").unwrap(),
    ]
});

static TWITTER_ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"status/(\d+)").unwrap());

static INSTAGRAM_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"instagram\.com/(?:p|reel)/([^/?]+)").unwrap());

static TIKTOK_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"tiktok\.com/@[^/]+/video/(\d+)").unwrap(),
        Regex::new(r"vm\.tiktok\.com/([^/?]+)").unwrap(),
        Regex::new(r"tiktok\.com/t/([^/?]+)").unwrap(),
    ]
});

static PINTEREST_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pinterest\.com/pin/(\d+)").unwrap());

static FACEBOOK_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"facebook\.com/[^/]+/posts/(\d+)").unwrap(),
        Regex::new(r"facebook\.com/[^/]+/videos/(\d+)").unwrap(),
        Regex::new(r"facebook\.com/photo\.php\?fbid=(\d+)").unwrap(),
        Regex::new(r"facebook\.com/[^/]+/photos/[^/]+/(\d+)").unwrap(),
        Regex::new(r"facebook\.com/story\.php\?story_fbid=(\d+)").unwrap(),
        Regex::new(r"fbid=(\d+)").unwrap(),
        Regex::new(r"story_fbid=(\d+)").unwrap(),
    ]
});

fn first_capture(patterns: &[Regex], url: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// YouTube video id from any supported watch/short/embed URL shape.
/// Absence of a match is not an error, just a missing `platform_id`.
pub fn youtube_video_id(url: &str) -> Option<String> {
    first_capture(&YOUTUBE_ID_PATTERNS, url)
}

pub fn twitter_status_id(url: &str) -> Option<String> {
    TWITTER_ID_PATTERN
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn instagram_post_id(url: &str) -> Option<String> {
    INSTAGRAM_ID_PATTERN
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn tiktok_video_id(url: &str) -> Option<String> {
    first_capture(&TIKTOK_ID_PATTERNS, url)
}

pub fn pinterest_pin_id(url: &str) -> Option<String> {
    PINTEREST_ID_PATTERN
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn facebook_post_id(url: &str) -> Option<String> {
    first_capture(&FACEBOOK_ID_PATTERNS, url)
}

/// The closed set of extraction strategies. Selected once per URL by
/// [`select_strategy`], never by scattered string comparisons downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Standard oEmbed protocol call against the provider endpoint.
    Standard,
    YouTube,
    Instagram,
    TikTok,
    Twitter,
    Pinterest,
    Facebook,
    /// Open Graph / Twitter Card scrape of the raw URL.
    Generic,
}

/// Decision table mapping a provider match (or a custom-platform URL shape)
/// to the strategy that handles it.
pub fn select_strategy(provider: Option<&Provider>, url: &str) -> ExtractionStrategy {
    if let Some(provider) = provider {
        return match provider.slug.as_str() {
            "youtube" => ExtractionStrategy::YouTube,
            "instagram" => ExtractionStrategy::Instagram,
            "tiktok" => ExtractionStrategy::TikTok,
            "twitter" => ExtractionStrategy::Twitter,
            "pinterest" => ExtractionStrategy::Pinterest,
            _ => ExtractionStrategy::Standard,
        };
    }

    let Ok(parsed) = Url::parse(url) else {
        return ExtractionStrategy::Generic;
    };
    let domain = parsed
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .unwrap_or_default();
    let path = parsed.path().to_ascii_lowercase();

    if domain.contains("pinterest.com") || domain.contains("pin.it") {
        ExtractionStrategy::Pinterest
    } else if domain.contains("tiktok.com") && (path.contains("/video/") || path.contains('@')) {
        ExtractionStrategy::TikTok
    } else if (domain.contains("facebook.com") || domain.contains("fb.com"))
        && ["/share/", "/posts/", "/photo", "/video", "/story"]
            .iter()
            .any(|fragment| path.contains(fragment))
    {
        ExtractionStrategy::Facebook
    } else {
        ExtractionStrategy::Generic
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

/// Layered extraction engine: standard oEmbed, then platform-specific
/// scrapers, then the generic Open Graph fallback. Strategy failures are
/// converted to fallthrough; only exhaustion of all strategies surfaces as
/// [`EmbedError::ExtractionFailed`].
pub struct ExtractionEngine {
    matcher: Arc<UrlMatcher>,
    fetcher: Fetcher,
    scraper: MetadataScraper,
}

impl ExtractionEngine {
    pub fn new(matcher: Arc<UrlMatcher>) -> Self {
        Self::new_with_fetcher(matcher, Fetcher::new())
    }

    pub fn new_with_fetcher(matcher: Arc<UrlMatcher>, fetcher: Fetcher) -> Self {
        Self {
            matcher,
            fetcher,
            scraper: MetadataScraper::new(),
        }
    }

    pub fn matcher(&self) -> &UrlMatcher {
        &self.matcher
    }

    pub fn strategy_for(&self, url: &str) -> ExtractionStrategy {
        select_strategy(self.matcher.match_url(url), url)
    }

    #[instrument(level = "debug", skip(self), err)]
    pub async fn extract(
        &self,
        url: &str,
        options: ExtractOptions,
    ) -> Result<EmbedResult, EmbedError> {
        Url::parse(url)?;

        let provider = self.matcher.match_url(url);
        let strategy = select_strategy(provider, url);
        debug!(url = %url, strategy = ?strategy, "dispatching extraction");

        let primary = self
            .run_strategy(strategy, provider, url, options)
            .await
            .and_then(|embed| embed.validate().map(|()| embed));

        match primary {
            Ok(embed) => Ok(embed),
            Err(e) if strategy != ExtractionStrategy::Generic => {
                warn!(url = %url, error = %e, "strategy failed, falling back to generic extraction");
                match self
                    .extract_generic(url)
                    .await
                    .and_then(|embed| embed.validate().map(|()| embed))
                {
                    Ok(embed) => Ok(embed),
                    Err(fallback_err) => {
                        warn!(url = %url, error = %fallback_err, "generic fallback failed");
                        Err(EmbedError::ExtractionFailed(url.to_string()))
                    }
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "generic extraction failed");
                Err(EmbedError::ExtractionFailed(url.to_string()))
            }
        }
    }

    async fn run_strategy(
        &self,
        strategy: ExtractionStrategy,
        provider: Option<&Provider>,
        url: &str,
        options: ExtractOptions,
    ) -> Result<EmbedResult, EmbedError> {
        let require_provider = || {
            provider.ok_or_else(|| {
                EmbedError::ExtractError("standard extraction requires a matched provider".into())
            })
        };

        match strategy {
            ExtractionStrategy::Standard => {
                self.extract_standard(require_provider()?, url, options).await
            }
            ExtractionStrategy::YouTube => {
                self.extract_youtube(require_provider()?, url, options).await
            }
            ExtractionStrategy::Twitter => {
                self.extract_twitter(require_provider()?, url, options).await
            }
            ExtractionStrategy::TikTok => self.extract_tiktok(provider, url, options).await,
            ExtractionStrategy::Instagram => self.extract_instagram(url).await,
            ExtractionStrategy::Pinterest => self.extract_pinterest(url).await,
            ExtractionStrategy::Facebook => self.extract_facebook(url).await,
            ExtractionStrategy::Generic => self.extract_generic(url).await,
        }
    }

    async fn extract_standard(
        &self,
        provider: &Provider,
        url: &str,
        options: ExtractOptions,
    ) -> Result<EmbedResult, EmbedError> {
        let endpoint = provider.oembed_endpoint.as_deref().ok_or_else(|| {
            EmbedError::ExtractError(format!("{} exposes no oEmbed endpoint", provider.slug))
        })?;

        let payload = self
            .fetcher
            .fetch_oembed(endpoint, url, options.max_width, options.max_height)
            .await?;

        Ok(embed_from_payload(payload, provider))
    }

    async fn extract_youtube(
        &self,
        provider: &Provider,
        url: &str,
        options: ExtractOptions,
    ) -> Result<EmbedResult, EmbedError> {
        let mut embed = self.extract_standard(provider, url, options).await?;
        embed.platform = Some("youtube".into());
        embed.platform_id = youtube_video_id(url);
        Ok(embed)
    }

    async fn extract_twitter(
        &self,
        provider: &Provider,
        url: &str,
        options: ExtractOptions,
    ) -> Result<EmbedResult, EmbedError> {
        let mut embed = self.extract_standard(provider, url, options).await?;
        embed.platform = Some("twitter".into());
        embed.platform_id = twitter_status_id(url);
        Ok(embed)
    }

    /// TikTok is three-tiered: official oEmbed, oEmbed enhanced with a
    /// scraped card when it answers without markup, then a blockquote card
    /// built purely from page metadata.
    async fn extract_tiktok(
        &self,
        provider: Option<&Provider>,
        url: &str,
        options: ExtractOptions,
    ) -> Result<EmbedResult, EmbedError> {
        if let Some(provider) = provider.filter(|p| p.oembed_endpoint.is_some()) {
            match self.extract_standard(provider, url, options).await {
                Ok(mut embed) if embed.html.is_some() => {
                    embed.platform = Some("tiktok".into());
                    embed.platform_id = tiktok_video_id(url);
                    return Ok(embed);
                }
                Ok(embed) => {
                    debug!(url = %url, "TikTok oEmbed answered without markup, enhancing");
                    let meta = self.page_metadata(url).await.unwrap_or_default();
                    let title = embed.title.clone().or_else(|| meta.title.clone());
                    let description =
                        embed.description.clone().or_else(|| meta.description.clone());
                    let thumbnail = embed.thumbnail_url.clone().or_else(|| meta.image.clone());
                    let html = cards::tiktok_card(
                        url,
                        title.as_deref(),
                        description.as_deref(),
                        thumbnail.as_deref(),
                        embed.author_name.as_deref(),
                    );
                    return Ok(EmbedResult {
                        kind: EmbedKind::Rich,
                        title,
                        description,
                        thumbnail_url: thumbnail,
                        author_name: embed.author_name,
                        author_url: embed.author_url,
                        provider_name: Some("TikTok".into()),
                        provider_url: Some("https://www.tiktok.com/".into()),
                        platform: Some("tiktok".into()),
                        platform_id: tiktok_video_id(url),
                        html: Some(html),
                        ..Default::default()
                    });
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "TikTok oEmbed failed, scraping page");
                }
            }
        }

        let meta = self.page_metadata(url).await?;
        if meta.is_empty() {
            return Err(EmbedError::ExtractError(
                "TikTok page advertises no metadata".into(),
            ));
        }

        let video_id = tiktok_video_id(url);
        let title = meta.title.clone().or_else(|| Some("TikTok Video".into()));
        let html = cards::tiktok_blockquote(
            url,
            video_id.as_deref(),
            title.as_deref(),
            meta.description.as_deref(),
            meta.image.as_deref(),
        );

        Ok(EmbedResult {
            kind: EmbedKind::Rich,
            title,
            description: meta.description,
            thumbnail_url: meta.image,
            author_name: meta.author,
            provider_name: Some("TikTok".into()),
            provider_url: Some("https://www.tiktok.com/".into()),
            platform: Some("tiktok".into()),
            platform_id: video_id,
            html: Some(html),
            ..Default::default()
        })
    }

    /// Instagram's oEmbed requires a Facebook access token, so posts are
    /// rendered from scraped page metadata instead.
    async fn extract_instagram(&self, url: &str) -> Result<EmbedResult, EmbedError> {
        let post_id = instagram_post_id(url)
            .ok_or_else(|| EmbedError::ExtractError("no Instagram post id in URL".into()))?;

        let meta = self.page_metadata(url).await?;
        if meta.is_empty() {
            return Err(EmbedError::ExtractError(
                "Instagram page advertises no metadata".into(),
            ));
        }

        let html = cards::instagram_card(url, &meta);
        Ok(EmbedResult {
            kind: EmbedKind::Rich,
            title: meta.title,
            description: meta.description,
            thumbnail_url: meta.image,
            author_name: meta.author,
            provider_name: Some("Instagram".into()),
            provider_url: Some("https://instagram.com/".into()),
            platform: Some("instagram".into()),
            platform_id: Some(post_id),
            html: Some(html),
            ..Default::default()
        })
    }

    async fn extract_pinterest(&self, url: &str) -> Result<EmbedResult, EmbedError> {
        // pin.it short links redirect to the canonical pin URL.
        let resolved = if url.contains("pin.it") {
            self.fetcher.resolve_redirects(url).await?
        } else {
            url.to_string()
        };

        let pin_id = pinterest_pin_id(&resolved)
            .ok_or_else(|| EmbedError::ExtractError("no Pinterest pin id in URL".into()))?;

        let meta = self.page_metadata(&resolved).await?;
        if meta.is_empty() {
            return Err(EmbedError::ExtractError(
                "Pinterest page advertises no metadata".into(),
            ));
        }

        let html = cards::pinterest_iframe(&pin_id, meta.title.as_deref());
        Ok(EmbedResult {
            kind: EmbedKind::Rich,
            title: meta.title,
            description: meta.description,
            thumbnail_url: meta.image,
            provider_name: Some("Pinterest".into()),
            provider_url: Some("https://pinterest.com/".into()),
            platform: Some("pinterest".into()),
            platform_id: Some(pin_id),
            html: Some(html),
            ..Default::default()
        })
    }

    async fn extract_facebook(&self, url: &str) -> Result<EmbedResult, EmbedError> {
        let facebook_id = facebook_post_id(url);

        let meta = self.page_metadata(url).await?;
        if meta.is_empty() {
            return Err(EmbedError::ExtractError(
                "Facebook page advertises no metadata".into(),
            ));
        }

        let title = meta
            .title
            .clone()
            .unwrap_or_else(|| "Facebook Post".to_string());
        let is_video = url.to_ascii_lowercase().contains("video")
            || title.to_ascii_lowercase().contains("video")
            || meta
                .og_type
                .as_deref()
                .is_some_and(|t| t.contains("video"));

        let html = cards::facebook_card(
            url,
            Some(&title),
            meta.description.as_deref(),
            meta.image.as_deref(),
            is_video,
        );

        Ok(EmbedResult {
            kind: EmbedKind::Rich,
            title: Some(title),
            description: meta.description,
            thumbnail_url: meta.image,
            provider_name: Some("Facebook".into()),
            provider_url: Some("https://facebook.com/".into()),
            platform: Some("facebook".into()),
            platform_id: facebook_id,
            html: Some(html),
            ..Default::default()
        })
    }

    async fn extract_generic(&self, url: &str) -> Result<EmbedResult, EmbedError> {
        let meta = self.page_metadata(url).await?;
        if meta.is_empty() {
            return Err(EmbedError::ExtractError(
                "page advertises no usable metadata".into(),
            ));
        }

        let domain = host_from_url(url).unwrap_or_else(|| "unknown".into());
        let html = cards::generic_card(
            url,
            &domain,
            meta.title.as_deref(),
            meta.description.as_deref(),
            meta.image.as_deref(),
        );

        Ok(EmbedResult {
            kind: EmbedKind::Rich,
            title: meta.title,
            description: meta.description,
            thumbnail_url: meta.image,
            author_name: meta.author,
            provider_name: Some(domain.clone()),
            provider_url: Some(format!("https://{domain}")),
            platform: Some("generic".into()),
            html: Some(html),
            ..Default::default()
        })
    }

    async fn page_metadata(&self, url: &str) -> Result<PageMetadata, EmbedError> {
        let html = self.fetcher.fetch_page(url).await?;
        Ok(self.scraper.scrape(&html, url))
    }
}

/// Convert a raw oEmbed payload, stamping provenance from the matched
/// provider. The upstream body is untrusted for `platform`/`provider_*`.
pub(crate) fn embed_from_payload(payload: OEmbedPayload, provider: &Provider) -> EmbedResult {
    EmbedResult {
        kind: EmbedKind::from_oembed_type(&payload.kind),
        title: payload.title,
        author_name: payload.author_name,
        author_url: payload.author_url,
        provider_name: Some(provider.name.clone()),
        provider_url: Some(provider.homepage.clone()),
        thumbnail_url: payload.thumbnail_url,
        thumbnail_width: payload.thumbnail_width,
        thumbnail_height: payload.thumbnail_height,
        content_url: payload.url,
        width: payload.width,
        height: payload.height,
        html: payload.html,
        platform: Some(provider.slug.clone()),
        description: payload.description,
        duration: payload.duration.map(u64::from),
        ..Default::default()
    }
}
