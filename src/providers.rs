use crate::EmbedError;
use regex::Regex;
use tracing::debug;
use url::Url;

/// Domains handled outside the provider table. A URL matching one of these
/// is still worth an extraction attempt even though no provider (and hence
/// no oEmbed protocol) applies to it.
const CUSTOM_PLATFORM_DOMAINS: &[&str] = &[
    "eksisozluk.com",
    "4chan.org",
    "4channel.org",
    "facebook.com",
    "fb.com",
    "pinterest.com",
    "pin.it",
    "tiktok.com",
    "vm.tiktok.com",
];

/// A platform with its URL-matching rules and optional oEmbed endpoint.
/// Loaded once at startup, never mutated at runtime.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Display name, e.g. `X (Twitter)`.
    pub name: String,
    /// Normalized platform slug, e.g. `twitter`.
    pub slug: String,
    pub homepage: String,
    pub oembed_endpoint: Option<String>,
    pub url_patterns: Vec<String>,
    pub requires_auth: bool,
    compiled: Vec<Regex>,
}

impl Provider {
    pub fn new(
        name: &str,
        slug: &str,
        homepage: &str,
        oembed_endpoint: Option<&str>,
        url_patterns: &[&str],
        requires_auth: bool,
    ) -> Result<Self, EmbedError> {
        let compiled = url_patterns
            .iter()
            .map(|p| compile_scheme_pattern(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            slug: slug.to_string(),
            homepage: homepage.to_string(),
            oembed_endpoint: oembed_endpoint.map(String::from),
            url_patterns: url_patterns.iter().map(|s| s.to_string()).collect(),
            requires_auth,
            compiled,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.compiled.iter().any(|re| re.is_match(url))
    }
}

/// Compile a glob-style scheme pattern (`*` wildcard) into an anchored regex.
fn compile_scheme_pattern(pattern: &str) -> Result<Regex, EmbedError> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{escaped}$"))
        .map_err(|e| EmbedError::ExtractError(format!("invalid scheme pattern {pattern:?}: {e}")))
}

/// The static provider table. Registration order is the documented
/// tie-break: the first matching provider wins.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Provider>) -> Self {
        Self { providers }
    }

    pub fn register(&mut self, provider: Provider) {
        self.providers.push(provider);
    }

    pub fn get(&self, slug: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.slug == slug)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// The built-in provider table.
    pub fn builtin() -> Self {
        let providers = vec![
            Provider::new(
                "YouTube",
                "youtube",
                "https://www.youtube.com/",
                Some("https://www.youtube.com/oembed"),
                &[
                    "https://www.youtube.com/watch*",
                    "https://www.youtube.com/v/*",
                    "https://youtu.be/*",
                    "https://www.youtube.com/shorts/*",
                ],
                false,
            ),
            Provider::new(
                "Vimeo",
                "vimeo",
                "https://vimeo.com/",
                Some("https://vimeo.com/api/oembed.json"),
                &[
                    "https://vimeo.com/*",
                    "https://player.vimeo.com/video/*",
                ],
                false,
            ),
            Provider::new(
                "X (Twitter)",
                "twitter",
                "https://x.com/",
                Some("https://publish.twitter.com/oembed"),
                &[
                    "https://twitter.com/*/status/*",
                    "https://x.com/*/status/*",
                    "https://mobile.twitter.com/*/status/*",
                ],
                false,
            ),
            Provider::new(
                "SoundCloud",
                "soundcloud",
                "https://soundcloud.com/",
                Some("https://soundcloud.com/oembed"),
                &[
                    "https://soundcloud.com/*",
                    "https://m.soundcloud.com/*",
                ],
                false,
            ),
            Provider::new(
                "Instagram",
                "instagram",
                "https://instagram.com/",
                Some("https://graph.facebook.com/v18.0/instagram_oembed"),
                &[
                    "https://www.instagram.com/p/*",
                    "https://www.instagram.com/reel/*",
                    "https://instagram.com/p/*",
                    "https://instagram.com/reel/*",
                ],
                true,
            ),
            Provider::new(
                "TikTok",
                "tiktok",
                "https://www.tiktok.com/",
                Some("https://www.tiktok.com/oembed"),
                &[
                    "https://www.tiktok.com/@*/video/*",
                    "https://vm.tiktok.com/*",
                    "https://tiktok.com/@*/video/*",
                ],
                false,
            ),
            Provider::new(
                "Reddit",
                "reddit",
                "https://reddit.com/",
                Some("https://www.reddit.com/oembed"),
                &[
                    "https://reddit.com/r/*/comments/*",
                    "https://www.reddit.com/r/*/comments/*",
                    "https://old.reddit.com/r/*/comments/*",
                ],
                false,
            ),
            Provider::new(
                "Spotify",
                "spotify",
                "https://spotify.com/",
                Some("https://open.spotify.com/oembed"),
                &[
                    "https://open.spotify.com/track/*",
                    "https://open.spotify.com/album/*",
                    "https://open.spotify.com/playlist/*",
                    "https://open.spotify.com/episode/*",
                    "https://open.spotify.com/show/*",
                ],
                false,
            ),
            // Pinterest ships no public oEmbed endpoint; pins are handled by
            // the platform-specific extractor.
            Provider::new(
                "Pinterest",
                "pinterest",
                "https://pinterest.com/",
                None,
                &[
                    "https://www.pinterest.com/pin/*",
                    "https://pinterest.com/pin/*",
                    "https://pin.it/*",
                ],
                false,
            ),
        ];

        let providers = providers
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .expect("builtin provider patterns must compile");

        Self { providers }
    }
}

/// Resolves a raw URL to at most one provider. Matching is purely
/// syntactic; no network calls.
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    registry: ProviderRegistry,
}

impl Default for UrlMatcher {
    fn default() -> Self {
        Self::new(ProviderRegistry::builtin())
    }
}

impl UrlMatcher {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// First provider whose patterns match, in registration order.
    pub fn match_url(&self, url: &str) -> Option<&Provider> {
        let matched = self.registry.providers.iter().find(|p| p.matches(url));
        if let Some(provider) = matched {
            debug!(url = %url, provider = %provider.slug, "matched provider");
        }
        matched
    }

    /// Whether extraction should be attempted at all. Deliberately wider
    /// than `match_url`: custom-platform domains without a provider entry
    /// (Pinterest short links, Facebook post paths, ...) are supported via
    /// platform-specific or generic extraction.
    pub fn is_supported(&self, url: &str) -> bool {
        if self.match_url(url).is_some() {
            return true;
        }

        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let domain = parsed
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or_default();

        CUSTOM_PLATFORM_DOMAINS
            .iter()
            .any(|platform| domain.contains(platform))
    }
}
