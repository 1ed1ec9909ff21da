use crate::rate_limit::RateLimiter;
use crate::utils::host_from_url;
use crate::EmbedError;
use reqwest::{header::HeaderMap, Client};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument};

const DEFAULT_USER_AGENT: &str = concat!("url-embed/", env!("CARGO_PKG_VERSION"));

/// Raw oEmbed response body as providers return it. Everything beyond
/// `type` is optional in the wild, and dimensions arrive as numbers or
/// strings ("100%") depending on the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct OEmbedPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_url: Option<String>,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub provider_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub thumbnail_width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub thumbnail_height: Option<u32>,
    /// Content URL for `photo` embeds.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub height: Option<u32>,
    /// Embed markup for `video`/`rich` embeds.
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub duration: Option<u32>,
}

/// Accepts `325`, `"325"` or `"100%"` (leading digits).
fn lenient_dimension<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as u32),
        serde_json::Value::String(s) => {
            let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        }
        _ => None,
    }))
}

/// Configuration for building a [`Fetcher`].
pub struct FetcherConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub headers: Option<HeaderMap>,
    pub redirect_policy: Option<reqwest::redirect::Policy>,
    /// Shared limiter applied to requests against `throttled_hosts`.
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub throttled_hosts: HashSet<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            headers: None,
            redirect_policy: None,
            rate_limiter: None,
            throttled_hosts: HashSet::new(),
        }
    }
}

/// HTTP client wrapper shared by all extraction strategies.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    rate_limiter: Option<Arc<RateLimiter>>,
    throttled_hosts: Arc<HashSet<String>>,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher {
    pub fn new() -> Self {
        Self::new_with_config(FetcherConfig::default())
    }

    pub fn new_with_config(config: FetcherConfig) -> Self {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .pool_max_idle_per_host(10);

        if let Some(headers) = config.headers {
            builder = builder.default_headers(headers);
        }
        if let Some(policy) = config.redirect_policy {
            builder = builder.redirect(policy);
        }

        let client = builder.build().unwrap_or_else(|e| {
            error!(error = %e, "failed to create HTTP client");
            panic!("failed to initialize HTTP client: {e}");
        });

        Self {
            client,
            rate_limiter: config.rate_limiter,
            throttled_hosts: Arc::new(config.throttled_hosts),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            rate_limiter: None,
            throttled_hosts: Arc::new(HashSet::new()),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn throttle(&self, url: &str) {
        let Some(limiter) = &self.rate_limiter else {
            return;
        };
        let Some(host) = host_from_url(url) else {
            return;
        };
        if self.throttled_hosts.contains(&host) {
            debug!(host = %host, "host is rate-constrained, acquiring slot");
            limiter.acquire().await;
        }
    }

    /// Standard oEmbed endpoint call: `GET endpoint?url=...&format=json`
    /// with optional `maxwidth`/`maxheight`.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn fetch_oembed(
        &self,
        endpoint: &str,
        target_url: &str,
        max_width: Option<u32>,
        max_height: Option<u32>,
    ) -> Result<OEmbedPayload, EmbedError> {
        self.throttle(endpoint).await;

        let mut params: Vec<(&str, String)> = vec![
            ("url", target_url.to_string()),
            ("format", "json".to_string()),
        ];
        if let Some(w) = max_width {
            params.push(("maxwidth", w.to_string()));
        }
        if let Some(h) = max_height {
            params.push(("maxheight", h.to_string()));
        }

        let response = self
            .client
            .get(endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| EmbedError::FetchError(format!("oEmbed request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EmbedError::FetchError(format!(
                "oEmbed endpoint returned status {}",
                response.status()
            )));
        }

        let payload = response
            .json::<OEmbedPayload>()
            .await
            .map_err(|e| EmbedError::ExtractError(format!("unparsable oEmbed body: {e}")))?;

        debug!(target_url = %target_url, kind = %payload.kind, "fetched oEmbed payload");
        Ok(payload)
    }

    /// Fetch page HTML, following redirects.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn fetch_page(&self, url: &str) -> Result<String, EmbedError> {
        self.throttle(url).await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EmbedError::FetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbedError::FetchError(format!(
                "page fetch returned status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EmbedError::FetchError(format!("failed to read body: {e}")))?;

        debug!(url = %url, content_length = body.len(), "fetched page");
        Ok(body)
    }

    /// Resolve a short link (`pin.it`, ...) to its final URL via HEAD.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn resolve_redirects(&self, url: &str) -> Result<String, EmbedError> {
        self.throttle(url).await;

        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| EmbedError::FetchError(format!("redirect resolution failed: {e}")))?;

        Ok(response.url().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oembed_payload_parses_standard_fields() {
        let body = r#"{
            "type": "video",
            "version": "1.0",
            "title": "Some video",
            "author_name": "Author",
            "provider_name": "YouTube",
            "provider_url": "https://www.youtube.com/",
            "thumbnail_url": "https://i.ytimg.com/vi/x/hqdefault.jpg",
            "thumbnail_width": 480,
            "thumbnail_height": 360,
            "width": 200,
            "height": 113,
            "html": "<iframe></iframe>"
        }"#;

        let payload: OEmbedPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.kind, "video");
        assert_eq!(payload.thumbnail_width, Some(480));
        assert_eq!(payload.html.as_deref(), Some("<iframe></iframe>"));
    }

    #[test]
    fn oembed_payload_tolerates_string_dimensions() {
        // TikTok answers with percentage widths.
        let body = r#"{"type": "video", "width": "100%", "height": "300", "html": "<blockquote></blockquote>"}"#;
        let payload: OEmbedPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.width, Some(100));
        assert_eq!(payload.height, Some(300));

        let body = r#"{"type": "video", "width": "auto"}"#;
        let payload: OEmbedPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.width, None);
    }

    #[test]
    fn missing_type_is_an_error() {
        assert!(serde_json::from_str::<OEmbedPayload>(r#"{"title": "x"}"#).is_err());
    }
}
