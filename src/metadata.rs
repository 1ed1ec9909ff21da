use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// Metadata a page advertises about itself for link previews.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub author: Option<String>,
    /// `og:type`, when present (used e.g. for Facebook video detection).
    pub og_type: Option<String>,
}

impl PageMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.image.is_none()
            && self.author.is_none()
    }
}

/// Extracts [`PageMetadata`] from page HTML: Open Graph tags first, then
/// Twitter Card tags, then bare HTML fallbacks, in that order.
#[derive(Debug, Clone, Default)]
pub struct MetadataScraper;

impl MetadataScraper {
    pub fn new() -> Self {
        Self
    }

    pub fn scrape(&self, html: &str, url: &str) -> PageMetadata {
        let document = Html::parse_document(html);

        let title = meta_property(&document, "og:title")
            .or_else(|| meta_name(&document, "twitter:title"))
            .or_else(|| page_title(&document));

        let description = meta_property(&document, "og:description")
            .or_else(|| meta_name(&document, "twitter:description"))
            .or_else(|| meta_name(&document, "description"));

        let image = meta_property(&document, "og:image")
            .or_else(|| meta_name(&document, "twitter:image"))
            .map(|img| resolve_image_url(url, &img));

        let author = meta_property(&document, "og:author").or_else(|| meta_name(&document, "author"));

        let og_type = meta_property(&document, "og:type");

        let metadata = PageMetadata {
            title,
            description,
            image,
            author,
            og_type,
        };
        debug!(url = %url, has_title = metadata.title.is_some(), has_image = metadata.image.is_some(), "scraped page metadata");
        metadata
    }
}

fn meta_property(document: &Html, property: &str) -> Option<String> {
    let selector = Selector::parse(&format!("meta[property='{property}']")).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn meta_name(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!("meta[name='{name}']")).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn page_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Pages sometimes advertise relative image paths; resolve them against
/// the page URL.
fn resolve_image_url(page_url: &str, image: &str) -> String {
    if image.starts_with("http://") || image.starts_with("https://") {
        return image.to_string();
    }
    match Url::parse(page_url).and_then(|base| base.join(image)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => image.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://example.com/articles/42";

    #[test]
    fn prefers_open_graph_tags() {
        let html = r#"<html><head>
            <meta property="og:title" content="OG title" />
            <meta name="twitter:title" content="Card title" />
            <meta property="og:description" content="OG description" />
            <meta property="og:image" content="https://example.com/og.png" />
            <meta property="og:type" content="article" />
            <title>Plain title</title>
        </head><body></body></html>"#;

        let metadata = MetadataScraper::new().scrape(html, PAGE_URL);
        assert_eq!(metadata.title.as_deref(), Some("OG title"));
        assert_eq!(metadata.description.as_deref(), Some("OG description"));
        assert_eq!(metadata.image.as_deref(), Some("https://example.com/og.png"));
        assert_eq!(metadata.og_type.as_deref(), Some("article"));
    }

    #[test]
    fn falls_back_to_twitter_card_then_title() {
        let html = r#"<html><head>
            <meta name="twitter:title" content="Card title" />
            <meta name="twitter:image" content="https://example.com/card.png" />
            <title>Plain title</title>
        </head></html>"#;

        let metadata = MetadataScraper::new().scrape(html, PAGE_URL);
        assert_eq!(metadata.title.as_deref(), Some("Card title"));
        assert_eq!(metadata.image.as_deref(), Some("https://example.com/card.png"));

        let html = "<html><head><title> Plain title </title></head></html>";
        let metadata = MetadataScraper::new().scrape(html, PAGE_URL);
        assert_eq!(metadata.title.as_deref(), Some("Plain title"));
        assert!(metadata.image.is_none());
    }

    #[test]
    fn resolves_relative_image_urls() {
        let html = r#"<html><head>
            <meta property="og:image" content="/static/img.png" />
        </head></html>"#;

        let metadata = MetadataScraper::new().scrape(html, PAGE_URL);
        assert_eq!(
            metadata.image.as_deref(),
            Some("https://example.com/static/img.png")
        );
    }

    #[test]
    fn empty_page_yields_empty_metadata() {
        let metadata = MetadataScraper::new().scrape("<html></html>", PAGE_URL);
        assert!(metadata.is_empty());
    }
}
