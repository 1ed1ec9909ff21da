use url_embed::{ExtractionStrategy, Provider, ProviderRegistry, UrlMatcher};

#[test]
fn every_registered_pattern_resolves_to_its_provider() {
    let matcher = UrlMatcher::default();

    for (url, slug) in [
        ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "youtube"),
        ("https://www.youtube.com/v/dQw4w9WgXcQ", "youtube"),
        ("https://youtu.be/dQw4w9WgXcQ", "youtube"),
        ("https://vimeo.com/76979871", "vimeo"),
        ("https://player.vimeo.com/video/76979871", "vimeo"),
        ("https://twitter.com/rustlang/status/1234567890", "twitter"),
        ("https://mobile.twitter.com/rustlang/status/1", "twitter"),
        ("https://soundcloud.com/artist/track-name", "soundcloud"),
        ("https://m.soundcloud.com/artist/track-name", "soundcloud"),
        ("https://instagram.com/p/Cabc123/", "instagram"),
        ("https://vm.tiktok.com/ZMabc/", "tiktok"),
        ("https://old.reddit.com/r/rust/comments/abc/title/", "reddit"),
        ("https://open.spotify.com/episode/xyz", "spotify"),
        ("https://pin.it/3abcdef", "pinterest"),
    ] {
        assert_eq!(
            matcher.match_url(url).map(|p| p.slug.as_str()),
            Some(slug),
            "{url}"
        );
    }
}

#[test]
fn overlapping_patterns_resolve_deterministically_to_the_first() {
    let mut registry = ProviderRegistry::default();
    for slug in ["alpha", "beta", "gamma"] {
        registry.register(
            Provider::new(
                slug,
                slug,
                "https://overlap.example/",
                None,
                &["https://overlap.example/*"],
                false,
            )
            .unwrap(),
        );
    }
    let matcher = UrlMatcher::new(registry);

    for _ in 0..10 {
        assert_eq!(
            matcher.match_url("https://overlap.example/x").unwrap().slug,
            "alpha"
        );
    }
}

#[test]
fn provider_match_and_support_check_are_distinct() {
    let matcher = UrlMatcher::default();

    // Facebook post paths: supported, but no provider (no oEmbed protocol).
    let facebook = "https://www.facebook.com/someone/posts/10158011";
    assert!(matcher.match_url(facebook).is_none());
    assert!(matcher.is_supported(facebook));

    // Instagram: both a provider match and supported.
    let instagram = "https://www.instagram.com/reel/Cabc/";
    assert!(matcher.match_url(instagram).is_some());
    assert!(matcher.is_supported(instagram));

    // Arbitrary blog: neither.
    assert!(matcher.match_url("https://blog.example.com/post").is_none());
    assert!(!matcher.is_supported("https://blog.example.com/post"));
}

#[test]
fn instagram_is_flagged_as_auth_gated() {
    let registry = ProviderRegistry::builtin();
    assert!(registry.get("instagram").unwrap().requires_auth);
    assert!(!registry.get("youtube").unwrap().requires_auth);
    // Pinterest carries no endpoint at all.
    assert!(registry.get("pinterest").unwrap().oembed_endpoint.is_none());
}

#[test]
fn strategy_selection_is_a_closed_decision_table() {
    let matcher = UrlMatcher::default();
    let strategy = |url: &str| url_embed::select_strategy(matcher.match_url(url), url);

    assert_eq!(
        strategy("https://www.youtube.com/watch?v=x"),
        ExtractionStrategy::YouTube
    );
    assert_eq!(strategy("https://vimeo.com/1"), ExtractionStrategy::Standard);
    assert_eq!(
        strategy("https://www.facebook.com/u/videos/9"),
        ExtractionStrategy::Facebook
    );
    assert_eq!(
        strategy("https://news.example.org/story"),
        ExtractionStrategy::Generic
    );
}
