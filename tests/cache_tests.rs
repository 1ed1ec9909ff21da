use chrono::Utc;
use std::sync::Arc;
use url_embed::{
    url_hash, CacheStore, EmbedKind, EmbedResult, MemoryCacheStore, PurgeFilter, ResponseCache,
};

fn video_embed(platform: &str) -> EmbedResult {
    EmbedResult {
        title: Some("Never Gonna Give You Up".into()),
        author_name: Some("Rick Astley".into()),
        html: Some("<iframe src=\"https://player.example/x\"></iframe>".into()),
        platform: Some(platform.into()),
        platform_id: Some("dQw4w9WgXcQ".into()),
        width: Some(200),
        height: Some(113),
        ..EmbedResult::new(EmbedKind::Video)
    }
}

#[tokio::test]
async fn every_get_increments_hit_count_by_exactly_one() {
    let cache = ResponseCache::in_memory();
    let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    let entry = cache.put(url, &video_embed("youtube"), 200).await.unwrap();
    assert_eq!(entry.hit_count, 0);
    assert!(entry.last_hit_at.is_none());

    for expected in 1..=5u64 {
        let (entry, _) = cache.get(url).await.unwrap().unwrap();
        assert_eq!(entry.hit_count, expected);
        assert!(entry.last_hit_at.is_some());
    }
}

#[tokio::test]
async fn cached_payload_round_trips_byte_for_byte() {
    let cache = ResponseCache::in_memory();
    let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ&utm_source=feed";
    let embed = video_embed("youtube");

    cache.put(url, &embed, 200).await.unwrap();
    let (_, cached) = cache.get(url).await.unwrap().unwrap();

    assert_eq!(cached, embed);
    assert_eq!(
        serde_json::to_vec(&cached).unwrap(),
        serde_json::to_vec(&embed).unwrap()
    );
}

#[tokio::test]
async fn cache_keys_are_byte_exact() {
    let cache = ResponseCache::in_memory();

    // Same page, different tracking parameter: cached separately by design.
    let bare = "https://example.com/a";
    let tracked = "https://example.com/a?utm_source=x";
    assert_ne!(url_hash(bare), url_hash(tracked));

    cache.put(bare, &video_embed("generic"), 200).await.unwrap();
    assert!(cache.get(bare).await.unwrap().is_some());
    assert!(cache.get(tracked).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_entries_are_logically_absent_until_swept() {
    let store = Arc::new(MemoryCacheStore::new());
    let cache = ResponseCache::new(store.clone());
    let url = "https://example.com/yesterday";

    let mut entry = cache.put(url, &video_embed("generic"), 200).await.unwrap();
    entry.expires_at = Utc::now() - chrono::Duration::minutes(1);
    store.insert(entry).await.unwrap();

    assert!(cache.get(url).await.unwrap().is_none());
    assert_eq!(store.len(), 1, "not yet purged, only logically absent");

    assert_eq!(cache.delete_expired().await.unwrap(), 1);
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn entries_expire_at_end_of_creation_day_utc() {
    let cache = ResponseCache::in_memory();
    let entry = cache
        .put("https://example.com/x", &video_embed("generic"), 200)
        .await
        .unwrap();

    let now = Utc::now();
    assert!(entry.expires_at > now);
    assert_eq!(entry.expires_at.date_naive(), entry.created_at.date_naive());
    // Staleness is capped to the day boundary, never a full 24h+ TTL.
    assert!((entry.expires_at - now) <= chrono::Duration::hours(24));
}

#[tokio::test]
async fn purge_by_platform_leaves_other_platforms_alone() {
    let cache = ResponseCache::in_memory();
    cache.put("https://a", &video_embed("youtube"), 200).await.unwrap();
    cache.put("https://b", &video_embed("vimeo"), 200).await.unwrap();

    let removed = cache
        .purge(&PurgeFilter {
            platform: Some("vimeo".into()),
            older_than_days: None,
        })
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert!(cache.get("https://a").await.unwrap().is_some());
    assert!(cache.get("https://b").await.unwrap().is_none());
}

#[tokio::test]
async fn stats_report_hits_per_platform() {
    let cache = ResponseCache::in_memory();
    cache.put("https://a", &video_embed("youtube"), 200).await.unwrap();
    cache.put("https://b", &video_embed("youtube"), 200).await.unwrap();

    cache.get("https://a").await.unwrap();
    cache.get("https://a").await.unwrap();
    cache.get("https://b").await.unwrap();

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.active_entries, 2);
    assert_eq!(stats.platforms.len(), 1);
    assert_eq!(stats.platforms[0].platform, "youtube");
    assert_eq!(stats.platforms[0].total_hits, 3);
    assert_eq!(stats.top_urls[0].url, "https://a");
    assert_eq!(stats.top_urls[0].hits, 2);
}
