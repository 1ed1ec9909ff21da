use crate::{EmbedError, EmbedResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Hex SHA-256 of the exact URL string. Deliberately no normalization:
/// two URLs differing only in tracking parameters cache separately. This
/// trades hit rate for simplicity and is relied on by callers using the
/// hash as a stable result reference.
pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Entries expire at the end of their creation day (UTC), capping
/// staleness at ~24h regardless of creation time.
fn end_of_day_utc(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .and_hms_micro_opt(23, 59, 59, 999_999)
        .expect("23:59:59.999999 is a valid time")
        .and_utc()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url_hash: String,
    pub original_url: String,
    /// Serialized [`EmbedResult`].
    pub payload: serde_json::Value,
    pub status_code: u16,
    pub platform: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
    pub last_hit_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub fn embed(&self) -> Result<EmbedResult, EmbedError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| EmbedError::CacheError(format!("undecodable cached payload: {e}")))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PurgeFilter {
    pub platform: Option<String>,
    pub older_than_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformCount {
    pub platform: String,
    pub entries: u64,
    pub total_hits: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopUrl {
    pub url: String,
    pub hits: u64,
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub total_entries: u64,
    pub active_entries: u64,
    pub expired_entries: u64,
    pub platforms: Vec<PlatformCount>,
    pub top_urls: Vec<TopUrl>,
}

/// Persistence collaborator for cache rows. Implementations must make
/// `record_hit` atomic per key: concurrent readers may never lose an
/// increment to a last-write-wins race.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, url_hash: &str) -> Result<Option<CacheEntry>, EmbedError>;

    /// Insert or overwrite the row for `entry.url_hash`.
    async fn insert(&self, entry: CacheEntry) -> Result<(), EmbedError>;

    /// Increment `hit_count` and stamp `last_hit_at`, returning the updated
    /// row. `None` when the row disappeared concurrently.
    async fn record_hit(
        &self,
        url_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, EmbedError>;

    /// Remove rows with `expires_at < now`. Returns how many were removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, EmbedError>;

    /// Remove rows matching the filter. Returns how many were removed.
    async fn purge(&self, filter: &PurgeFilter) -> Result<u64, EmbedError>;

    async fn stats(&self) -> Result<CacheStats, EmbedError>;
}

/// In-memory store. DashMap's per-key exclusive guard serializes hit
/// increments, satisfying the atomicity contract.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, url_hash: &str) -> Result<Option<CacheEntry>, EmbedError> {
        Ok(self.entries.get(url_hash).map(|entry| entry.clone()))
    }

    async fn insert(&self, entry: CacheEntry) -> Result<(), EmbedError> {
        self.entries.insert(entry.url_hash.clone(), entry);
        Ok(())
    }

    async fn record_hit(
        &self,
        url_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, EmbedError> {
        Ok(self.entries.get_mut(url_hash).map(|mut entry| {
            entry.hit_count += 1;
            entry.last_hit_at = Some(at);
            entry.clone()
        }))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, EmbedError> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at >= now);
        Ok((before - self.entries.len()) as u64)
    }

    async fn purge(&self, filter: &PurgeFilter) -> Result<u64, EmbedError> {
        let cutoff = filter
            .older_than_days
            .map(|days| Utc::now() - chrono::Duration::days(days));
        let before = self.entries.len();

        self.entries.retain(|_, entry| {
            let platform_matches = filter
                .platform
                .as_deref()
                .map(|p| entry.platform.as_deref() == Some(p))
                .unwrap_or(true);
            let age_matches = cutoff.map(|c| entry.created_at < c).unwrap_or(true);
            // Retain everything the filter does NOT select.
            !(platform_matches && age_matches)
        });

        Ok((before - self.entries.len()) as u64)
    }

    async fn stats(&self) -> Result<CacheStats, EmbedError> {
        let now = Utc::now();
        let mut stats = CacheStats::default();
        let mut platforms: std::collections::HashMap<String, (u64, u64)> =
            std::collections::HashMap::new();
        let mut top: Vec<TopUrl> = Vec::new();

        for entry in self.entries.iter() {
            stats.total_entries += 1;
            if entry.expires_at < now {
                stats.expired_entries += 1;
            }
            let key = entry.platform.clone().unwrap_or_else(|| "unknown".into());
            let slot = platforms.entry(key).or_default();
            slot.0 += 1;
            slot.1 += entry.hit_count;
            top.push(TopUrl {
                url: entry.original_url.clone(),
                hits: entry.hit_count,
                platform: entry.platform.clone(),
            });
        }

        stats.active_entries = stats.total_entries - stats.expired_entries;
        stats.platforms = platforms
            .into_iter()
            .map(|(platform, (entries, total_hits))| PlatformCount {
                platform,
                entries,
                total_hits,
            })
            .collect();

        top.sort_by(|a, b| b.hits.cmp(&a.hits));
        top.truncate(10);
        stats.top_urls = top;

        Ok(stats)
    }
}

/// Read-through/write-through cache in front of the extraction engine.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Cache lookup. A hit increments `hit_count` and stamps `last_hit_at`;
    /// an expired entry is logically absent even if not yet purged.
    pub async fn get(&self, url: &str) -> Result<Option<(CacheEntry, EmbedResult)>, EmbedError> {
        let hash = url_hash(url);

        let Some(entry) = self.store.get(&hash).await? else {
            return Ok(None);
        };
        if entry.is_expired() {
            debug!(url = %url, "cache entry expired, treating as miss");
            return Ok(None);
        }

        let Some(updated) = self.store.record_hit(&hash, Utc::now()).await? else {
            return Ok(None);
        };
        let embed = updated.embed()?;
        debug!(url = %url, hit_count = updated.hit_count, "cache hit");
        Ok(Some((updated, embed)))
    }

    /// Store a successful extraction. The entry expires at the end of the
    /// current UTC day.
    pub async fn put(
        &self,
        url: &str,
        embed: &EmbedResult,
        status_code: u16,
    ) -> Result<CacheEntry, EmbedError> {
        let now = Utc::now();
        let entry = CacheEntry {
            url_hash: url_hash(url),
            original_url: url.to_string(),
            payload: serde_json::to_value(embed)
                .map_err(|e| EmbedError::CacheError(format!("unserializable payload: {e}")))?,
            status_code,
            platform: embed.platform.clone(),
            expires_at: end_of_day_utc(now),
            hit_count: 0,
            last_hit_at: None,
            created_at: now,
        };

        self.store.insert(entry.clone()).await?;
        debug!(url = %url, expires_at = %entry.expires_at, "cached embed");
        Ok(entry)
    }

    pub async fn delete_expired(&self) -> Result<u64, EmbedError> {
        self.store.delete_expired(Utc::now()).await
    }

    pub async fn purge(&self, filter: &PurgeFilter) -> Result<u64, EmbedError> {
        self.store.purge(filter).await
    }

    pub async fn stats(&self) -> Result<CacheStats, EmbedError> {
        self.store.stats().await
    }
}
