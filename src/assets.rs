use crate::EmbedError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Hard cap for mirrored thumbnails.
pub const THUMBNAIL_MAX_BYTES: u64 = 10 * 1024 * 1024;
/// Hard cap for mirrored content (photos, clips).
pub const CONTENT_MAX_BYTES: u64 = 50 * 1024 * 1024;

/// What is being preserved, driving size caps, MIME policy, and the
/// extension allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Thumbnail,
    Image,
    Video,
    Audio,
    Other,
}

impl AssetKind {
    pub fn max_bytes(&self) -> u64 {
        match self {
            AssetKind::Thumbnail => THUMBNAIL_MAX_BYTES,
            _ => CONTENT_MAX_BYTES,
        }
    }

    fn dir(&self) -> &'static str {
        match self {
            AssetKind::Thumbnail => "oembed/thumbnails",
            _ => "oembed/content",
        }
    }

    fn file_prefix(&self) -> &'static str {
        match self {
            AssetKind::Thumbnail => "thumbnail",
            _ => "content",
        }
    }

    fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            AssetKind::Thumbnail => &["jpg", "jpeg", "png", "gif", "webp"],
            AssetKind::Image => &["jpg", "jpeg", "png", "gif", "webp", "svg"],
            AssetKind::Video => &["mp4", "webm", "mov", "avi"],
            AssetKind::Audio => &["mp3", "wav", "ogg", "m4a"],
            AssetKind::Other => &["jpg", "jpeg", "png", "gif", "webp", "mp4", "mp3"],
        }
    }

    fn default_extension(&self) -> &'static str {
        match self {
            AssetKind::Thumbnail => "jpg",
            AssetKind::Image => "jpg",
            AssetKind::Video => "mp4",
            AssetKind::Audio => "mp3",
            AssetKind::Other => "bin",
        }
    }

    /// Thumbnails must answer with an image MIME type; other kinds are
    /// policed via the extension allow-list instead.
    pub fn accepts_content_type(&self, content_type: &str) -> bool {
        match self {
            AssetKind::Thumbnail => content_type.starts_with("image/"),
            _ => true,
        }
    }

    fn request_timeout(&self) -> Duration {
        match self {
            AssetKind::Thumbnail => Duration::from_secs(30),
            _ => Duration::from_secs(60),
        }
    }
}

/// A remote asset mirrored into durable storage.
#[derive(Debug, Clone, PartialEq)]
pub struct PreservedAsset {
    pub source_url: String,
    pub local_path: String,
    pub content_type: String,
    pub byte_size: u64,
    pub content_hash: String,
}

/// Blob-store collaborator. Failures are logged by the preserver and
/// degrade to "no local copy available".
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bytes: &[u8], path: &str, content_type: &str) -> Result<(), EmbedError>;
}

/// In-memory blob store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: DashMap<String, (Vec<u8>, String)>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<(Vec<u8>, String)> {
        self.objects.get(path).map(|o| o.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: &[u8], path: &str, content_type: &str) -> Result<(), EmbedError> {
        self.objects
            .insert(path.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(())
    }
}

/// Filesystem blob store, the fallback when no object storage is wired up.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, bytes: &[u8], path: &str, _content_type: &str) -> Result<(), EmbedError> {
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EmbedError::StorageError(format!("mkdir failed: {e}")))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| EmbedError::StorageError(format!("write failed: {e}")))?;
        debug!(path = %target.display(), "wrote blob to local storage");
        Ok(())
    }
}

fn url_extension(url: &str) -> String {
    url.rsplit('.')
        .next()
        .unwrap_or("")
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Read a body stream, aborting as soon as the running total exceeds the
/// cap. On breach nothing is kept: never a partial asset.
async fn read_limited<S, E>(mut stream: S, cap: u64) -> Result<Vec<u8>, EmbedError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| EmbedError::FetchError(format!("body stream failed: {e}")))?;
        let size = buf.len() as u64 + chunk.len() as u64;
        if size > cap {
            return Err(EmbedError::AssetTooLarge { size, cap });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Mirrors remote thumbnails/media into durable storage under size and
/// type constraints. Any failure degrades gracefully: the embed keeps
/// serving the remote URL.
pub struct AssetPreserver {
    client: Client,
    store: std::sync::Arc<dyn BlobStore>,
}

impl AssetPreserver {
    pub fn new(store: std::sync::Arc<dyn BlobStore>) -> Self {
        let client = Client::builder()
            .user_agent(concat!("url-embed/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to initialize asset HTTP client");
        Self { client, store }
    }

    pub fn with_client(store: std::sync::Arc<dyn BlobStore>, client: Client) -> Self {
        Self { client, store }
    }

    /// Deterministic storage path for a remote asset: repeated preservation
    /// of the same URL for the same owner overwrites the same object.
    pub fn derive_path(remote_url: &str, owner_id: &str, platform: &str, kind: AssetKind) -> String {
        let digest = format!("{:x}", md5::compute(remote_url.as_bytes()));
        let hash16 = &digest[..16];

        let ext = url_extension(remote_url);
        let ext = if kind.allowed_extensions().contains(&ext.as_str()) {
            ext
        } else {
            kind.default_extension().to_string()
        };

        format!(
            "{}/{}_{}_{}_{}.{}",
            kind.dir(),
            kind.file_prefix(),
            owner_id,
            platform,
            hash16,
            ext
        )
    }

    /// Mirror a remote asset. Every failure (wrong type, cap breach,
    /// network trouble, blob-store write) is logged and degrades to
    /// `None`; the caller keeps serving the remote URL.
    pub async fn preserve(
        &self,
        remote_url: &str,
        owner_id: &str,
        platform: &str,
        kind: AssetKind,
    ) -> Option<PreservedAsset> {
        match self.try_preserve(remote_url, owner_id, platform, kind).await {
            Ok(asset) => Some(asset),
            Err(e) => {
                warn!(url = %remote_url, error = %e, "asset preservation failed, keeping remote URL");
                None
            }
        }
    }

    async fn try_preserve(
        &self,
        remote_url: &str,
        owner_id: &str,
        platform: &str,
        kind: AssetKind,
    ) -> Result<PreservedAsset, EmbedError> {
        let local_path = Self::derive_path(remote_url, owner_id, platform, kind);
        let cap = kind.max_bytes();

        let response = self
            .client
            .get(remote_url)
            .timeout(kind.request_timeout())
            .send()
            .await
            .map_err(|e| EmbedError::FetchError(format!("asset download failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EmbedError::FetchError(format!(
                "asset download returned status {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        if !kind.accepts_content_type(&content_type) {
            return Err(EmbedError::AssetWrongType(content_type));
        }

        // Declared size first; the stream re-check below defends against
        // missing or lying headers.
        if let Some(declared) = response.content_length() {
            if declared > cap {
                return Err(EmbedError::AssetTooLarge { size: declared, cap });
            }
        }

        let bytes = read_limited(response.bytes_stream(), cap).await?;

        let content_hash = format!("{:x}", Sha256::digest(&bytes));
        let byte_size = bytes.len() as u64;

        self.store.put(&bytes, &local_path, &content_type).await?;

        debug!(url = %remote_url, path = %local_path, byte_size, "preserved asset");
        Ok(PreservedAsset {
            source_url: remote_url.to_string(),
            local_path,
            content_type,
            byte_size,
            content_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn derived_paths_are_deterministic_and_kind_scoped() {
        let url = "https://i.ytimg.com/vi/x/hqdefault.jpg";
        let a = AssetPreserver::derive_path(url, "42", "youtube", AssetKind::Thumbnail);
        let b = AssetPreserver::derive_path(url, "42", "youtube", AssetKind::Thumbnail);
        assert_eq!(a, b);
        assert!(a.starts_with("oembed/thumbnails/thumbnail_42_youtube_"));
        assert!(a.ends_with(".jpg"));

        let c = AssetPreserver::derive_path(url, "42", "youtube", AssetKind::Image);
        assert!(c.starts_with("oembed/content/content_42_youtube_"));
        assert_ne!(a, c);
    }

    #[test]
    fn unknown_extensions_are_normalized() {
        let path = AssetPreserver::derive_path(
            "https://cdn.example.com/asset.tiff?sig=abc",
            "1",
            "generic",
            AssetKind::Thumbnail,
        );
        assert!(path.ends_with(".jpg"));

        let path = AssetPreserver::derive_path(
            "https://cdn.example.com/clip.exe",
            "1",
            "generic",
            AssetKind::Other,
        );
        assert!(path.ends_with(".bin"));

        // Query strings do not leak into the extension.
        let path = AssetPreserver::derive_path(
            "https://cdn.example.com/img.png?width=100",
            "1",
            "generic",
            AssetKind::Thumbnail,
        );
        assert!(path.ends_with(".png"));
    }

    #[test]
    fn thumbnails_require_image_content_type() {
        assert!(AssetKind::Thumbnail.accepts_content_type("image/png"));
        assert!(!AssetKind::Thumbnail.accepts_content_type("text/html"));
        assert!(AssetKind::Video.accepts_content_type("video/mp4"));
    }

    #[tokio::test]
    async fn read_limited_aborts_on_cap_breach() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(&[0u8; 600])),
            Ok(Bytes::from_static(&[0u8; 600])),
        ];
        let err = read_limited(stream::iter(chunks), 1000).await.unwrap_err();
        assert!(
            matches!(err, EmbedError::AssetTooLarge { size: 1200, cap: 1000 }),
            "partial downloads must be discarded: {err}"
        );

        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(&[1u8; 600]))];
        let out = read_limited(stream::iter(chunks), 1000).await.unwrap();
        assert_eq!(out.len(), 600);
    }

    #[tokio::test]
    async fn memory_blob_store_round_trips() {
        let store = MemoryBlobStore::new();
        store
            .put(b"payload", "oembed/thumbnails/t.jpg", "image/jpeg")
            .await
            .unwrap();
        let (bytes, content_type) = store.get("oembed/thumbnails/t.jpg").unwrap();
        assert_eq!(bytes, b"payload");
        assert_eq!(content_type, "image/jpeg");
    }
}
