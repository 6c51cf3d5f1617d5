//! Resource cache
//!
//! Remote DTDs, schemas, and stylesheets are cached two ways at once:
//! content-addressed bytes in a cacache store for integrity, and a plain
//! file under `<dir>/resources/` because libxml2 only reads from paths.
//! A moka in-memory tier skips the disk round trip within a run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;
use url::Url;

use crate::error::AppError;
use crate::http_client::AsyncHttpClient;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, AppError>;

/// Metadata for cached resource entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub key: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl CacheMetadata {
    pub fn new(key: String, url: String, ttl: Duration) -> Self {
        let now = Utc::now();
        let expires_at =
            now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24));

        Self {
            key,
            url,
            created_at: now,
            expires_at,
            size_bytes: 0,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size_bytes = size;
        self
    }
}

/// A cached resource with its data and metadata
#[derive(Debug, Clone)]
pub struct CachedResource {
    pub data: Arc<Vec<u8>>,
    pub metadata: CacheMetadata,
}

impl CachedResource {
    pub fn new(data: Vec<u8>, metadata: CacheMetadata) -> Self {
        Self {
            data: Arc::new(data),
            metadata,
        }
    }
}

/// Disk cache using cacache for persistent, corruption-resistant storage
pub struct DiskCache {
    cache_dir: PathBuf,
    ttl: Duration,
}

impl DiskCache {
    pub fn new(cache_dir: PathBuf, ttl: Duration) -> Self {
        Self { cache_dir, ttl }
    }

    /// Generate a cache key from a URL
    pub fn generate_key(url: &str) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        format!("resource_{:x}", hasher.finish())
    }

    /// Get a resource from the disk cache
    pub async fn get(&self, key: &str) -> CacheResult<Option<CachedResource>> {
        let metadata = match self.get_metadata(key).await? {
            Some(metadata) if !metadata.is_expired() => metadata,
            _ => {
                // Clean up expired entry
                let _ = self.remove(key).await;
                return Ok(None);
            }
        };

        match cacache::read(&self.cache_dir, key).await {
            Ok(data) => Ok(Some(CachedResource::new(data, metadata))),
            Err(cacache::Error::EntryNotFound(_, _)) => Ok(None),
            Err(e) => Err(AppError::Cache(format!(
                "Failed to read from disk cache: {}",
                e
            ))),
        }
    }

    /// Store a resource in the disk cache
    pub async fn set(&self, key: &str, url: &str, data: &[u8]) -> CacheResult<CacheMetadata> {
        cacache::write(&self.cache_dir, key, data)
            .await
            .map_err(|e| AppError::Cache(format!("Failed to write to disk cache: {}", e)))?;

        let metadata = CacheMetadata::new(key.to_string(), url.to_string(), self.ttl)
            .with_size(data.len() as u64);
        self.set_metadata(key, &metadata).await?;

        Ok(metadata)
    }

    /// Remove an entry from the disk cache
    pub async fn remove(&self, key: &str) -> CacheResult<()> {
        let _ = cacache::remove(&self.cache_dir, key).await;
        let _ = fs::remove_file(self.metadata_path(key)).await;
        Ok(())
    }

    /// Check whether an entry exists and is not expired
    pub async fn contains(&self, key: &str) -> CacheResult<bool> {
        match self.get_metadata(key).await? {
            Some(metadata) => Ok(!metadata.is_expired()),
            None => Ok(false),
        }
    }

    async fn get_metadata(&self, key: &str) -> CacheResult<Option<CacheMetadata>> {
        let metadata_path = self.metadata_path(key);

        match fs::read_to_string(&metadata_path).await {
            Ok(content) => {
                let metadata: CacheMetadata = serde_json::from_str(&content)
                    .map_err(|e| AppError::Cache(format!("Failed to parse metadata: {}", e)))?;
                Ok(Some(metadata))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Cache(format!("Failed to read metadata: {}", e))),
        }
    }

    async fn set_metadata(&self, key: &str, metadata: &CacheMetadata) -> CacheResult<()> {
        let metadata_path = self.metadata_path(key);

        if let Some(parent) = metadata_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::Cache(format!("Failed to create metadata directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(metadata)
            .map_err(|e| AppError::Cache(format!("Failed to serialize metadata: {}", e)))?;

        fs::write(&metadata_path, content)
            .await
            .map_err(|e| AppError::Cache(format!("Failed to write metadata: {}", e)))?;

        Ok(())
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.cache_dir
            .join("metadata")
            .join(format!("{}.json", key))
    }
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub directory: PathBuf,
    pub ttl_hours: u64,
    pub max_memory_entries: u64,
    pub memory_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("resolve-xml"),
            ttl_hours: 24,
            max_memory_entries: 1000,
            memory_ttl_seconds: 3600,
        }
    }
}

/// Two-tier resource cache that also keeps a plain-file copy of every
/// entry for consumers that need filesystem paths.
pub struct ResourceCache {
    disk_cache: DiskCache,
    local_paths: Cache<String, PathBuf>,
    http_client: AsyncHttpClient,
    config: CacheConfig,
}

impl ResourceCache {
    pub fn new(config: CacheConfig, http_client: AsyncHttpClient) -> Self {
        let disk_cache = DiskCache::new(
            config.directory.clone(),
            Duration::from_secs(config.ttl_hours * 3600),
        );
        let local_paths = Cache::builder()
            .max_capacity(config.max_memory_entries)
            .time_to_live(Duration::from_secs(config.memory_ttl_seconds))
            .build();

        Self {
            disk_cache,
            local_paths,
            http_client,
            config,
        }
    }

    pub fn directory(&self) -> &PathBuf {
        &self.config.directory
    }

    /// Produce a local filesystem path holding the resource at `url`,
    /// downloading it if the cache has no fresh copy. file: URLs are
    /// returned as-is without touching the cache.
    pub async fn ensure_local(&self, url: &Url) -> CacheResult<PathBuf> {
        if url.scheme() == "file" {
            return url
                .to_file_path()
                .map_err(|_| AppError::Cache(format!("Not a local file path: {}", url)));
        }

        let key = DiskCache::generate_key(url.as_str());
        let cache = self;
        let url = url.clone();
        self.local_paths
            .try_get_with(key.clone(), async move {
                cache.materialize(&key, &url).await
            })
            .await
            .map_err(|e: Arc<AppError>| AppError::Cache(e.to_string()))
    }

    /// Blocking variant for use inside synchronous parser callbacks.
    /// Must be called from a multi-threaded tokio runtime (or none at all).
    pub fn ensure_local_blocking(&self, url: &Url) -> CacheResult<PathBuf> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tokio::task::block_in_place(|| handle.block_on(self.ensure_local(url)))
            }
            Err(_) => {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| AppError::Cache(format!("Failed to start runtime: {}", e)))?;
                rt.block_on(self.ensure_local(url))
            }
        }
    }

    async fn materialize(&self, key: &str, url: &Url) -> CacheResult<PathBuf> {
        let local_path = self.local_path(key, url);

        if let Some(cached) = self.disk_cache.get(key).await? {
            if fs::try_exists(&local_path).await.unwrap_or(false) {
                debug!(url = %url, path = %local_path.display(), "cache hit");
                return Ok(local_path);
            }
            self.write_local(&local_path, &cached.data).await?;
            return Ok(local_path);
        }

        debug!(url = %url, "cache miss, downloading");
        let data = self.http_client.download(url.as_str()).await?;
        self.disk_cache.set(key, url.as_str(), &data).await?;
        self.write_local(&local_path, &data).await?;
        Ok(local_path)
    }

    async fn write_local(&self, path: &PathBuf, data: &[u8]) -> CacheResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Cache(format!("Failed to create cache directory: {}", e)))?;
        }
        fs::write(path, data)
            .await
            .map_err(|e| AppError::Cache(format!("Failed to write cached resource: {}", e)))
    }

    /// Plain-file location for a cached resource. The original extension
    /// is kept so consumers can still sniff resource types from the name.
    fn local_path(&self, key: &str, url: &Url) -> PathBuf {
        let name = match std::path::Path::new(url.path())
            .extension()
            .and_then(|ext| ext.to_str())
        {
            Some(ext) => format!("{}.{}", key, ext),
            None => key.to_string(),
        };
        self.config.directory.join("resources").join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpClientConfig;
    use tempfile::TempDir;

    fn create_test_cache() -> (ResourceCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = CacheConfig {
            directory: temp_dir.path().to_path_buf(),
            ttl_hours: 1,
            max_memory_entries: 100,
            memory_ttl_seconds: 300,
        };
        let client = AsyncHttpClient::new(HttpClientConfig::default()).unwrap();
        (ResourceCache::new(config, client), temp_dir)
    }

    #[tokio::test]
    async fn test_cache_key_generation() {
        let key1 = DiskCache::generate_key("https://example.com/a.dtd");
        let key2 = DiskCache::generate_key("https://example.com/b.dtd");

        assert_ne!(key1, key2);
        assert!(key1.starts_with("resource_"));
        assert_eq!(key1, DiskCache::generate_key("https://example.com/a.dtd"));
    }

    #[tokio::test]
    async fn test_disk_cache_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path().to_path_buf(), Duration::from_secs(3600));

        let key = "test_key";
        let url = "https://example.com/sample.dtd";
        let data = b"<!ELEMENT doc (#PCDATA)>";

        assert!(cache.get(key).await.unwrap().is_none());
        assert!(!cache.contains(key).await.unwrap());

        cache.set(key, url, data).await.unwrap();

        assert!(cache.contains(key).await.unwrap());
        let retrieved = cache.get(key).await.unwrap().unwrap();
        assert_eq!(retrieved.data.as_ref(), data);
        assert_eq!(retrieved.metadata.url, url);

        cache.remove(key).await.unwrap();
        assert!(cache.get(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disk_cache_expiration() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path().to_path_buf(), Duration::from_millis(50));

        cache
            .set("test_key", "https://example.com/sample.dtd", b"data")
            .await
            .unwrap();
        assert!(cache.contains("test_key").await.unwrap());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!cache.contains("test_key").await.unwrap());
        assert!(cache.get("test_key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ensure_local_passes_file_urls_through() {
        let (cache, temp_dir) = create_test_cache();
        let file = temp_dir.path().join("doc.xml");
        std::fs::write(&file, "<doc/>").unwrap();

        let url = Url::from_file_path(&file).unwrap();
        let path = cache.ensure_local(&url).await.unwrap();
        assert_eq!(path, file);
    }

    #[tokio::test]
    async fn test_materialize_from_disk_cache_without_network() {
        let (cache, _temp_dir) = create_test_cache();
        let url = Url::parse("https://example.com/sample.dtd").unwrap();

        // Seed the disk tier directly so no download is needed
        let key = DiskCache::generate_key(url.as_str());
        cache
            .disk_cache
            .set(&key, url.as_str(), b"<!ELEMENT doc (#PCDATA)>")
            .await
            .unwrap();

        let path = cache.ensure_local(&url).await.unwrap();
        assert!(path.to_string_lossy().ends_with(".dtd"));
        assert_eq!(
            std::fs::read(&path).unwrap(),
            b"<!ELEMENT doc (#PCDATA)>".to_vec()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ensure_local_blocking_inside_runtime() {
        let (cache, temp_dir) = create_test_cache();
        let file = temp_dir.path().join("doc.xml");
        std::fs::write(&file, "<doc/>").unwrap();

        let url = Url::from_file_path(&file).unwrap();
        let path = cache.ensure_local_blocking(&url).unwrap();
        assert_eq!(path, file);
    }

    #[test]
    fn test_ensure_local_blocking_without_runtime() {
        let temp_dir = TempDir::new().unwrap();
        let config = CacheConfig {
            directory: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        let client = AsyncHttpClient::new(HttpClientConfig::default()).unwrap();
        let cache = ResourceCache::new(config, client);

        let file = temp_dir.path().join("doc.xml");
        std::fs::write(&file, "<doc/>").unwrap();

        let url = Url::from_file_path(&file).unwrap();
        let path = cache.ensure_local_blocking(&url).unwrap();
        assert_eq!(path, file);
    }
}
