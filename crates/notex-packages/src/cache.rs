//! Content cache for offline resources and derived files.
//!
//! Every produced file is addressed by a hash of what it was produced from,
//! so asking twice for the same thing is a cache hit.
//!
//! # Cache Structure
//!
//! ```text
//! {cache_dir}/
//!   download/{sha256(url)}-{basename}        # fetched file
//!   download/{sha256(url)}-{basename}.json   # CacheMeta
//!   unpacked/{sha256(archive bytes)}/        # extracted archive
//!   derived/{name}/{sha256(name, source, content)}-{basename}
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::digest::{sha256_hex_bytes, sha256_hex_file, sha256_hex_str};
use crate::error::{PackageError, PackageResult};
use crate::fs_util::{ensure_dir, temp_sibling, write_atomic};

mod archive;
mod fetch;

pub use fetch::{default_fetcher, Fetcher, LocalFetcher};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;

/// Transformation used for derived files: `(input, output) -> ()`.
pub type TransformFn<'a> = &'a (dyn Fn(&Path, &Path) -> anyhow::Result<()> + 'a);

/// What the cache should produce.
pub enum CacheRequest<'a> {
    /// Download a (remote or `file://`) URL.
    Url(&'a str),

    /// Unpack a local archive into a directory.
    Unpack(&'a Path),

    /// Run `transform` over `source`, memoized on the source path and content.
    Derived {
        name: &'a str,
        source: &'a Path,
        transform: TransformFn<'a>,
    },
}

impl std::fmt::Debug for CacheRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Unpack(path) => f.debug_tuple("Unpack").field(path).finish(),
            Self::Derived { name, source, .. } => f
                .debug_struct("Derived")
                .field("name", name)
                .field("source", source)
                .finish_non_exhaustive(),
        }
    }
}

/// Memoized file production.
pub trait ContentCache: Send + Sync {
    /// Return a local path holding the requested content, producing it on a miss.
    fn get_or_create_file(&self, request: CacheRequest<'_>) -> PackageResult<PathBuf>;
}

/// Metadata stored alongside downloaded files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Where the content came from.
    pub source: String,

    /// When it was fetched.
    pub fetched_at: DateTime<Utc>,

    /// Content digest (sha256 hex).
    pub digest: String,
}

/// Filesystem-backed [`ContentCache`].
#[derive(Clone)]
pub struct FileCache {
    cache_dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl FileCache {
    /// Cache in `cache_dir` using the default fetcher.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_fetcher(cache_dir, default_fetcher())
    }

    pub fn with_fetcher(cache_dir: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fetcher,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Remove all cached content.
    pub fn clear(&self) -> PackageResult<()> {
        if self.cache_dir.exists() {
            std::fs::remove_dir_all(&self.cache_dir)
                .map_err(|e| PackageError::io(&self.cache_dir, e))?;
            debug!(dir = %self.cache_dir.display(), "cleared content cache");
        }
        Ok(())
    }

    fn download(&self, url: &str) -> PackageResult<PathBuf> {
        let key = sha256_hex_str(url);
        let path = self
            .cache_dir
            .join("download")
            .join(format!("{}-{}", key, url_basename(url)));
        let meta_path = meta_path_for(&path);

        if let Some(meta) = read_meta(&meta_path) {
            match sha256_hex_file(&path) {
                Ok(digest) if digest == meta.digest => {
                    debug!(url, "download cache hit");
                    return Ok(path);
                }
                Ok(digest) => warn!(
                    url,
                    expected = %meta.digest,
                    actual = %digest,
                    "cache integrity check failed; fetching again"
                ),
                Err(_) => debug!(url, "cached download missing; fetching again"),
            }
        }

        info!(url, "downloading resource");
        let bytes = self
            .fetcher
            .fetch(url)
            .map_err(|e| PackageError::cache(format!("failed to fetch {}: {:#}", url, e)))?;
        write_atomic(&path, &bytes)?;

        let meta = CacheMeta {
            source: url.to_string(),
            fetched_at: Utc::now(),
            digest: sha256_hex_bytes(&bytes),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| PackageError::cache(format!("failed to serialize metadata: {}", e)))?;
        write_atomic(&meta_path, &meta_json)?;
        Ok(path)
    }

    fn unpack(&self, archive_path: &Path) -> PackageResult<PathBuf> {
        let key = sha256_hex_file(archive_path).map_err(|e| PackageError::io(archive_path, e))?;
        let dir = self.cache_dir.join("unpacked").join(key);
        if dir.is_dir() {
            debug!(archive = %archive_path.display(), "unpack cache hit");
            return Ok(dir);
        }

        ensure_dir(self.cache_dir.join("unpacked").as_path())?;
        let staging = temp_sibling(&dir);
        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|e| PackageError::io(&staging, e))?;
        }
        archive::unzip(archive_path, &staging)?;
        if let Err(e) = std::fs::rename(&staging, &dir) {
            // Someone else finished the same entry first.
            if dir.is_dir() {
                let _ = std::fs::remove_dir_all(&staging);
            } else {
                return Err(PackageError::io(&dir, e));
            }
        }
        debug!(archive = %archive_path.display(), dir = %dir.display(), "unpacked archive");
        Ok(dir)
    }

    fn derive(
        &self,
        name: &str,
        source: &Path,
        transform: TransformFn<'_>,
    ) -> PackageResult<PathBuf> {
        let content_hash = sha256_hex_file(source).map_err(|e| PackageError::io(source, e))?;
        let key = sha256_hex_str(&format!(
            "{}\0{}\0{}",
            name,
            source.to_string_lossy(),
            content_hash
        ));
        let basename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = self
            .cache_dir
            .join("derived")
            .join(name)
            .join(format!("{}-{}", key, basename));
        if path.is_file() {
            debug!(name, source = %source.display(), "derived cache hit");
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let staging = temp_sibling(&path);
        transform(source, &staging).map_err(|e| {
            let _ = std::fs::remove_file(&staging);
            PackageError::cache(format!(
                "{} failed for {}: {:#}",
                name,
                source.display(),
                e
            ))
        })?;
        std::fs::rename(&staging, &path).map_err(|e| PackageError::io(&path, e))?;
        debug!(name, source = %source.display(), "derived file created");
        Ok(path)
    }
}

impl ContentCache for FileCache {
    fn get_or_create_file(&self, request: CacheRequest<'_>) -> PackageResult<PathBuf> {
        match request {
            CacheRequest::Url(url) => self.download(url),
            CacheRequest::Unpack(archive) => self.unpack(archive),
            CacheRequest::Derived {
                name,
                source,
                transform,
            } => self.derive(name, source, transform),
        }
    }
}

fn meta_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".json");
    path.with_file_name(name)
}

fn read_meta(meta_path: &Path) -> Option<CacheMeta> {
    let content = std::fs::read(meta_path).ok()?;
    serde_json::from_slice(&content).ok()
}

/// Last path segment of a URL, without query or fragment.
pub(crate) fn url_basename(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let base = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if base.is_empty() || base.contains(':') {
        "index".to_string()
    } else {
        base.to_string()
    }
}
