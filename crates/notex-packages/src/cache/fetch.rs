//! Fetching remote content for the download cache.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

/// Fetches the bytes behind a URL.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

/// Reads `file://` URLs and plain paths; refuses anything network-bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

impl LocalFetcher {
    fn local_path(url: &str) -> Option<PathBuf> {
        if let Some(rest) = url.strip_prefix("file://") {
            return Some(PathBuf::from(rest));
        }
        if url.contains("://") || url.starts_with("//") {
            return None;
        }
        Some(PathBuf::from(url))
    }
}

impl Fetcher for LocalFetcher {
    fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let path = Self::local_path(url)
            .with_context(|| format!("no network fetcher configured for {}", url))?;
        std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
    }
}

/// Blocking HTTP(S) fetcher; `file://` URLs and plain paths are read locally.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    max_retries: u32,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    const USER_AGENT: &'static str = concat!("notex-packages/", env!("CARGO_PKG_VERSION"));

    pub fn new(timeout: std::time::Duration, max_retries: u32) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(Self::USER_AGENT)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            client,
            max_retries,
        })
    }

    fn fetch_once(&self, url: &str) -> anyhow::Result<Result<Vec<u8>, anyhow::Error>> {
        let response = match self.client.get(url).send() {
            Ok(response) => response,
            // Connection-level failures are worth another try.
            Err(e) if e.is_timeout() || e.is_connect() => return Ok(Err(e.into())),
            Err(e) => return Err(e.into()),
        };
        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Ok(Err(anyhow::anyhow!("HTTP {} for {}", status.as_u16(), url)));
        }
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status.as_u16(), url);
        }
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read response body for {}", url))?;
        Ok(Ok(bytes.to_vec()))
    }
}

#[cfg(feature = "http")]
impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let url = match url.strip_prefix("//") {
            Some(rest) => format!("https://{}", rest),
            None => url.to_string(),
        };
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return LocalFetcher.fetch(&url);
        }

        let mut retries = 0;
        loop {
            match self.fetch_once(&url)? {
                Ok(bytes) => return Ok(bytes),
                Err(e) if retries < self.max_retries => {
                    retries += 1;
                    let backoff = std::time::Duration::from_millis(250 << retries);
                    tracing::warn!(
                        error = %e,
                        retry = retries,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying download"
                    );
                    std::thread::sleep(backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Fetcher used by [`super::FileCache::new`].
pub fn default_fetcher() -> Arc<dyn Fetcher> {
    #[cfg(feature = "http")]
    {
        match HttpFetcher::new(std::time::Duration::from_secs(30), 3) {
            Ok(fetcher) => return Arc::new(fetcher),
            Err(e) => {
                tracing::warn!(error = %e, "HTTP fetcher unavailable; only local files resolve")
            }
        }
    }
    Arc::new(LocalFetcher)
}
