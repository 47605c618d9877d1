//! HTTP transport for the download cache.

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str = concat!("minitune/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Media extensions kept when naming downloaded files
pub(crate) const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "ogg", "aac"];
pub(crate) const DEFAULT_AUDIO_EXTENSION: &str = ".mp3";
/// Extension of files still being written
pub(crate) const PARTIAL_SUFFIX: &str = "part";

/// Receives `(bytes_downloaded, bytes_total)` while a body streams in
pub type ProgressFn = dyn FnMut(u64, u64) + Send;

/// A response body being streamed
#[async_trait]
pub trait FetchBody: Send {
    /// Total size in bytes, when the server announced it
    fn total_len(&self) -> Option<u64>;

    /// Next chunk of the body, `None` once complete.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Opens URLs for streaming. Implemented over HTTP and by test doubles.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the request fails or the server answers with a
    /// non-success status.
    async fn open(&self, url: &str) -> Result<Box<dyn FetchBody>>;
}

/// [`Fetcher`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (e.g. TLS setup fails).
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Whether a cover image URL looks usable.
    ///
    /// Malformed or non-http URLs are rejected. A HEAD answered with an error
    /// status is rejected. Network failures are not conclusive and count as usable.
    pub async fn probe_cover_url(&self, url: &str, timeout: Duration) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        match self.client.head(parsed).timeout(timeout).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Cover probe for {} inconclusive: {}", url, e);
                true
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn open(&self, url: &str) -> Result<Box<dyn FetchBody>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Box::new(HttpBody { response }))
    }
}

struct HttpBody {
    response: reqwest::Response,
}

#[async_trait]
impl FetchBody for HttpBody {
    fn total_len(&self) -> Option<u64> {
        self.response.content_length()
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.response.chunk().await?)
    }
}

/// Extension (with dot) from the path of `url` when it is in `allowed`,
/// ignoring case and any query string.
#[must_use]
pub fn url_extension(url: &str, allowed: &[&str]) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    allowed.contains(&ext.as_str()).then(|| format!(".{ext}"))
}

/// Stream `url` into `<target>.part` and rename it into place.
///
/// `timeout` bounds the request and each body chunk. The partial file is
/// removed on any failure, so `target` only ever holds a complete body.
///
/// # Errors
///
/// Returns the fetch, timeout or I/O error that stopped the transfer.
pub async fn fetch_to_file(
    fetcher: &dyn Fetcher,
    url: &str,
    target: &Path,
    timeout: Duration,
    progress: Option<&mut ProgressFn>,
) -> Result<()> {
    let partial = partial_path(target);
    let result = match stream_body(fetcher, url, &partial, timeout, progress).await {
        Ok(()) => tokio::fs::rename(&partial, target).await.map_err(Into::into),
        Err(e) => Err(e),
    };
    if result.is_err() {
        remove_file_if_present(&partial);
    }
    result
}

async fn stream_body(
    fetcher: &dyn Fetcher,
    url: &str,
    partial: &Path,
    timeout: Duration,
    mut progress: Option<&mut ProgressFn>,
) -> Result<()> {
    let timed_out = || CoreError::Timeout {
        url: url.to_string(),
    };

    let mut body = tokio::time::timeout(timeout, fetcher.open(url))
        .await
        .map_err(|_| timed_out())??;
    let total = body.total_len();
    let mut file = tokio::fs::File::create(partial).await?;
    let mut downloaded: u64 = 0;

    while let Some(chunk) = tokio::time::timeout(timeout, body.next_chunk())
        .await
        .map_err(|_| timed_out())??
    {
        file.write_all(&chunk).await?;
        downloaded = downloaded.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
        if let (Some(total), Some(callback)) = (total, progress.as_mut()) {
            callback(downloaded, total);
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

pub(crate) fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

pub(crate) fn remove_file_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUDIO: &[&str] = &["mp3", "flac"];

    #[test]
    fn test_url_extension() {
        assert_eq!(
            url_extension("https://cdn.example.com/a/song.FLAC?sig=1", AUDIO).as_deref(),
            Some(".flac")
        );
        assert_eq!(url_extension("https://cdn.example.com/a/song.exe", AUDIO), None);
        assert_eq!(url_extension("https://cdn.example.com/stream", AUDIO), None);
        assert_eq!(url_extension("not a url", AUDIO), None);
    }

    #[tokio::test]
    async fn test_probe_rejects_malformed_urls() {
        let fetcher = HttpFetcher::new().unwrap();
        assert!(!fetcher.probe_cover_url("not a url", Duration::from_secs(1)).await);
        assert!(!fetcher.probe_cover_url("file:///etc/passwd", Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_probe_treats_network_errors_as_valid() {
        let fetcher = HttpFetcher::new().unwrap();
        // Nothing listens on the discard port locally
        assert!(
            fetcher
                .probe_cover_url("http://127.0.0.1:9/cover.jpg", Duration::from_secs(2))
                .await
        );
    }
}
