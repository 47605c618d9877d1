//! Local copies of remote media for file-based backends.

use crate::config::CacheConfig;
use crate::download::{
    fetch_to_file, remove_file_if_present, url_extension, Fetcher, HttpFetcher, AUDIO_EXTENSIONS,
    DEFAULT_AUDIO_EXTENSION,
};
use crate::error::Result;
use crate::paths::STAGING_DIR_NAME;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Fetches http(s) media into a scratch directory so it can be loaded like a
/// local file.
///
/// Staged files are not part of the download cache. The directory is emptied
/// when a stager is created, and the engine discards each staged file once a
/// later load replaces it.
pub struct RemoteStager {
    dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
    runtime: Runtime,
    next_id: u64,
}

impl RemoteStager {
    /// # Errors
    ///
    /// Returns an error if the directory or the fetch runtime cannot be created.
    pub fn new(
        dir: impl Into<PathBuf>,
        fetcher: Arc<dyn Fetcher>,
        timeout: Duration,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let leftovers = fs::read_dir(&dir)?
            .flatten()
            .map(|item| item.path())
            .filter(|path| path.is_file() && fs::remove_file(path).is_ok())
            .count();
        if leftovers > 0 {
            info!("Removed {} staged files left from a previous run", leftovers);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            dir,
            fetcher,
            timeout,
            runtime,
            next_id: 0,
        })
    }

    /// Stage under the cache root over HTTP, with the download timeout.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new). Also fails if the HTTP client cannot be built.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::new(
            config.root().join(STAGING_DIR_NAME),
            Arc::new(HttpFetcher::new()?),
            config.download_timeout(),
        )
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fetch `url` completely into a new staged file and return its path.
    ///
    /// Blocks the calling thread. Must not be called from inside an async
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns the fetch error for unreachable URLs, error statuses, timeouts
    /// and write failures. Nothing is left on disk in that case.
    pub fn stage(&mut self, url: &str) -> Result<PathBuf> {
        self.next_id = self.next_id.wrapping_add(1);
        let ext = url_extension(url, AUDIO_EXTENSIONS)
            .unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string());
        let target = self.dir.join(format!("remote-{}{}", self.next_id, ext));

        self.runtime.block_on(fetch_to_file(
            self.fetcher.as_ref(),
            url,
            &target,
            self.timeout,
            None,
        ))?;
        debug!("Staged {} at {}", url, target.display());
        Ok(target)
    }

    /// Delete a file returned by [`stage`](Self::stage). Paths outside the
    /// staging directory are left alone.
    pub fn discard(&self, path: &Path) {
        if path.starts_with(&self.dir) {
            remove_file_if_present(path);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::download::FetchBody;
    use crate::error::CoreError;
    use async_trait::async_trait;
    use bytes::Bytes;

    /// Serves one fixed body for every URL, or 404s when it has none
    pub(crate) struct FixedFetcher {
        pub body: Option<Vec<u8>>,
    }

    struct FixedBody(Option<Bytes>);

    #[async_trait]
    impl FetchBody for FixedBody {
        fn total_len(&self) -> Option<u64> {
            None
        }

        async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
            Ok(self.0.take())
        }
    }

    #[async_trait]
    impl Fetcher for FixedFetcher {
        async fn open(&self, url: &str) -> Result<Box<dyn FetchBody>> {
            match &self.body {
                Some(body) => Ok(Box::new(FixedBody(Some(Bytes::from(body.clone()))))),
                None => Err(CoreError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    pub(crate) fn stager(dir: &Path, body: Option<&[u8]>) -> RemoteStager {
        let fetcher = Arc::new(FixedFetcher {
            body: body.map(<[u8]>::to_vec),
        });
        RemoteStager::new(dir, fetcher, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_stage_writes_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut stager = stager(dir.path(), Some(b"remote audio"));

        let path = stager.stage("https://cdn.example.com/a/song.FLAC?sig=1").unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(path.extension().unwrap(), "flac");
        assert_eq!(fs::read(&path).unwrap(), b"remote audio");

        let second = stager.stage("https://cdn.example.com/stream").unwrap();
        assert_ne!(second, path);
        assert_eq!(second.extension().unwrap(), "mp3");

        stager.discard(&path);
        assert!(!path.exists());
        assert!(second.exists());
    }

    #[test]
    fn test_unreachable_url_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut stager = stager(dir.path(), None);

        assert!(stager.stage("https://cdn.example.com/gone.mp3").is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_new_clears_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("remote-7.mp3"), b"old").unwrap();

        let _stager = stager(dir.path(), None);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_discard_ignores_foreign_paths() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let keep = outside.path().join("keep.mp3");
        fs::write(&keep, b"mine").unwrap();

        let stager = stager(&dir.path().join("staging"), None);
        stager.discard(&keep);
        assert!(keep.exists());
    }
}
