//! Remote search/resolve services and their ordered fallback chain.

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// A search result from a remote music service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrack {
    /// Service-specific stable id, also the cache key
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
    pub cover_url: Option<String>,
}

/// Trait for remote music services (search API mirrors)
///
/// Every call is fallible and may come back empty. Retries are the
/// implementation's business.
#[async_trait]
pub trait RemoteMusicService: Send + Sync {
    /// Get the service name
    fn name(&self) -> &str;

    async fn search(&self, keyword: &str) -> Result<Vec<RemoteTrack>>;

    /// Direct media URL for `id`, if the service can stream it
    async fn resolve_play_url(&self, id: &str) -> Result<Option<String>>;

    /// LRC text for `id`, if the service has lyrics
    async fn fetch_lyrics(&self, id: &str) -> Result<Option<String>>;
}

/// Tries services in order, starting from the last one that answered.
///
/// A service that errors is skipped for that request; the first success
/// becomes the new starting point.
pub struct ServiceChain {
    services: Vec<Box<dyn RemoteMusicService>>,
    last_good: AtomicUsize,
}

impl ServiceChain {
    #[must_use]
    pub fn new(services: Vec<Box<dyn RemoteMusicService>>) -> Self {
        Self {
            services,
            last_good: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Name of the service the next request starts with
    #[must_use]
    pub fn preferred(&self) -> Option<&str> {
        self.services
            .get(self.last_good.load(Ordering::Relaxed))
            .map(|s| s.name())
    }

    /// Service indices in try order: last known good first, then the rest in rotation
    fn order(&self) -> impl Iterator<Item = usize> {
        let len = self.services.len();
        let start = self.last_good.load(Ordering::Relaxed);
        (0..len).map(move |offset| (start + offset) % len)
    }

    fn mark_good(&self, index: usize) {
        let previous = self.last_good.swap(index, Ordering::Relaxed);
        if previous != index {
            debug!("Preferring service {}", self.services[index].name());
        }
    }

    fn failed(&self, index: usize, operation: &str, error: &CoreError) {
        warn!(
            "Service {} failed to {}: {}",
            self.services[index].name(),
            operation,
            error
        );
    }
}

#[async_trait]
impl RemoteMusicService for ServiceChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RemoteTrack>> {
        let mut last_error = None;
        for index in self.order() {
            match self.services[index].search(keyword).await {
                Ok(tracks) => {
                    self.mark_good(index);
                    return Ok(tracks);
                }
                Err(e) => {
                    self.failed(index, "search", &e);
                    last_error = Some(e);
                }
            }
        }
        last_error.map_or_else(|| Ok(Vec::new()), Err)
    }

    async fn resolve_play_url(&self, id: &str) -> Result<Option<String>> {
        let mut last_error = None;
        for index in self.order() {
            match self.services[index].resolve_play_url(id).await {
                Ok(url) => {
                    self.mark_good(index);
                    return Ok(url);
                }
                Err(e) => {
                    self.failed(index, "resolve play url", &e);
                    last_error = Some(e);
                }
            }
        }
        last_error.map_or(Ok(None), Err)
    }

    async fn fetch_lyrics(&self, id: &str) -> Result<Option<String>> {
        let mut last_error = None;
        for index in self.order() {
            match self.services[index].fetch_lyrics(id).await {
                Ok(lyrics) => {
                    self.mark_good(index);
                    return Ok(lyrics);
                }
                Err(e) => {
                    self.failed(index, "fetch lyrics", &e);
                    last_error = Some(e);
                }
            }
        }
        last_error.map_or(Ok(None), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct MockService {
        name: &'static str,
        healthy: bool,
        calls: Arc<AtomicUsize>,
    }

    impl MockService {
        fn boxed(
            name: &'static str,
            healthy: bool,
            calls: &Arc<AtomicUsize>,
        ) -> Box<dyn RemoteMusicService> {
            Box::new(Self {
                name,
                healthy,
                calls: Arc::clone(calls),
            })
        }

        fn check(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.healthy {
                Ok(())
            } else {
                Err(CoreError::HttpStatus {
                    url: format!("https://{}.example.com", self.name),
                    status: 503,
                })
            }
        }
    }

    #[async_trait]
    impl RemoteMusicService for MockService {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, keyword: &str) -> Result<Vec<RemoteTrack>> {
            self.check()?;
            Ok(vec![RemoteTrack {
                id: format!("{}-1", self.name),
                name: keyword.to_string(),
                artist: "Artist".to_string(),
                album: "Album".to_string(),
                duration_ms: 1000,
                cover_url: None,
            }])
        }

        async fn resolve_play_url(&self, id: &str) -> Result<Option<String>> {
            self.check()?;
            Ok(Some(format!("https://{}.example.com/{id}.mp3", self.name)))
        }

        async fn fetch_lyrics(&self, _id: &str) -> Result<Option<String>> {
            self.check()?;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_falls_back_and_remembers_good_service() {
        let down_calls = Arc::new(AtomicUsize::new(0));
        let up_calls = Arc::new(AtomicUsize::new(0));
        let chain = ServiceChain::new(vec![
            MockService::boxed("down", false, &down_calls),
            MockService::boxed("up", true, &up_calls),
        ]);

        let results = chain.search("hello").await.unwrap();
        assert_eq!(results[0].id, "up-1");
        assert_eq!(chain.preferred(), Some("up"));
        assert_eq!(down_calls.load(Ordering::SeqCst), 1);

        // The next request goes straight to the remembered service
        let url = chain.resolve_play_url("42").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://up.example.com/42.mp3"));
        assert_eq!(down_calls.load(Ordering::SeqCst), 1);
        assert_eq!(up_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_all_failing_returns_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ServiceChain::new(vec![
            MockService::boxed("a", false, &calls),
            MockService::boxed("b", false, &calls),
        ]);

        let err = chain.fetch_lyrics("1").await.unwrap_err();
        assert!(matches!(err, CoreError::HttpStatus { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_chain_is_empty_not_error() {
        let chain = ServiceChain::new(Vec::new());
        assert!(chain.is_empty());
        assert!(chain.search("x").await.unwrap().is_empty());
        assert!(chain.resolve_play_url("x").await.unwrap().is_none());
        assert!(chain.preferred().is_none());
    }
}
