//! Disk cache of downloaded media, keyed by the remote service's track id.
//!
//! Downloads run one at a time on a dedicated worker thread. A second request
//! for an id that is already queued or downloading joins the first one
//! instead of fetching again. The index and the reservation set share one
//! lock; callbacks always run after it is released.

use crate::config::CacheConfig;
use crate::download::{
    fetch_to_file, remove_file_if_present, url_extension, Fetcher, HttpFetcher, ProgressFn,
    AUDIO_EXTENSIONS, DEFAULT_AUDIO_EXTENSION, PARTIAL_SUFFIX,
};
use crate::error::{CoreError, Result};
use crate::index::IndexStore;
use crate::paths::{CACHE_INDEX_FILE_NAME, COVERS_DIR_NAME, SONGS_DIR_NAME};
use crate::provider::RemoteTrack;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const DEFAULT_IMAGE_EXTENSION: &str = ".jpg";
const MAX_TITLE_CHARS: usize = 50;

/// A fully downloaded track. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
    pub local_path: PathBuf,
    /// Where the track came from, e.g. the service name
    pub source: String,
    pub cached_at: DateTime<Utc>,
    pub cover_path: Option<PathBuf>,
}

/// Called with `(bytes_downloaded, bytes_total)` when the total is known
pub type ProgressCallback = Box<ProgressFn>;
/// Called with the cached media path
pub type CompleteCallback = Box<dyn FnOnce(&Path) + Send>;
/// Called with a human-readable failure message
pub type ErrorCallback = Box<dyn FnOnce(&str) + Send>;

/// A request to cache one track
pub struct DownloadTask {
    pub id: String,
    pub url: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
    pub cover_url: Option<String>,
    pub source: String,
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompleteCallback>,
    on_error: Option<ErrorCallback>,
}

impl DownloadTask {
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            name: String::new(),
            artist: String::new(),
            album: String::new(),
            duration_ms: 0,
            cover_url: None,
            source: "remote".to_string(),
            on_progress: None,
            on_complete: None,
            on_error: None,
        }
    }

    /// Task for a search result whose media lives at `url`
    #[must_use]
    pub fn from_remote(track: &RemoteTrack, url: impl Into<String>) -> Self {
        let mut task = Self::new(track.id.clone(), url);
        task.name.clone_from(&track.name);
        task.artist.clone_from(&track.artist);
        task.album.clone_from(&track.album);
        task.duration_ms = track.duration_ms;
        task.cover_url.clone_from(&track.cover_url);
        task
    }

    #[must_use]
    pub fn with_metadata(
        mut self,
        name: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        self.name = name.into();
        self.artist = artist.into();
        self.album = album.into();
        self.duration_ms = duration_ms;
        self
    }

    #[must_use]
    pub fn with_cover_url(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn on_progress(mut self, callback: impl FnMut(u64, u64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_complete(mut self, callback: impl FnOnce(&Path) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_error(mut self, callback: impl FnOnce(&str) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTask")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("name", &self.name)
            .field("artist", &self.artist)
            .finish_non_exhaustive()
    }
}

/// How [`CacheManager::download`] handled a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadTicket {
    /// Added to the end of the queue
    Queued,
    /// The id was already queued or downloading; this task's callbacks
    /// fire with that download's outcome
    Coalesced,
    /// The worker is gone; the error callback has been called
    Rejected,
}

/// Timeouts applied by the download worker
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    /// Limit for the request and for each body chunk
    pub download_timeout: Duration,
    pub cover_timeout: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            download_timeout: Duration::from_secs(30),
            cover_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&CacheConfig> for CacheOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            download_timeout: config.download_timeout(),
            cover_timeout: config.cover_timeout(),
        }
    }
}

/// Callbacks of every request waiting on one id
#[derive(Default)]
struct Waiters {
    complete: Vec<CompleteCallback>,
    error: Vec<ErrorCallback>,
}

impl Waiters {
    fn add(&mut self, task: &mut DownloadTask) {
        self.complete.extend(task.on_complete.take());
        self.error.extend(task.on_error.take());
    }

    fn fail(self, message: &str) {
        for callback in self.error {
            callback(message);
        }
    }

    fn succeed(self, path: &Path) {
        for callback in self.complete {
            callback(path);
        }
    }
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    store: IndexStore,
    /// Ids queued or downloading, with everyone waiting on them
    pending: HashMap<String, Waiters>,
    /// Ids the worker has dequeued and not yet settled
    reserved: HashSet<String>,
}

impl CacheState {
    fn cached_path(&self, id: &str) -> Option<PathBuf> {
        self.entries
            .get(id)
            .filter(|entry| entry.local_path.is_file())
            .map(|entry| entry.local_path.clone())
    }
}

type SharedState = Arc<Mutex<CacheState>>;

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Persistent cache of downloaded tracks and covers.
pub struct CacheManager {
    root: PathBuf,
    songs_dir: PathBuf,
    covers_dir: PathBuf,
    state: SharedState,
    queue: Option<UnboundedSender<DownloadTask>>,
    worker: Option<JoinHandle<()>>,
}

impl CacheManager {
    /// Open the cache described by `config`, downloading over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client, the directories or the index
    /// cannot be set up.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new()?);
        Self::open(config.root(), fetcher, CacheOptions::from(config))
    }

    /// Open (or create) a cache rooted at `root` and start its worker.
    ///
    /// Leftover partial downloads from an earlier run are deleted. An
    /// unreadable index is replaced by an empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories, the index or the worker cannot
    /// be created.
    pub fn open(
        root: impl Into<PathBuf>,
        fetcher: Arc<dyn Fetcher>,
        options: CacheOptions,
    ) -> Result<Self> {
        let root = root.into();
        let songs_dir = root.join(SONGS_DIR_NAME);
        let covers_dir = root.join(COVERS_DIR_NAME);
        fs::create_dir_all(&songs_dir)?;
        fs::create_dir_all(&covers_dir)?;

        let swept = sweep_partials(&songs_dir) + sweep_partials(&covers_dir);
        if swept > 0 {
            info!("Removed {} partial downloads left from a previous run", swept);
        }

        let store = IndexStore::open(&root.join(CACHE_INDEX_FILE_NAME))?;
        let entries: HashMap<String, CacheEntry> = store
            .load_all()?
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        info!(
            "Opened cache at {} with {} entries",
            root.display(),
            entries.len()
        );

        let state = Arc::new(Mutex::new(CacheState {
            entries,
            store,
            pending: HashMap::new(),
            reserved: HashSet::new(),
        }));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = DownloadWorker {
            state: Arc::clone(&state),
            songs_dir: songs_dir.clone(),
            covers_dir: covers_dir.clone(),
            fetcher,
            options,
        };
        let handle = thread::Builder::new()
            .name("minitune-download".to_string())
            .spawn(move || runtime.block_on(worker.run(rx)))?;

        Ok(Self {
            root,
            songs_dir,
            covers_dir,
            state,
            queue: Some(tx),
            worker: Some(handle),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn songs_dir(&self) -> &Path {
        &self.songs_dir
    }

    #[must_use]
    pub fn covers_dir(&self) -> &Path {
        &self.covers_dir
    }

    /// Whether `id` has an index entry whose media file still exists.
    ///
    /// A missing file makes the entry count as not cached; the entry itself
    /// is left alone.
    #[must_use]
    pub fn is_cached(&self, id: &str) -> bool {
        self.get_cached_path(id).is_some()
    }

    #[must_use]
    pub fn get_cached_path(&self, id: &str) -> Option<PathBuf> {
        lock(&self.state).cached_path(id)
    }

    /// The entry for `id`, if it is cached
    #[must_use]
    pub fn get_entry(&self, id: &str) -> Option<CacheEntry> {
        let state = lock(&self.state);
        state
            .entries
            .get(id)
            .filter(|entry| entry.local_path.is_file())
            .cloned()
    }

    /// Cached entries whose media file exists, newest first
    #[must_use]
    pub fn list_entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = lock(&self.state)
            .entries
            .values()
            .filter(|entry| entry.local_path.is_file())
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.cached_at.cmp(&a.cached_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    /// Whether the worker is downloading `id` right now
    #[must_use]
    pub fn is_reserved(&self, id: &str) -> bool {
        lock(&self.state).reserved.contains(id)
    }

    /// Queue `task` for download and return immediately.
    ///
    /// If the same id is already queued or downloading, no second fetch
    /// happens: the task's completion and error callbacks are attached to
    /// the existing download. Progress is only reported to the first task.
    pub fn download(&self, mut task: DownloadTask) -> DownloadTicket {
        let mut state = lock(&self.state);
        if let Some(waiters) = state.pending.get_mut(&task.id) {
            waiters.add(&mut task);
            debug!("Download of {} already pending, coalesced", task.id);
            return DownloadTicket::Coalesced;
        }

        let mut waiters = Waiters::default();
        waiters.add(&mut task);
        let id = task.id.clone();

        let Some(queue) = &self.queue else {
            drop(state);
            waiters.fail("download worker is not running");
            return DownloadTicket::Rejected;
        };
        if let Err(rejected) = queue.send(task) {
            drop(state);
            warn!("Download worker stopped, rejecting {}", rejected.0.id);
            waiters.fail(&CoreError::WorkerStopped.to_string());
            return DownloadTicket::Rejected;
        }
        state.pending.insert(id.clone(), waiters);
        debug!("Queued download of {}", id);
        DownloadTicket::Queued
    }

    /// Evict `id`: delete its media and cover files, then its index row.
    ///
    /// Returns `false` if `id` was not in the index.
    ///
    /// # Errors
    ///
    /// Returns `EntryBusy` while `id` is being downloaded.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut state = lock(&self.state);
        if state.reserved.contains(id) {
            return Err(CoreError::EntryBusy { id: id.to_string() });
        }
        let Some(entry) = state.entries.remove(id) else {
            return Ok(false);
        };

        remove_file_if_present(&entry.local_path);
        if let Some(cover) = &entry.cover_path {
            remove_file_if_present(cover);
        }
        if let Err(e) = state.store.delete(id) {
            warn!("Failed to delete {} from the cache index: {}", id, e);
        }
        info!("Removed {} from cache", id);
        Ok(true)
    }

    /// Delete every cached file and empty the index.
    ///
    /// Files of downloads in progress are left in place.
    ///
    /// # Errors
    ///
    /// Returns an error if a cache directory cannot be listed.
    pub fn clear(&self) -> Result<()> {
        let mut state = lock(&self.state);
        let busy: Vec<String> = state.reserved.iter().map(|id| sanitize_component(id)).collect();
        let in_use = |name: &str| {
            Path::new(name).extension().is_some_and(|e| e == PARTIAL_SUFFIX)
                || busy.iter().any(|id| {
                    name.starts_with(&format!("{id}_")) || name.starts_with(&format!("{id}."))
                })
        };

        let mut removed = 0usize;
        for dir in [&self.songs_dir, &self.covers_dir] {
            for item in fs::read_dir(dir)? {
                let path = item?.path();
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                if !path.is_file() || in_use(name) {
                    continue;
                }
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
                }
            }
        }

        state.entries.clear();
        if let Err(e) = state.store.clear() {
            warn!("Failed to clear the cache index: {}", e);
        }
        info!("Cleared cache ({} files removed)", removed);
        Ok(())
    }

    /// Evict every entry cached more than `days` days ago.
    ///
    /// Returns the number of entries removed. Entries being downloaded are skipped.
    pub fn cleanup_older_than(&self, days: u32) -> usize {
        let Some(cutoff) = TimeDelta::try_days(i64::from(days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let expired: Vec<String> = lock(&self.state)
            .entries
            .values()
            .filter(|entry| entry.cached_at < cutoff)
            .map(|entry| entry.id.clone())
            .collect();

        let mut removed = 0;
        for id in expired {
            match self.remove(&id) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => debug!("Skipping cleanup of {}: {}", id, e),
            }
        }
        if removed > 0 {
            info!("Cleaned up {} cache entries older than {} days", removed, days);
        }
        removed
    }

    /// Bytes currently on disk in the media and cover directories
    #[must_use]
    pub fn get_cache_size_bytes(&self) -> u64 {
        [&self.songs_dir, &self.covers_dir]
            .into_iter()
            .flat_map(|dir| WalkDir::new(dir).min_depth(1).into_iter().flatten())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|metadata| metadata.len())
            .sum()
    }

    /// [`get_cache_size_bytes`](Self::get_cache_size_bytes) in MiB
    #[must_use]
    pub fn get_cache_size_mb(&self) -> f64 {
        let kib = u32::try_from(self.get_cache_size_bytes() / 1024).unwrap_or(u32::MAX);
        f64::from(kib) / 1024.0
    }

    /// Stop accepting downloads and wait for the queued ones to finish.
    pub fn shutdown(mut self) {
        self.stop_worker(true);
    }

    fn stop_worker(&mut self, wait: bool) {
        // Closing the channel lets the worker drain what is queued and exit
        self.queue.take();
        if let Some(handle) = self.worker.take() {
            if wait && handle.join().is_err() {
                error!("Download worker panicked");
            }
        }
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.stop_worker(false);
    }
}

struct DownloadWorker {
    state: SharedState,
    songs_dir: PathBuf,
    covers_dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    options: CacheOptions,
}

impl DownloadWorker {
    async fn run(self, mut rx: UnboundedReceiver<DownloadTask>) {
        debug!("Download worker started");
        while let Some(task) = rx.recv().await {
            self.process(task).await;
        }
        debug!("Download worker stopped");
    }

    async fn process(&self, mut task: DownloadTask) {
        let id = task.id.clone();
        let already_cached = {
            let mut state = lock(&self.state);
            state.reserved.insert(id.clone());
            state.cached_path(&id)
        };

        let outcome = match already_cached {
            Some(path) => {
                debug!("{} is already cached, skipping fetch", id);
                Ok(path)
            }
            None => self.fetch(&mut task).await,
        };

        let waiters = {
            let mut state = lock(&self.state);
            state.reserved.remove(&id);
            state.pending.remove(&id).unwrap_or_default()
        };
        match outcome {
            Ok(path) => waiters.succeed(&path),
            Err(message) => {
                warn!("Download of {} failed: {}", id, message);
                waiters.fail(&message);
            }
        }
    }

    /// Download media (and cover), then record the entry. The index row is
    /// committed before this returns.
    async fn fetch(&self, task: &mut DownloadTask) -> std::result::Result<PathBuf, String> {
        let target = self.songs_dir.join(song_file_name(task));
        info!("Downloading {} to {}", task.id, target.display());

        let timeout = self.options.download_timeout;
        let progress = task.on_progress.as_deref_mut();
        fetch_to_file(self.fetcher.as_ref(), &task.url, &target, timeout, progress)
            .await
            .map_err(|e| e.to_string())?;

        let cover_path = match &task.cover_url {
            Some(url) => self.fetch_cover(&task.id, url).await,
            None => None,
        };

        let entry = CacheEntry {
            id: task.id.clone(),
            name: task.name.clone(),
            artist: task.artist.clone(),
            album: task.album.clone(),
            duration_ms: task.duration_ms,
            local_path: target.clone(),
            source: task.source.clone(),
            cached_at: Utc::now(),
            cover_path,
        };

        let mut state = lock(&self.state);
        if let Err(e) = state.store.upsert(&entry) {
            // The in-memory index stays authoritative for this run
            warn!("Failed to persist cache entry {}: {}", entry.id, e);
        }
        state.entries.insert(entry.id.clone(), entry);
        drop(state);

        info!("Cached {} at {}", task.id, target.display());
        Ok(target)
    }

    /// Best effort: any failure leaves the entry without a cover.
    async fn fetch_cover(&self, id: &str, url: &str) -> Option<PathBuf> {
        let ext = url_extension(url, IMAGE_EXTENSIONS)
            .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string());
        let target = self
            .covers_dir
            .join(format!("{}{}", sanitize_component(id), ext));
        match fetch_to_file(
            self.fetcher.as_ref(),
            url,
            &target,
            self.options.cover_timeout,
            None,
        )
        .await
        {
            Ok(()) => Some(target),
            Err(e) => {
                debug!("Cover for {} not cached: {}", id, e);
                None
            }
        }
    }
}

/// `<id>_<artist - name><ext>` with unsafe characters replaced and the
/// title part capped in length
fn song_file_name(task: &DownloadTask) -> String {
    let title: String = sanitize_component(&format!("{} - {}", task.artist, task.name))
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();
    let ext = url_extension(&task.url, AUDIO_EXTENSIONS)
        .unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string());
    format!("{}_{}{}", sanitize_component(&task.id), title.trim(), ext)
}

/// Replace characters that are not allowed in file names on common platforms
fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Delete `*.part` files in `dir`, returning how many were removed
fn sweep_partials(dir: &Path) -> usize {
    let Ok(items) = fs::read_dir(dir) else {
        return 0;
    };
    items
        .flatten()
        .map(|item| item.path())
        .filter(|path| path.extension().is_some_and(|e| e == PARTIAL_SUFFIX))
        .filter(|path| fs::remove_file(path).is_ok())
        .count()
}
