//! Track acquisition pipeline
//!
//! Lookup order for a query:
//! 1. Local library (keyword substring match, no network)
//! 2. Earlier downloads still present in the cache directory
//! 3. External resolver, bounded by the configured timeout
//!
//! Downloads land in a private `.partial-<uuid>` directory under the cache
//! directory and are moved into the cache only on success; the partial
//! directory is removed on every exit path, including timeout.

use super::library::MusicLibrary;
use super::resolver::MediaResolver;
use crate::error::ResolutionError;
use crate::playback::Track;
use beabot_common::SubjectId;
use futures::Stream;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a resolved track came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Library,
    Cache,
    Download,
}

pub struct AcquisitionPipeline {
    library: Arc<MusicLibrary>,
    resolver: Arc<dyn MediaResolver>,
    cache_dir: PathBuf,
    timeout: Duration,
    /// Normalized query → downloaded file
    downloads: Mutex<HashMap<String, (PathBuf, String)>>,
}

impl AcquisitionPipeline {
    pub fn new(
        library: Arc<MusicLibrary>,
        resolver: Arc<dyn MediaResolver>,
        cache_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            library,
            resolver,
            cache_dir: cache_dir.into(),
            timeout,
            downloads: Mutex::new(HashMap::new()),
        }
    }

    pub fn library(&self) -> &Arc<MusicLibrary> {
        &self.library
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolve `query` to a playable track
    pub async fn resolve(&self, query: &str, added_by: SubjectId) -> Result<Track, ResolutionError> {
        self.resolve_with_source(query, added_by)
            .await
            .map(|(track, _)| track)
    }

    /// Like [`resolve`](Self::resolve), also reporting which stage matched
    pub async fn resolve_with_source(
        &self,
        query: &str,
        added_by: SubjectId,
    ) -> Result<(Track, TrackSource), ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::NotFound(String::new()));
        }

        if let Some(entry) = self.library.find(query) {
            debug!("Library hit for '{}': {}", query, entry.path.display());
            return Ok((Track::new(entry.path, entry.title, added_by), TrackSource::Library));
        }

        let key = query.to_lowercase();
        if let Some((path, title)) = self.cached(&key).await {
            debug!("Cache hit for '{}': {}", query, path.display());
            return Ok((Track::new(path, title, added_by), TrackSource::Cache));
        }

        let (path, title) = self.download(query).await?;
        self.lock_downloads()
            .insert(key, (path.clone(), title.clone()));
        Ok((Track::new(path, title, added_by), TrackSource::Download))
    }

    /// Resolve every entry of the playlist at `url`, one at a time
    ///
    /// The stream yields each entry's result as soon as it is available. A
    /// failed entry is yielded as an error and the stream continues; a
    /// playlist that cannot be expanded yields a single error.
    pub fn resolve_many<'a>(
        &'a self,
        url: &'a str,
        added_by: SubjectId,
    ) -> impl Stream<Item = Result<Track, ResolutionError>> + Send + 'a {
        async_stream::stream! {
            let expanded = tokio::time::timeout(self.timeout, self.resolver.expand_playlist(url)).await;
            let urls = match expanded {
                Ok(Ok(urls)) => urls,
                Ok(Err(e)) => {
                    yield Err(e);
                    return;
                }
                Err(_) => {
                    yield Err(ResolutionError::Timeout(self.timeout));
                    return;
                }
            };

            info!("Playlist {} expanded to {} entries", url, urls.len());
            for entry in urls {
                yield self.resolve(&entry, added_by).await;
            }
        }
    }

    async fn download(&self, query: &str) -> Result<(PathBuf, String), ResolutionError> {
        let partial = PartialDir::create(&self.cache_dir).await?;
        let result = self.download_into(query, &partial).await;
        partial.remove().await;
        result
    }

    async fn download_into(
        &self,
        query: &str,
        partial: &PartialDir,
    ) -> Result<(PathBuf, String), ResolutionError> {
        let resolved = match tokio::time::timeout(
            self.timeout,
            self.resolver.resolve(query, partial.path()),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!("Resolution of '{}' timed out after {:?}", query, self.timeout);
                return Err(ResolutionError::Timeout(self.timeout));
            }
        };

        let final_path = if resolved.path.starts_with(partial.path()) {
            let file_name = resolved.path.file_name().ok_or_else(|| {
                ResolutionError::Download(format!(
                    "resolver returned a path without a file name: {}",
                    resolved.path.display()
                ))
            })?;
            let target = self.cache_dir.join(file_name);
            tokio::fs::rename(&resolved.path, &target)
                .await
                .map_err(|e| ResolutionError::Download(format!("failed to move download: {}", e)))?;
            target
        } else {
            resolved.path
        };

        if !is_file(&final_path).await {
            return Err(ResolutionError::Download(format!(
                "resolver reported a missing file: {}",
                final_path.display()
            )));
        }

        info!("Downloaded '{}' to {}", resolved.title, final_path.display());
        Ok((final_path, resolved.title))
    }

    async fn cached(&self, key: &str) -> Option<(PathBuf, String)> {
        let (path, title) = self.lock_downloads().get(key).cloned()?;
        if is_file(&path).await {
            return Some((path, title));
        }

        let mut downloads = self.lock_downloads();
        // Only forget the entry if no newer download replaced it
        if downloads.get(key).is_some_and(|(current, _)| *current == path) {
            downloads.remove(key);
        }
        None
    }

    fn lock_downloads(&self) -> std::sync::MutexGuard<'_, HashMap<String, (PathBuf, String)>> {
        self.downloads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Scratch directory for one download
///
/// Removed by [`PartialDir::remove`] on every normal exit. If the owning
/// future is dropped mid-download, `Drop` hands the removal to the blocking
/// pool instead.
struct PartialDir {
    path: PathBuf,
    removed: bool,
}

impl PartialDir {
    async fn create(cache_dir: &Path) -> Result<Self, ResolutionError> {
        let path = cache_dir.join(format!(".partial-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| ResolutionError::Download(format!("cannot create {}: {}", path.display(), e)))?;
        Ok(Self { path, removed: false })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(mut self) {
        self.removed = true;
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            log_cleanup_error(&self.path, e);
        }
    }
}

impl Drop for PartialDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        let cleanup = move || {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                log_cleanup_error(&path, e);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(cleanup);
            }
            Err(_) => cleanup(),
        }
    }
}

fn log_cleanup_error(path: &Path, e: std::io::Error) {
    if e.kind() != std::io::ErrorKind::NotFound {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}
