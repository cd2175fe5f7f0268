//! Local music library
//!
//! Recursive audio file discovery under the library directory. The scan
//! result is cached; keyword lookups and listings read the cache and never
//! touch the filesystem.

use crate::error::{Error, Result};
use crate::playback::title_from_path;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// File extensions treated as playable audio
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "opus", "m4a", "wav"];

const IGNORE_PATTERNS: &[&str] = &[".DS_Store", "Thumbs.db", ".git", ".svn", ".partial-"];

/// One audio file in the library
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryEntry {
    pub path: PathBuf,
    /// File stem
    pub title: String,
    /// Parent directory name relative to the library root (empty at the root)
    pub folder: String,
    /// Artist from the `Artist - Title` naming convention
    pub artist: Option<String>,
}

impl LibraryEntry {
    fn new(root: &Path, path: PathBuf) -> Self {
        let title = title_from_path(&path);
        let folder = path
            .parent()
            .and_then(|p| p.strip_prefix(root).ok())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let artist = title
            .split_once(" - ")
            .map(|(artist, _)| artist.trim().to_string())
            .filter(|a| !a.is_empty());

        Self {
            path,
            title,
            folder,
            artist,
        }
    }
}

/// Cached view of the audio files under one root directory
pub struct MusicLibrary {
    root: PathBuf,
    entries: RwLock<Vec<LibraryEntry>>,
}

impl MusicLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rescan the library directory, replacing the cache
    ///
    /// Runs the directory walk on the blocking pool. Returns the number of
    /// audio files found.
    pub async fn scan(&self) -> Result<usize> {
        let root = self.root.clone();
        let files = tokio::task::spawn_blocking(move || scan_audio_files(&root))
            .await
            .map_err(|e| Error::Resource(format!("library scan task failed: {}", e)))??;

        let mut entries: Vec<LibraryEntry> = files
            .into_iter()
            .map(|path| LibraryEntry::new(&self.root, path))
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let count = entries.len();
        *self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = entries;
        info!("Library scan found {} audio files in {}", count, self.root.display());
        Ok(count)
    }

    /// First file whose name contains `keyword`, case-insensitively
    pub fn find(&self, keyword: &str) -> Option<LibraryEntry> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return None;
        }
        self.read()
            .iter()
            .find(|e| file_name_lower(&e.path).contains(&keyword))
            .cloned()
    }

    /// Entry for an exact path, if it belongs to the library
    pub fn get(&self, path: &Path) -> Option<LibraryEntry> {
        self.read().iter().find(|e| e.path == path).cloned()
    }

    pub fn list_all(&self) -> Vec<LibraryEntry> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Titles starting with `letter`
    pub fn by_letter(&self, letter: char) -> Vec<LibraryEntry> {
        let letter = letter.to_lowercase().to_string();
        self.filter(|e| e.title.to_lowercase().starts_with(&letter))
    }

    /// Titles containing `fragment`
    pub fn by_name(&self, fragment: &str) -> Vec<LibraryEntry> {
        let fragment = fragment.to_lowercase();
        self.filter(|e| e.title.to_lowercase().contains(&fragment))
    }

    /// Files whose folder (relative to the root) matches `folder`
    pub fn by_folder(&self, folder: &str) -> Vec<LibraryEntry> {
        let folder = folder.trim_matches('/').to_lowercase();
        self.filter(|e| {
            let own = e.folder.to_lowercase();
            own == folder
                || Path::new(&own)
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy() == folder)
        })
    }

    /// Titles grouped by artist; files without an artist are left out
    pub fn by_artist(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in self.read().iter() {
            if let Some(ref artist) = entry.artist {
                grouped
                    .entry(artist.clone())
                    .or_default()
                    .push(entry.title.clone());
            }
        }
        grouped
    }

    /// Up to `n` distinct random entries
    pub fn random(&self, n: usize) -> Vec<LibraryEntry> {
        let entries = self.read();
        let mut rng = rand::thread_rng();
        entries.choose_multiple(&mut rng, n).cloned().collect()
    }

    fn filter(&self, predicate: impl Fn(&LibraryEntry) -> bool) -> Vec<LibraryEntry> {
        self.read().iter().filter(|e| predicate(e)).cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<LibraryEntry>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Walk `root` collecting audio files
///
/// A missing root yields an empty list. Unreadable entries are logged and
/// skipped.
pub fn scan_audio_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        warn!("Library directory {} does not exist", root.display());
        return Ok(Vec::new());
    }
    if !root.is_dir() {
        return Err(Error::Common(beabot_common::Error::InvalidInput(format!(
            "library path is not a directory: {}",
            root.display()
        ))));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e));

    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && is_audio_file(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => warn!("Error accessing library entry: {}", e),
        }
    }

    debug!("Scanned {}: {} audio files", root.display(), files.len());
    Ok(files)
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

fn is_ignored(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    IGNORE_PATTERNS.iter().any(|p| name.contains(p))
}

fn file_name_lower(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
