//! Filtered-word list
//!
//! Process-wide set of lowercase words. Every mutation is persisted as a
//! sorted, pretty-printed JSON array; the write goes to a temporary file that
//! is then renamed over the real one.
//!
//! The set lives behind a short synchronous lock that is never held across a
//! file write. One caller at a time acts as the writer and keeps writing the
//! newest snapshot until the file matches memory; callers that mutate while a
//! write is in progress leave their change to that writer.

use crate::error::{Result, ValidationError};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Default)]
struct FilterState {
    words: BTreeSet<String>,
    /// Bumped on every mutation
    version: u64,
    /// Version last written to disk
    written: u64,
    /// A caller is currently writing the file
    writing: bool,
}

pub struct WordFilter {
    path: PathBuf,
    state: Mutex<FilterState>,
}

impl WordFilter {
    /// Load the list stored at `path`; a missing file means an empty list
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let words = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let words: Vec<String> =
                    serde_json::from_str(&content).map_err(beabot_common::Error::from)?;
                words.into_iter().map(|w| normalize(&w)).filter(|w| !w.is_empty()).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No word filter at {}, starting empty", path.display());
                BTreeSet::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!("Loaded {} filtered words", words.len());
        Ok(Self {
            path,
            state: Mutex::new(FilterState {
                words,
                ..FilterState::default()
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns false when the word was already filtered
    pub async fn add(&self, word: &str) -> Result<bool> {
        let word = validate_word(word)?;
        if !self.mutate(|words| words.insert(word.clone())) {
            return Ok(false);
        }
        self.flush().await?;
        info!("Added '{}' to the word filter", word);
        Ok(true)
    }

    /// Returns false when the word was not filtered
    pub async fn remove(&self, word: &str) -> Result<bool> {
        let word = validate_word(word)?;
        if !self.mutate(|words| words.remove(&word)) {
            return Ok(false);
        }
        self.flush().await?;
        info!("Removed '{}' from the word filter", word);
        Ok(true)
    }

    /// Filtered words, sorted
    pub async fn list(&self) -> Vec<String> {
        self.lock().words.iter().cloned().collect()
    }

    /// True when `content` contains a filtered word as a whole word
    pub async fn is_filtered(&self, content: &str) -> bool {
        let content = content.to_lowercase();
        self.lock()
            .words
            .iter()
            .any(|word| contains_whole_word(&content, word))
    }

    /// Apply `change`; bumps the version when it reports a change
    fn mutate(&self, change: impl FnOnce(&mut BTreeSet<String>) -> bool) -> bool {
        let mut state = self.lock();
        let changed = change(&mut state.words);
        if changed {
            state.version += 1;
        }
        changed
    }

    /// Write snapshots until the file holds the newest version
    ///
    /// A failed write leaves memory as is; the next mutation writes it again.
    async fn flush(&self) -> Result<()> {
        let mut snapshot = {
            let mut state = self.lock();
            if state.writing {
                debug!("Word filter write in progress, deferring to it");
                return Ok(());
            }
            state.writing = true;
            (state.version, sorted(&state.words))
        };
        let mut writer = WriterGuard {
            filter: self,
            armed: true,
        };

        loop {
            let (version, words) = snapshot;
            let result = persist(&self.path, &words).await;

            let mut state = self.lock();
            if let Err(e) = result {
                state.writing = false;
                writer.armed = false;
                return Err(e);
            }
            state.written = version;
            if state.version == state.written {
                state.writing = false;
                writer.armed = false;
                return Ok(());
            }
            snapshot = (state.version, sorted(&state.words));
        }
    }

    fn lock(&self) -> MutexGuard<'_, FilterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases the writer role if `flush` is dropped mid-write
struct WriterGuard<'a> {
    filter: &'a WordFilter,
    armed: bool,
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.filter.lock().writing = false;
        }
    }
}

fn sorted(words: &BTreeSet<String>) -> Vec<String> {
    words.iter().cloned().collect()
}

fn normalize(word: &str) -> String {
    word.trim().to_lowercase()
}

fn validate_word(word: &str) -> std::result::Result<String, ValidationError> {
    let word = normalize(word);
    if word.is_empty() {
        return Err(ValidationError::InvalidInput("word must not be empty".to_string()));
    }
    Ok(word)
}

async fn persist(path: &Path, words: &[String]) -> Result<()> {
    let json = serde_json::to_string_pretty(words).map_err(beabot_common::Error::from)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        warn!("Failed to replace {}: {}", path.display(), e);
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `word` occurs in `haystack` with no word character directly on either side
fn contains_whole_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(start, matched)| {
        let end = start + matched.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c) || !word.starts_with(is_word_char));
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c) || !word.ends_with(is_word_char));
        before_ok && after_ok
    })
}
