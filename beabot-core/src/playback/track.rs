//! Track model

use beabot_common::SubjectId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// A playable audio file queued by a user
///
/// Immutable once enqueued. `id` identifies the queue entry rather than the
/// file: re-queuing the same file (repeat modes) produces a new id, so late
/// "finished" notifications for an earlier play can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub file_path: PathBuf,
    pub title: String,
    pub added_by: SubjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
}

impl Track {
    pub fn new(file_path: impl Into<PathBuf>, title: impl Into<String>, added_by: SubjectId) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_path: file_path.into(),
            title: title.into(),
            added_by,
            duration: None,
        }
    }

    /// Track titled after the file stem
    pub fn from_path(file_path: impl Into<PathBuf>, added_by: SubjectId) -> Self {
        let file_path = file_path.into();
        let title = title_from_path(&file_path);
        Self::new(file_path, title, added_by)
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Same file and metadata under a fresh entry id
    pub fn requeued(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

/// Display title derived from a file name (`Artist - Title.mp3` → `Artist - Title`)
pub fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
