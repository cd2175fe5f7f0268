//! Saved playlists
//!
//! One `.m3u` file per playlist under the playlist directory, one absolute
//! track path per line.

use crate::error::{Error, Result, ValidationError};
use crate::playback::Track;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const EXTENSION: &str = "m3u";
const HEADER: &str = "#EXTM3U";

pub struct PlaylistStore {
    dir: PathBuf,
}

impl PlaylistStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `tracks` as playlist `name`, replacing an existing one
    pub async fn save(&self, name: &str, tracks: &[Track]) -> Result<usize> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut content = String::from(HEADER);
        content.push('\n');
        for track in tracks {
            content.push_str(&format!("#EXTINF:-1,{}\n", track.title));
            content.push_str(&track.file_path.to_string_lossy());
            content.push('\n');
        }
        tokio::fs::write(&path, content).await?;

        info!("Saved playlist '{}' ({} tracks)", name, tracks.len());
        Ok(tracks.len())
    }

    /// Track paths of playlist `name`; entries whose file is gone are skipped
    pub async fn load(&self, name: &str) -> Result<Vec<PathBuf>> {
        let path = self.path_for(name)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(playlist_not_found(name));
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = PathBuf::from(line);
            if entry.is_file() {
                paths.push(entry);
            } else {
                debug!("Playlist '{}': skipping missing file {}", name, line);
            }
        }
        Ok(paths)
    }

    /// Names of all saved playlists, sorted
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted playlist '{}'", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(playlist_not_found(name)),
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, EXTENSION)))
    }
}

fn validate_name(name: &str) -> std::result::Result<(), ValidationError> {
    let invalid = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ValidationError::InvalidInput(format!(
            "invalid playlist name: '{}'",
            name
        )));
    }
    Ok(())
}

fn playlist_not_found(name: &str) -> Error {
    Error::Common(beabot_common::Error::NotFound(format!("playlist '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beabot_common::SubjectId;
    use tempfile::TempDir;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("road trip").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("  ").is_err());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name(".hidden").is_err());
    }

    #[tokio::test]
    async fn test_save_load_list_delete() {
        let dir = TempDir::new().unwrap();
        let music = dir.path().join("a.mp3");
        std::fs::write(&music, b"x").unwrap();

        let store = PlaylistStore::new(dir.path().join("Playlists"));
        assert!(store.list().await.unwrap().is_empty());

        let tracks = vec![
            Track::from_path(&music, SubjectId(1)),
            Track::from_path(dir.path().join("gone.mp3"), SubjectId(1)),
        ];
        assert_eq!(store.save("mix", &tracks).await.unwrap(), 2);
        assert_eq!(store.list().await.unwrap(), vec!["mix".to_string()]);

        // Missing files are dropped on load
        assert_eq!(store.load("mix").await.unwrap(), vec![music]);

        store.delete("mix").await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(matches!(
            store.delete("mix").await,
            Err(Error::Common(beabot_common::Error::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_load_unknown_playlist() {
        let dir = TempDir::new().unwrap();
        let store = PlaylistStore::new(dir.path());
        assert!(matches!(
            store.load("nope").await,
            Err(Error::Common(beabot_common::Error::NotFound(_)))
        ));
    }
}
