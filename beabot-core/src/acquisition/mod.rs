//! Track acquisition
//!
//! Turns user queries into playable [`Track`](crate::playback::Track)s:
//! - [`MusicLibrary`]: cached scan of the local music directory
//! - [`MediaResolver`]: external download step (yt-dlp)
//! - [`AcquisitionPipeline`]: library first, then download with a timeout
//! - [`PlaylistStore`]: saved `.m3u` playlists
//!
//! Resolution happens in the caller's task before a track is handed to a
//! session, so a slow download never blocks session commands.

mod library;
mod pipeline;
mod playlists;
mod resolver;

pub use library::{is_audio_file, scan_audio_files, LibraryEntry, MusicLibrary, AUDIO_EXTENSIONS};
pub use pipeline::{AcquisitionPipeline, TrackSource};
pub use playlists::PlaylistStore;
pub use resolver::{MediaResolver, ResolvedMedia, YtDlpResolver};
