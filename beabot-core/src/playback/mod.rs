//! Playback sessions
//!
//! One session per workspace, each driving a single voice connection.

mod queue;
mod session;
mod track;

pub use queue::{History, TrackQueue, DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_QUEUE_LENGTH};
pub use session::{SessionHandle, SessionSettings, SessionSnapshot, SessionStatus};
pub use track::{title_from_path, Track};
