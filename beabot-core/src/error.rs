//! Error types for beabot-core
//!
//! Four failure families, each with its own handling policy:
//! - `ValidationError`: reported synchronously to the caller, never retried
//! - `ResolutionError`: a failed enqueue, the caller may resubmit
//! - `PlatformError`: not-found is benign for reversals, other kinds are
//!   retried by the scheduler on its next tick
//! - `Resource`: a dropped voice connection, the session falls back to idle

use std::time::Duration;
use thiserror::Error;

/// Main error type for beabot-core
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied an operation the current state cannot accept
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Query could not be turned into a playable track
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Chat platform rejected or failed a call
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Platform would not play a track that was due to start; it went to history
    #[error("Track '{title}' refused: {reason}")]
    TrackRefused { title: String, reason: PlatformError },

    /// Voice resource lost
    #[error("Resource error: {0}")]
    Resource(String),

    /// The session was closed and evicted from the registry
    #[error("Session closed")]
    SessionClosed,

    /// Configuration or persistence error from beabot-common
    #[error(transparent)]
    Common(#[from] beabot_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Synchronous input/state validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Index {index} out of range for queue of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Queue is empty")]
    EmptyQueue,

    #[error("Session is still active; stop it first")]
    SessionActive,

    #[error("Not connected to a voice channel")]
    NotConnected,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Track acquisition failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No match for '{0}'")]
    NotFound(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Resolution timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Chat platform failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Voice connection lost: {0}")]
    ConnectionLost(String),
}

impl PlatformError {
    /// Not-found is the one platform failure that counts as success for a reversal
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound(_))
    }
}

/// Convenience Result type using beabot-core Error
pub type Result<T> = std::result::Result<T, Error>;
