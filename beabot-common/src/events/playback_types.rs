//! Playback-related type definitions
//!
//! Supporting types for session state and repeat policy, shared by the core
//! and by anything consuming the event stream.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Playback session state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No voice connection
    Idle,
    /// Voice connection open, nothing playing
    Stopped,
    /// A track is playing
    Playing,
    /// The active track is paused
    Paused,
}

impl SessionState {
    /// True while a track is loaded (playing or paused)
    pub fn has_active_track(self) -> bool {
        matches!(self, SessionState::Playing | SessionState::Paused)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Playing => write!(f, "playing"),
            SessionState::Paused => write!(f, "paused"),
        }
    }
}

/// What happens to a track once it finishes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Finished track goes to history
    #[default]
    Off,
    /// Finished track plays again
    One,
    /// Finished track is appended to the back of the queue
    All,
}

impl std::fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepeatMode::Off => write!(f, "off"),
            RepeatMode::One => write!(f, "one"),
            RepeatMode::All => write!(f, "all"),
        }
    }
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatMode::Off),
            "one" => Ok(RepeatMode::One),
            "all" => Ok(RepeatMode::All),
            other => Err(format!("unknown repeat mode '{}' (expected off, one or all)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_mode_parse() {
        assert_eq!("off".parse::<RepeatMode>().unwrap(), RepeatMode::Off);
        assert_eq!(" ONE ".parse::<RepeatMode>().unwrap(), RepeatMode::One);
        assert_eq!("all".parse::<RepeatMode>().unwrap(), RepeatMode::All);
        assert!("shuffle".parse::<RepeatMode>().is_err());
    }

    #[test]
    fn test_session_state_serde() {
        let json = serde_json::to_string(&SessionState::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
        assert!(SessionState::Paused.has_active_track());
        assert!(!SessionState::Idle.has_active_track());
    }
}
