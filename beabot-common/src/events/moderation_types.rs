//! Moderation-related type definitions

use serde::{Deserialize, Serialize};

/// Punitive action kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Ban,
    Kick,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Ban => write!(f, "ban"),
            ActionKind::Kick => write!(f, "kick"),
        }
    }
}
