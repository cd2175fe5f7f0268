//! Platform identifiers
//!
//! Workspaces (communities), subjects (users) and voice channels are all
//! identified by opaque 64-bit snowflakes on the chat platform. Newtypes keep
//! them from being mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw snowflake value
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake_id!(
    /// Workspace (guild/server) identifier: unit of session and moderation partitioning
    WorkspaceId
);

snowflake_id!(
    /// Subject (user) identifier: target of moderation actions and track requester
    SubjectId
);

snowflake_id!(
    /// Voice channel identifier
    ChannelId
);
