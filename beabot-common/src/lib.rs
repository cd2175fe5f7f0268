//! # BeaBot Common Library
//!
//! Shared code for the BeaBot crates including:
//! - Workspace, subject and channel identifiers
//! - Error type used by configuration and persistence helpers
//! - TOML configuration loading with environment overrides
//! - Event types (BotEvent enum) and the EventBus

pub mod config;
pub mod error;
pub mod events;
pub mod ids;

pub use error::{Error, Result};
pub use ids::{ChannelId, SubjectId, WorkspaceId};
