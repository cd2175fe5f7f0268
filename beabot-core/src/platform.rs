//! Chat platform boundary
//!
//! The connection to the chat platform (gateway, event dispatch, audio
//! transport) lives outside this crate. The core consumes it through two
//! traits:
//! - [`Platform`]: workspace-level calls (voice connect, messages, moderation)
//! - [`VoiceConnection`]: the voice connection handle, exclusively owned by
//!   one playback session
//!
//! Notifications flowing the other way (track finished, connection dropped)
//! arrive through `SessionHandle::track_finished` and
//! `SessionHandle::connection_lost`.

use crate::error::PlatformError;
use crate::playback::Track;
use async_trait::async_trait;
use beabot_common::{ChannelId, SubjectId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// Result type for platform calls
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Message posted to a workspace (mod-log entries, announcements)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Workspace-level platform API
#[async_trait]
pub trait Platform: Send + Sync {
    /// Open a voice connection to `channel` in `workspace`
    async fn connect_voice(
        &self,
        workspace: WorkspaceId,
        channel: ChannelId,
    ) -> PlatformResult<Box<dyn VoiceConnection>>;

    /// Post a notice to the workspace's moderation log
    async fn send(&self, workspace: WorkspaceId, notice: Notice) -> PlatformResult<()>;

    async fn ban(&self, subject: SubjectId, workspace: WorkspaceId, reason: &str) -> PlatformResult<()>;

    async fn unban(&self, subject: SubjectId, workspace: WorkspaceId) -> PlatformResult<()>;

    async fn kick(&self, subject: SubjectId, workspace: WorkspaceId, reason: &str) -> PlatformResult<()>;

    /// Workspaces the bot is currently present in
    async fn workspaces(&self) -> PlatformResult<Vec<WorkspaceId>>;
}

/// Open real-time audio stream to one voice channel
///
/// Only the owning playback session calls these methods.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Channel this connection is attached to
    fn channel(&self) -> ChannelId;

    /// Start streaming `track`, replacing whatever is playing
    async fn play(&mut self, track: &Track) -> PlatformResult<()>;

    async fn pause(&mut self) -> PlatformResult<()>;

    async fn resume(&mut self) -> PlatformResult<()>;

    /// Stop the current stream without closing the connection
    async fn stop(&mut self) -> PlatformResult<()>;

    /// Close the connection
    async fn disconnect(&mut self) -> PlatformResult<()>;
}
