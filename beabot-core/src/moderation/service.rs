//! Moderation commands
//!
//! Applies punitive actions on the platform, posts a mod-log notice and, for
//! temporary actions, hands the reversal to the [`ActionScheduler`].

use super::scheduler::{ActionScheduler, PendingAction};
use crate::error::{Result, ValidationError};
use crate::platform::{Notice, Platform};
use beabot_common::events::{ActionKind, BotEvent, EventBus};
use beabot_common::{SubjectId, WorkspaceId};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Reason used when the moderator gives none
pub const DEFAULT_REASON: &str = "No reason provided";

pub struct ModerationService {
    platform: Arc<dyn Platform>,
    scheduler: Arc<ActionScheduler>,
    events: EventBus,
}

impl ModerationService {
    pub fn new(platform: Arc<dyn Platform>, scheduler: Arc<ActionScheduler>, events: EventBus) -> Self {
        Self {
            platform,
            scheduler,
            events,
        }
    }

    pub fn scheduler(&self) -> &Arc<ActionScheduler> {
        &self.scheduler
    }

    pub async fn kick(&self, workspace: WorkspaceId, subject: SubjectId, reason: Option<&str>) -> Result<()> {
        let reason = reason_or_default(reason);
        self.platform.kick(subject, workspace, reason).await?;
        self.applied(workspace, subject, ActionKind::Kick, reason, None);
        self.notify(
            workspace,
            Notice::new("User Kicked", format!("User: {}\nReason: {}", subject, reason)),
        )
        .await;
        Ok(())
    }

    pub async fn ban(&self, workspace: WorkspaceId, subject: SubjectId, reason: Option<&str>) -> Result<()> {
        let reason = reason_or_default(reason);
        self.platform.ban(subject, workspace, reason).await?;
        self.applied(workspace, subject, ActionKind::Ban, reason, None);
        self.notify(
            workspace,
            Notice::new("User Banned", format!("User: {}\nReason: {}", subject, reason)),
        )
        .await;
        Ok(())
    }

    /// Ban now, unban once `duration` has passed
    pub async fn temp_ban(
        &self,
        workspace: WorkspaceId,
        subject: SubjectId,
        duration: Duration,
        reason: Option<&str>,
    ) -> Result<PendingAction> {
        let reason = reason_or_default(reason);
        let expires_at = expiry(duration)?;
        self.platform.ban(subject, workspace, reason).await?;
        self.applied(workspace, subject, ActionKind::Ban, reason, Some(duration));

        let pending = self.scheduler.schedule(subject, workspace, ActionKind::Ban, expires_at);
        self.notify(
            workspace,
            Notice::new(
                "Temporary Ban",
                format!(
                    "User: {}\nDuration: {} seconds\nReason: {}",
                    subject,
                    duration.as_secs(),
                    reason
                ),
            ),
        )
        .await;
        Ok(pending)
    }

    /// Kick now and track the kick until `duration` has passed
    pub async fn temp_kick(
        &self,
        workspace: WorkspaceId,
        subject: SubjectId,
        duration: Duration,
        reason: Option<&str>,
    ) -> Result<PendingAction> {
        let reason = reason_or_default(reason);
        let expires_at = expiry(duration)?;
        self.platform.kick(subject, workspace, reason).await?;
        self.applied(workspace, subject, ActionKind::Kick, reason, Some(duration));

        let pending = self.scheduler.schedule(subject, workspace, ActionKind::Kick, expires_at);
        self.notify(
            workspace,
            Notice::new(
                "Temporary Kick",
                format!(
                    "User: {}\nDuration: {} seconds\nReason: {}",
                    subject,
                    duration.as_secs(),
                    reason
                ),
            ),
        )
        .await;
        Ok(pending)
    }

    /// Post an announcement to the workspace
    pub async fn announce(&self, workspace: WorkspaceId, notice: Notice) -> Result<()> {
        if notice.title.trim().is_empty() && notice.body.trim().is_empty() {
            return Err(ValidationError::InvalidInput("announcement is empty".to_string()).into());
        }
        self.platform.send(workspace, notice).await?;
        info!("Workspace {}: announcement sent", workspace);
        Ok(())
    }

    fn applied(
        &self,
        workspace: WorkspaceId,
        subject: SubjectId,
        kind: ActionKind,
        reason: &str,
        duration: Option<Duration>,
    ) {
        info!(
            "Workspace {}: {} applied to subject {} ({})",
            workspace, kind, subject, reason
        );
        self.events.emit_lossy(BotEvent::ModerationApplied {
            workspace,
            subject,
            kind,
            reason: reason.to_string(),
            duration_secs: duration.map(|d| d.as_secs()),
            timestamp: Utc::now(),
        });
    }

    /// Mod-log delivery is best effort
    async fn notify(&self, workspace: WorkspaceId, notice: Notice) {
        if let Err(e) = self.platform.send(workspace, notice).await {
            warn!("Workspace {}: failed to post mod-log notice: {}", workspace, e);
        }
    }
}

fn reason_or_default(reason: Option<&str>) -> &str {
    reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REASON)
}

fn expiry(duration: Duration) -> Result<chrono::DateTime<Utc>> {
    let delta = chrono::Duration::from_std(duration)
        .map_err(|_| ValidationError::InvalidInput(format!("duration too large: {:?}", duration)))?;
    Utc::now()
        .checked_add_signed(delta)
        .ok_or_else(|| ValidationError::InvalidInput(format!("duration too large: {:?}", duration)).into())
}
